//! Per-pixel detector kernels.
//!
//! These are the site-tunable heuristics behind the named detectors. Each
//! kernel reads the 8-bit working plane of a bound image and produces one
//! probability plane of the same shape, 0 = clear, 255 = certain anomaly.
//! The surrounding chain treats them as opaque; only the probability-plane
//! contract matters to the orchestration.

use crate::types::PolarImage;
use ndarray::Array2;

/// Soft saturation of a count against a half-point: 255 * v / (v + half).
pub fn semisigmoid(values: &mut Array2<u32>, half: i32) {
    if half <= 0 {
        values.mapv_inplace(|v| if v > 0 { 255 } else { 0 });
    } else {
        let half = half as u64;
        values.mapv_inplace(|v| ((255 * v as u64) / (v as u64 + half)) as u32);
    }
}

/// 255 - v, on a plane already clamped to 0..=255.
pub fn invert(values: &mut Array2<u32>) {
    values.mapv_inplace(|v| 255 - v.min(255));
}

/// Rewrites every sample equal to `from` as `to`.
pub fn translate_intensity(values: &mut Array2<u32>, from: u32, to: u32) {
    values.mapv_inplace(|v| if v == from { to } else { v });
}

fn clamp_u8(values: &Array2<u32>) -> Array2<u8> {
    values.mapv(|v| v.min(255) as u8)
}

/// Echo mask for a minimum dBZ: above threshold and not nodata.
fn echo_mask(img: &PolarImage, min_dbz: i32) -> Array2<bool> {
    let thresh = img.byte_from_dbz(min_dbz as f64);
    let nodata = img.nodata as u8;
    img.bytes().mapv(|b| b >= thresh && b != nodata)
}

/// Connected-component area of each masked pixel, flood-filled with the given
/// connectivity (4 or 8). Unmasked pixels get area 0.
fn component_areas(mask: &Array2<bool>, eight: bool) -> Array2<u32> {
    let (nrays, nbins) = mask.dim();
    let mut label = Array2::<u32>::zeros((nrays, nbins));
    let mut areas: Vec<u32> = vec![0]; // label 0 = background
    let mut stack = Vec::new();

    for r in 0..nrays {
        for b in 0..nbins {
            if !mask[[r, b]] || label[[r, b] ] != 0 {
                continue;
            }
            let id = areas.len() as u32;
            areas.push(0);
            stack.push((r, b));
            label[[r, b]] = id;
            while let Some((cr, cb)) = stack.pop() {
                areas[id as usize] += 1;
                let mut neighbors = vec![
                    (cr.wrapping_sub(1), cb),
                    (cr + 1, cb),
                    (cr, cb.wrapping_sub(1)),
                    (cr, cb + 1),
                ];
                if eight {
                    neighbors.extend_from_slice(&[
                        (cr.wrapping_sub(1), cb.wrapping_sub(1)),
                        (cr.wrapping_sub(1), cb + 1),
                        (cr + 1, cb.wrapping_sub(1)),
                        (cr + 1, cb + 1),
                    ]);
                }
                for (nr, nb) in neighbors {
                    if nr < nrays && nb < nbins && mask[[nr, nb]] && label[[nr, nb]] == 0 {
                        label[[nr, nb]] = id;
                        stack.push((nr, nb));
                    }
                }
            }
        }
    }

    Array2::from_shape_fn((nrays, nbins), |(r, b)| areas[label[[r, b]] as usize])
}

/// Specks: small isolated echo areas. Probability falls off with component
/// area against `max_area` pixels.
pub fn detect_specks(img: &PolarImage, min_dbz: i32, max_area: i32) -> Array2<u8> {
    let mask = echo_mask(img, min_dbz);
    let mut areas = component_areas(&mask, false);
    semisigmoid(&mut areas, max_area);
    invert(&mut areas);
    translate_intensity(&mut areas, 255, 0);
    clamp_u8(&areas)
}

/// Range-normalized specks: the tolerated area grows linearly with range so
/// that an area of `max_area` pixels at the radar corresponds to
/// `max_n * max_area` pixels at maximum range.
pub fn detect_specks_norm_old(
    img: &PolarImage,
    min_dbz: i32,
    max_area: i32,
    max_n: i32,
) -> Array2<u8> {
    let mask = echo_mask(img, min_dbz);
    let areas = component_areas(&mask, false);
    let nbins = img.nbins().max(2) as f64;
    let growth = (max_n.max(1) - 1) as f64;
    let mut scaled = Array2::from_shape_fn(areas.dim(), |(r, b)| {
        let allowed = 1.0 + growth * b as f64 / (nbins - 1.0);
        (areas[[r, b]] as f64 / allowed).round() as u32
    });
    semisigmoid(&mut scaled, max_area);
    invert(&mut scaled);
    translate_intensity(&mut scaled, 255, 0);
    clamp_u8(&scaled)
}

/// Soft range cut: weak echo far from the radar is increasingly suspect.
/// Probability ramps from zero at `range_km` to full at `range2_km` and is
/// damped for echo stronger than `max_dbz`.
pub fn detect_softcut(img: &PolarImage, max_dbz: i32, range_km: i32, range2_km: i32) -> Array2<u8> {
    let (nrays, nbins) = img.dim();
    let bin_km = img.bin_depth / 1000.0;
    let nodata = img.nodata as u8;
    let mut out = Array2::<u8>::zeros((nrays, nbins));
    let r1 = range_km as f64;
    let r2 = (range2_km as f64).max(r1 + 1.0);
    for r in 0..nrays {
        for b in 0..nbins {
            let byte = img.bytes()[[r, b]];
            if byte == 0 || byte == nodata {
                continue;
            }
            let range = b as f64 * bin_km;
            let ramp = ((range - r1) / (r2 - r1)).clamp(0.0, 1.0);
            if ramp == 0.0 {
                continue;
            }
            let dbz = img.offset + img.gain * byte as f64;
            // Strong echo survives the cut; fade over a 10 dBZ margin.
            let damp = (1.0 - (dbz - max_dbz as f64) / 10.0).clamp(0.0, 1.0);
            out[[r, b]] = (255.0 * ramp * damp).round() as u8;
        }
    }
    out
}

/// Ships and other hard point targets: compact echo standing out from its
/// surroundings by at least `min_rel_dbz`.
pub fn detect_ships(img: &PolarImage, min_rel_dbz: i32, max_area: i32) -> Array2<u8> {
    let (nrays, nbins) = img.dim();
    let nodata = img.nodata as u8;
    let mut mask = Array2::from_elem((nrays, nbins), false);
    for r in 0..nrays {
        for b in 0..nbins {
            let byte = img.bytes()[[r, b]];
            if byte == 0 || byte == nodata {
                continue;
            }
            // Mean of the 5x5 surroundings, center excluded.
            let mut sum = 0u32;
            let mut count = 0u32;
            for dr in -2i64..=2 {
                for db in -2i64..=2 {
                    if dr == 0 && db == 0 {
                        continue;
                    }
                    let nr = r as i64 + dr;
                    let nb = b as i64 + db;
                    if nr >= 0 && nr < nrays as i64 && nb >= 0 && nb < nbins as i64 {
                        let v = img.bytes()[[nr as usize, nb as usize]];
                        if v != nodata {
                            sum += v as u32;
                            count += 1;
                        }
                    }
                }
            }
            if count == 0 {
                continue;
            }
            let rel_dbz = (byte as f64 - sum as f64 / count as f64) * img.gain;
            if rel_dbz >= min_rel_dbz as f64 {
                mask[[r, b]] = true;
            }
        }
    }
    let mut areas = component_areas(&mask, true);
    semisigmoid(&mut areas, max_area);
    invert(&mut areas);
    translate_intensity(&mut areas, 255, 0);
    clamp_u8(&areas)
}

/// Unity-width emitter lines: radial runs of at least `length` bins whose
/// azimuthal neighbors are echo free.
pub fn detect_emitters(img: &PolarImage, min_dbz: i32, length: i32) -> Array2<u8> {
    let mask = echo_mask(img, min_dbz);
    let (nrays, nbins) = mask.dim();
    let min_len = length.max(1) as usize;
    let mut out = Array2::<u8>::zeros((nrays, nbins));

    for r in 0..nrays {
        let mut b = 0;
        while b < nbins {
            if !mask[[r, b]] {
                b += 1;
                continue;
            }
            let start = b;
            while b < nbins && mask[[r, b]] {
                b += 1;
            }
            let run = b - start;
            if run < min_len {
                continue;
            }
            // A genuine emitter line is one ray wide: most of the run must
            // be free of echo on both azimuthal neighbors.
            let mut lonely = 0usize;
            for bin in start..b {
                let above = r > 0 && mask[[r - 1, bin]];
                let below = r + 1 < nrays && mask[[r + 1, bin]];
                if !above && !below {
                    lonely += 1;
                }
            }
            if lonely * 10 >= run * 6 {
                for bin in start..b {
                    out[[r, bin]] = 255;
                }
            }
        }
    }
    out
}

/// Emitter lines up to `width` rays wide: radial runs of at least `length`
/// bins whose azimuthal extent stays within `width` rays.
pub fn detect_emitters2(img: &PolarImage, min_dbz: i32, length: i32, width: i32) -> Array2<u8> {
    let mask = echo_mask(img, min_dbz);
    let (nrays, nbins) = mask.dim();
    let min_len = length.max(1) as usize;
    let max_width = width.max(1) as usize;

    // Azimuthal extent of contiguous echo through every pixel.
    let mut extent = Array2::<u32>::zeros((nrays, nbins));
    for b in 0..nbins {
        let mut r = 0;
        while r < nrays {
            if !mask[[r, b]] {
                r += 1;
                continue;
            }
            let start = r;
            while r < nrays && mask[[r, b]] {
                r += 1;
            }
            for ray in start..r {
                extent[[ray, b]] = (r - start) as u32;
            }
        }
    }

    let mut out = Array2::<u8>::zeros((nrays, nbins));
    for r in 0..nrays {
        let mut b = 0;
        while b < nbins {
            let narrow = mask[[r, b]] && extent[[r, b]] as usize <= max_width;
            if !narrow {
                b += 1;
                continue;
            }
            let start = b;
            while b < nbins && mask[[r, b]] && extent[[r, b]] as usize <= max_width {
                b += 1;
            }
            if b - start >= min_len {
                for bin in start..b {
                    out[[r, bin]] = 255;
                }
            }
        }
    }
    out
}

/// Ground clutter: small high-connectivity echo clumps close to the radar.
pub fn detect_clutter(img: &PolarImage, min_dbz: i32, max_area: i32) -> Array2<u8> {
    let mask = echo_mask(img, min_dbz);
    let mut areas = component_areas(&mask, true);
    semisigmoid(&mut areas, max_area);
    invert(&mut areas);
    translate_intensity(&mut areas, 255, 0);
    clamp_u8(&areas)
}

/// Biological echo: weak reflectivity confined to low beam altitudes.
/// Fuzzy membership ramps over `dbz_delta` below `max_dbz` and over
/// `alt_delta` meters below `max_alt` meters.
pub fn detect_biomet(
    img: &PolarImage,
    max_dbz: i32,
    dbz_delta: i32,
    max_alt: i32,
    alt_delta: i32,
) -> Array2<u8> {
    let (nrays, nbins) = img.dim();
    let nodata = img.nodata as u8;
    let sin_el = img.elangle.to_radians().sin();
    let dbz_delta = dbz_delta.max(1) as f64;
    let alt_delta = alt_delta.max(1) as f64;
    let mut out = Array2::<u8>::zeros((nrays, nbins));
    for r in 0..nrays {
        for b in 0..nbins {
            let byte = img.bytes()[[r, b]];
            if byte == 0 || byte == nodata {
                continue;
            }
            let dbz = img.offset + img.gain * byte as f64;
            let alt = b as f64 * img.bin_depth * sin_el;
            let f_dbz = ((max_dbz as f64 - dbz) / dbz_delta + 1.0).clamp(0.0, 1.0);
            let f_alt = ((max_alt as f64 - alt) / alt_delta + 1.0).clamp(0.0, 1.0);
            out[[r, b]] = (255.0 * f_dbz * f_alt).round() as u8;
        }
    }
    out
}

fn sun_candidate_rays(
    mask: &Array2<bool>,
    min_length: i32,
    max_thickness: i32,
) -> Vec<bool> {
    let (nrays, nbins) = mask.dim();
    let min_len = min_length.max(1) as usize;

    // A sun ray carries one long contiguous radial run.
    let mut long_run: Vec<bool> = (0..nrays)
        .map(|r| {
            let mut best = 0usize;
            let mut run = 0usize;
            for b in 0..nbins {
                if mask[[r, b]] {
                    run += 1;
                    best = best.max(run);
                } else {
                    run = 0;
                }
            }
            best >= min_len
        })
        .collect();

    // And the spike must stay thin in azimuth.
    let max_thick = max_thickness.max(1) as usize;
    let runs: Vec<(usize, usize)> = {
        let mut v = Vec::new();
        let mut r = 0;
        while r < nrays {
            if !long_run[r] {
                r += 1;
                continue;
            }
            let start = r;
            while r < nrays && long_run[r] {
                r += 1;
            }
            v.push((start, r));
        }
        v
    };
    for (start, end) in runs {
        if end - start > max_thick {
            for item in long_run.iter_mut().take(end).skip(start) {
                *item = false;
            }
        }
    }
    long_run
}

/// Solar interference: a thin spike of echo running down one or a few rays.
pub fn detect_sun(img: &PolarImage, min_dbz: i32, min_length: i32, max_thickness: i32) -> Array2<u8> {
    let mask = echo_mask(img, min_dbz);
    let candidates = sun_candidate_rays(&mask, min_length, max_thickness);
    let (nrays, nbins) = mask.dim();
    Array2::from_shape_fn((nrays, nbins), |(r, b)| {
        if candidates[r] && mask[[r, b]] {
            255
        } else {
            0
        }
    })
}

/// Solar interference constrained to an expected azimuth window, in degrees.
pub fn detect_sun2(
    img: &PolarImage,
    min_dbz: i32,
    min_length: i32,
    max_thickness: i32,
    azimuth_deg: i32,
    azimuth_delta_deg: i32,
) -> Array2<u8> {
    let mask = echo_mask(img, min_dbz);
    let candidates = sun_candidate_rays(&mask, min_length, max_thickness);
    let (nrays, nbins) = mask.dim();
    let ray_width = 360.0 / nrays.max(1) as f64;
    Array2::from_shape_fn((nrays, nbins), |(r, b)| {
        if !candidates[r] || !mask[[r, b]] {
            return 0;
        }
        let az = r as f64 * ray_width;
        let mut diff = (az - azimuth_deg as f64).abs() % 360.0;
        if diff > 180.0 {
            diff = 360.0 - diff;
        }
        if diff <= azimuth_delta_deg as f64 {
            255
        } else {
            0
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawData, Scan, ScanParam};
    use ndarray::Array2;
    use std::collections::BTreeMap;

    fn image(data: Array2<u8>) -> PolarImage {
        let scan = Scan {
            elangle: 0.5,
            rscale: 500.0,
            date: "20250115".to_string(),
            time: "120000".to_string(),
            source: "NOD:fivan".to_string(),
            longitude: 24.87,
            latitude: 60.27,
            height: 82.0,
            beamwidth: 1.0,
            params: vec![ScanParam {
                quantity: "DBZH".to_string(),
                data: RawData::U8(data),
                offset: -32.0,
                gain: 0.5,
                nodata: 255.0,
                undetect: 0.0,
            }],
            quality: Vec::new(),
            attrs: BTreeMap::new(),
        };
        PolarImage::from_scan(&scan, "DBZH").unwrap()
    }

    #[test]
    fn speck_flags_small_areas_harder_than_large() {
        let mut data = Array2::<u8>::zeros((16, 16));
        data[[2, 2]] = 200; // single pixel
        for r in 8..12 {
            for b in 8..14 {
                data[[r, b]] = 200; // 24-pixel block
            }
        }
        let img = image(data);
        let prob = detect_specks(&img, -20, 5);
        assert!(prob[[2, 2]] > prob[[9, 9]]);
        assert_eq!(prob[[0, 0]], 0);
    }

    #[test]
    fn emitter_flags_thin_radial_line() {
        let mut data = Array2::<u8>::zeros((12, 32));
        for b in 4..28 {
            data[[6, b]] = 150;
        }
        let img = image(data);
        let prob = detect_emitters(&img, -10, 8);
        assert_eq!(prob[[6, 10]], 255);
        assert_eq!(prob[[5, 10]], 0);
    }

    #[test]
    fn emitter2_respects_width() {
        let mut data = Array2::<u8>::zeros((12, 32));
        for r in 5..7 {
            for b in 4..28 {
                data[[r, b]] = 150;
            }
        }
        let img = image(data);
        let two_wide = detect_emitters2(&img, -10, 8, 2);
        assert_eq!(two_wide[[5, 10]], 255);
        let one_wide = detect_emitters2(&img, -10, 8, 1);
        assert_eq!(one_wide[[5, 10]], 0);
    }

    #[test]
    fn biomet_prefers_weak_low_echo() {
        let mut data = Array2::<u8>::zeros((4, 64));
        data[[0, 2]] = 30; // weak and close to the ground
        data[[0, 60]] = 30; // weak but high up
        data[[1, 2]] = 220; // strong and low
        let img = image(data);
        let prob = detect_biomet(&img, -10, 5, 500, 100);
        assert!(prob[[0, 2]] > prob[[0, 60]]);
        assert!(prob[[0, 2]] > prob[[1, 2]]);
    }

    #[test]
    fn sun_flags_long_thin_spike() {
        let mut data = Array2::<u8>::zeros((24, 64));
        for b in 0..64 {
            data[[10, b]] = 120;
        }
        let img = image(data);
        let prob = detect_sun(&img, -15, 32, 3);
        assert_eq!(prob[[10, 30]], 255);
        assert_eq!(prob[[11, 30]], 0);
    }
}
