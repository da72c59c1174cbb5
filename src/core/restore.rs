//! Removal and fill-in of classified anomalies.
//!
//! Two strategies: plain removal blanks every flagged sample to undetect,
//! fill-in replaces flagged samples with the mean of the surviving 5x5
//! neighborhood so that anomalies embedded in precipitation do not punch
//! holes into the field. Both planes of the image are rewritten in lockstep
//! so the native-width output stays consistent with the working bytes.

use crate::types::{PolarImage, RopoResult};
use ndarray::Array2;

/// Blanks every sample whose classification probability reaches `thresh`.
pub fn restore_image(
    image: &mut PolarImage,
    classification: &Array2<u8>,
    thresh: u8,
) -> RopoResult<()> {
    let undetect = image.orig_undetect;
    let (nrays, nbins) = image.dim();
    let mut bytes = image.bytes().clone();
    let mut raw = image.raw().clone();
    let mut removed = 0usize;
    for r in 0..nrays {
        for b in 0..nbins {
            if classification[[r, b]] >= thresh {
                bytes[[r, b]] = 0;
                raw[[r, b]] = undetect;
                removed += 1;
            }
        }
    }
    log::debug!("Removed {} anomalous samples", removed);
    image.set_planes(bytes, raw)
}

/// Replaces every flagged sample with the mean of its unflagged 5x5
/// neighborhood; samples with no surviving neighbor become undetect.
///
/// Flagged samples are erased before the neighborhood means are taken, so a
/// cluster of anomalies cannot feed its own fill-in values.
pub fn restore_image2(
    image: &mut PolarImage,
    classification: &Array2<u8>,
    thresh: u8,
) -> RopoResult<()> {
    let (nrays, nbins) = image.dim();
    let nodata_byte = image.nodata as u8;
    let undetect = image.orig_undetect;
    let orig_nodata = image.orig_nodata;

    let mut erased_bytes = image.bytes().clone();
    let mut erased_raw = image.raw().clone();
    for r in 0..nrays {
        for b in 0..nbins {
            if classification[[r, b]] >= thresh {
                erased_bytes[[r, b]] = 0;
                erased_raw[[r, b]] = undetect;
            }
        }
    }

    let mut bytes = erased_bytes.clone();
    let mut raw = erased_raw.clone();
    let mut filled = 0usize;
    for r in 0..nrays {
        for b in 0..nbins {
            if classification[[r, b]] < thresh {
                continue;
            }
            let mut byte_sum = 0u32;
            let mut byte_count = 0u32;
            let mut raw_sum = 0.0;
            let mut raw_count = 0u32;
            for dr in -2i64..=2 {
                for db in -2i64..=2 {
                    let nr = r as i64 + dr;
                    let nb = b as i64 + db;
                    if nr < 0 || nr >= nrays as i64 || nb < 0 || nb >= nbins as i64 {
                        continue;
                    }
                    let (nr, nb) = (nr as usize, nb as usize);
                    let v = erased_bytes[[nr, nb]];
                    if v != 0 && v != nodata_byte {
                        byte_sum += v as u32;
                        byte_count += 1;
                    }
                    let w = erased_raw[[nr, nb]];
                    if w != undetect && w != orig_nodata {
                        raw_sum += w;
                        raw_count += 1;
                    }
                }
            }
            bytes[[r, b]] = if byte_count > 0 {
                (byte_sum as f64 / byte_count as f64).round() as u8
            } else {
                0
            };
            raw[[r, b]] = if raw_count > 0 {
                (raw_sum / raw_count as f64).round()
            } else {
                undetect
            };
            filled += 1;
        }
    }
    log::debug!("Filled in {} anomalous samples", filled);
    image.set_planes(bytes, raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawData, Scan, ScanParam};
    use ndarray::Array2;
    use std::collections::BTreeMap;

    fn image(data: RawData) -> PolarImage {
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
                data,
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
    fn removal_blanks_flagged_samples_only() {
        let mut data = Array2::<u8>::zeros((4, 4));
        data[[1, 1]] = 100;
        data[[2, 2]] = 120;
        let mut img = image(RawData::U8(data));

        let mut cls = Array2::<u8>::zeros((4, 4));
        cls[[1, 1]] = 200;
        restore_image(&mut img, &cls, 108).unwrap();

        assert_eq!(img.bytes()[[1, 1]], 0);
        assert_eq!(img.raw()[[1, 1]], 0.0);
        assert_eq!(img.bytes()[[2, 2]], 120);
    }

    #[test]
    fn fill_in_uses_surviving_neighborhood_mean() {
        let mut data = Array2::<u8>::zeros((5, 5));
        for r in 0..5 {
            for b in 0..5 {
                data[[r, b]] = 100;
            }
        }
        data[[2, 2]] = 250; // the anomaly
        let mut img = image(RawData::U8(data));

        let mut cls = Array2::<u8>::zeros((5, 5));
        cls[[2, 2]] = 255;
        restore_image2(&mut img, &cls, 108).unwrap();

        assert_eq!(img.bytes()[[2, 2]], 100);
        assert_eq!(img.raw()[[2, 2]], 100.0);
    }

    #[test]
    fn fill_in_with_no_neighbors_becomes_undetect() {
        let mut data = Array2::<u8>::zeros((5, 5));
        data[[2, 2]] = 250;
        let mut img = image(RawData::U8(data));

        let mut cls = Array2::<u8>::zeros((5, 5));
        cls[[2, 2]] = 255;
        restore_image2(&mut img, &cls, 108).unwrap();

        assert_eq!(img.bytes()[[2, 2]], 0);
        assert_eq!(img.raw()[[2, 2]], 0.0);
    }

    #[test]
    fn wide_data_is_restored_in_native_width() {
        let mut data = Array2::<u16>::zeros((4, 4));
        data[[1, 1]] = 30000;
        let mut img = image(RawData::U16(data));
        assert!(img.bytes()[[1, 1]] > 0);

        let mut cls = Array2::<u8>::zeros((4, 4));
        cls[[1, 1]] = 200;
        restore_image(&mut img, &cls, 108).unwrap();

        match img.to_raw_data() {
            RawData::U16(a) => assert_eq!(a[[1, 1]], 0),
            other => panic!("unexpected width {:?}", other.width()),
        }
    }
}
