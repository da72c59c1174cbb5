//! Named anomaly detectors.
//!
//! Every detector produces a probability field over the bound image and
//! carries a marker code for the classification marker plane plus a
//! provenance tag recording its parameters. The tag format is stable and
//! ends up in the how/task_args attribute of the classification field.

use crate::core::kernels;
use crate::types::PolarImage;
use ndarray::Array2;

/// Marker codes written into the classification marker plane. The numbering
/// matches the historical code table so downstream palettes keep working.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MarkerCode {
    Clear = 0,
    Cutoff = 1,
    Biomet = 2,
    Ship = 3,
    Sun = 4,
    Emitter = 5,
    Emitter2 = 6,
    Clutter = 7,
    Clutter2 = 8,
    Speck = 9,
    Doppler = 10,
}

/// One parameterized anomaly detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnomalyDetector {
    /// Small isolated echo areas: min dBZ, max area in pixels.
    Speck { min_dbz: i32, max_area: i32 },
    /// Range-normalized specks: min dBZ, max area, area growth factor.
    SpeckNormOld {
        min_dbz: i32,
        max_area: i32,
        max_n: i32,
    },
    /// Soft range cut: max dBZ, start range km, full-weight range km.
    Softcut {
        max_dbz: i32,
        range_km: i32,
        range2_km: i32,
    },
    /// Hard point targets: min relative dBZ, max area in pixels.
    Ship { min_rel_dbz: i32, max_area: i32 },
    /// Unity-width emitter lines: min dBZ, min length in bins.
    Emitter { min_dbz: i32, length: i32 },
    /// Emitter lines up to a few rays wide: min dBZ, min length, max width.
    Emitter2 {
        min_dbz: i32,
        length: i32,
        width: i32,
    },
    /// Ground clutter clumps: min dBZ, max area in pixels.
    Clutter { min_dbz: i32, max_area: i32 },
    /// Biological echo: max dBZ, dBZ ramp, max altitude m, altitude ramp m.
    Biomet {
        max_dbz: i32,
        dbz_delta: i32,
        max_alt: i32,
        alt_delta: i32,
    },
    /// Solar spike: min dBZ, min length in bins, max thickness in rays.
    Sun {
        min_dbz: i32,
        min_length: i32,
        max_thickness: i32,
    },
    /// Solar spike in an expected azimuth window: adds azimuth and window
    /// half-width in degrees.
    Sun2 {
        min_dbz: i32,
        min_length: i32,
        max_thickness: i32,
        azimuth: i32,
        azimuth_delta: i32,
    },
}

impl AnomalyDetector {
    /// Upper-case detector name, the prefix of its provenance tag.
    pub fn name(&self) -> &'static str {
        match self {
            AnomalyDetector::Speck { .. } => "SPECK",
            AnomalyDetector::SpeckNormOld { .. } => "SPECKNORMOLD",
            AnomalyDetector::Softcut { .. } => "SOFTCUT",
            AnomalyDetector::Ship { .. } => "SHIP",
            AnomalyDetector::Emitter { .. } => "EMITTER",
            AnomalyDetector::Emitter2 { .. } => "EMITTER2",
            AnomalyDetector::Clutter { .. } => "CLUTTER",
            AnomalyDetector::Biomet { .. } => "BIOMET",
            AnomalyDetector::Sun { .. } => "SUN",
            AnomalyDetector::Sun2 { .. } => "SUN2",
        }
    }

    /// Marker code stored where this detector wins the classification merge.
    pub fn marker(&self) -> MarkerCode {
        match self {
            AnomalyDetector::Speck { .. } => MarkerCode::Speck,
            AnomalyDetector::SpeckNormOld { .. } => MarkerCode::Speck,
            AnomalyDetector::Softcut { .. } => MarkerCode::Cutoff,
            AnomalyDetector::Ship { .. } => MarkerCode::Ship,
            AnomalyDetector::Emitter { .. } => MarkerCode::Emitter,
            AnomalyDetector::Emitter2 { .. } => MarkerCode::Emitter2,
            AnomalyDetector::Clutter { .. } => MarkerCode::Clutter,
            AnomalyDetector::Biomet { .. } => MarkerCode::Biomet,
            AnomalyDetector::Sun { .. } => MarkerCode::Sun,
            AnomalyDetector::Sun2 { .. } => MarkerCode::Sun,
        }
    }

    /// Provenance tag, `NAME: a,b,...` with a space after the colon.
    pub fn task_args(&self) -> String {
        let args = match self {
            AnomalyDetector::Speck { min_dbz, max_area } => format!("{},{}", min_dbz, max_area),
            AnomalyDetector::SpeckNormOld {
                min_dbz,
                max_area,
                max_n,
            } => format!("{},{},{}", min_dbz, max_area, max_n),
            AnomalyDetector::Softcut {
                max_dbz,
                range_km,
                range2_km,
            } => format!("{},{},{}", max_dbz, range_km, range2_km),
            AnomalyDetector::Ship {
                min_rel_dbz,
                max_area,
            } => format!("{},{}", min_rel_dbz, max_area),
            AnomalyDetector::Emitter { min_dbz, length } => format!("{},{}", min_dbz, length),
            AnomalyDetector::Emitter2 {
                min_dbz,
                length,
                width,
            } => format!("{},{},{}", min_dbz, length, width),
            AnomalyDetector::Clutter { min_dbz, max_area } => format!("{},{}", min_dbz, max_area),
            AnomalyDetector::Biomet {
                max_dbz,
                dbz_delta,
                max_alt,
                alt_delta,
            } => format!("{},{},{},{}", max_dbz, dbz_delta, max_alt, alt_delta),
            AnomalyDetector::Sun {
                min_dbz,
                min_length,
                max_thickness,
            } => format!("{},{},{}", min_dbz, min_length, max_thickness),
            AnomalyDetector::Sun2 {
                min_dbz,
                min_length,
                max_thickness,
                azimuth,
                azimuth_delta,
            } => format!(
                "{},{},{},{},{}",
                min_dbz, min_length, max_thickness, azimuth, azimuth_delta
            ),
        };
        format!("{}: {}", self.name(), args)
    }

    /// Runs the detector over the bound image, producing a probability plane.
    pub fn run(&self, image: &PolarImage) -> Array2<u8> {
        match *self {
            AnomalyDetector::Speck { min_dbz, max_area } => {
                kernels::detect_specks(image, min_dbz, max_area)
            }
            AnomalyDetector::SpeckNormOld {
                min_dbz,
                max_area,
                max_n,
            } => kernels::detect_specks_norm_old(image, min_dbz, max_area, max_n),
            AnomalyDetector::Softcut {
                max_dbz,
                range_km,
                range2_km,
            } => kernels::detect_softcut(image, max_dbz, range_km, range2_km),
            AnomalyDetector::Ship {
                min_rel_dbz,
                max_area,
            } => kernels::detect_ships(image, min_rel_dbz, max_area),
            AnomalyDetector::Emitter { min_dbz, length } => {
                kernels::detect_emitters(image, min_dbz, length)
            }
            AnomalyDetector::Emitter2 {
                min_dbz,
                length,
                width,
            } => kernels::detect_emitters2(image, min_dbz, length, width),
            AnomalyDetector::Clutter { min_dbz, max_area } => {
                kernels::detect_clutter(image, min_dbz, max_area)
            }
            AnomalyDetector::Biomet {
                max_dbz,
                dbz_delta,
                max_alt,
                alt_delta,
            } => kernels::detect_biomet(image, max_dbz, dbz_delta, max_alt, alt_delta),
            AnomalyDetector::Sun {
                min_dbz,
                min_length,
                max_thickness,
            } => kernels::detect_sun(image, min_dbz, min_length, max_thickness),
            AnomalyDetector::Sun2 {
                min_dbz,
                min_length,
                max_thickness,
                azimuth,
                azimuth_delta,
            } => kernels::detect_sun2(
                image,
                min_dbz,
                min_length,
                max_thickness,
                azimuth,
                azimuth_delta,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_args_use_name_colon_space_format() {
        let d = AnomalyDetector::Speck {
            min_dbz: -20,
            max_area: 5,
        };
        assert_eq!(d.task_args(), "SPECK: -20,5");

        let d = AnomalyDetector::Emitter2 {
            min_dbz: -10,
            length: 4,
            width: 2,
        };
        assert_eq!(d.task_args(), "EMITTER2: -10,4,2");

        let d = AnomalyDetector::Sun2 {
            min_dbz: -20,
            min_length: 100,
            max_thickness: 3,
            azimuth: 45,
            azimuth_delta: 2,
        };
        assert_eq!(d.task_args(), "SUN2: -20,100,3,45,2");
    }

    #[test]
    fn marker_codes_follow_historical_table() {
        assert_eq!(MarkerCode::Clear as u8, 0);
        assert_eq!(MarkerCode::Cutoff as u8, 1);
        assert_eq!(MarkerCode::Emitter2 as u8, 6);
        assert_eq!(MarkerCode::Speck as u8, 9);
        let d = AnomalyDetector::SpeckNormOld {
            min_dbz: -20,
            max_area: 24,
            max_n: 8,
        };
        assert_eq!(d.marker(), MarkerCode::Speck);
    }
}
