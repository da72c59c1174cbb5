//! Monthly reflectivity threshold calendar.
//!
//! Each climate profile is a fixed table of twelve dBZ thresholds used to
//! pre-filter reflectivity before the detectors run. Which profile the name
//! `DEFAULT` aliases is a required configuration choice, never hardcoded.

use crate::types::{RopoError, RopoResult};

const COLD: [f64; 12] = [
    -6.0, -4.0, -2.0, 0.0, 2.0, 4.0, 6.0, 4.0, 2.0, 0.0, -2.0, -4.0,
];
const VERY_COLD: [f64; 12] = [
    -12.0, -10.0, -6.0, -4.0, 0.0, 4.0, 6.0, 4.0, -4.0, -8.0, -10.0, -12.0,
];
const TEMPERATE: [f64; 12] = [
    0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 10.0, 8.0, 6.0, 4.0, 2.0, 0.0,
];
const FLAT0: [f64; 12] = [0.0; 12];

/// Maps a climate profile name and a month to a static dBZ threshold.
#[derive(Debug, Clone)]
pub struct ThresholdCalendar {
    default_profile: String,
}

impl ThresholdCalendar {
    /// Creates a calendar with the given profile aliased as `DEFAULT`.
    pub fn new(default_profile: &str) -> RopoResult<ThresholdCalendar> {
        if default_profile == "DEFAULT" || table(default_profile).is_none() {
            return Err(RopoError::Config(format!(
                "unknown default climate profile {:?}",
                default_profile
            )));
        }
        Ok(ThresholdCalendar {
            default_profile: default_profile.to_string(),
        })
    }

    /// True if the name denotes a known profile (including NONE and DEFAULT).
    pub fn is_profile(name: &str) -> bool {
        name == "NONE" || name == "DEFAULT" || table(name).is_some()
    }

    /// Looks up the dBZ threshold for a profile and 0-based month index.
    ///
    /// `NONE` yields no threshold at all; detectors requiring an absolute
    /// threshold are then skipped.
    pub fn lookup(&self, profile: &str, month0: usize) -> RopoResult<Option<f64>> {
        if month0 > 11 {
            return Err(RopoError::Processing(format!(
                "month index {} out of range",
                month0
            )));
        }
        let name = if profile == "DEFAULT" {
            self.default_profile.as_str()
        } else {
            profile
        };
        if name == "NONE" {
            return Ok(None);
        }
        let table = table(name).ok_or_else(|| {
            RopoError::Config(format!("unknown climate profile {:?}", profile))
        })?;
        Ok(Some(table[month0]))
    }
}

fn table(name: &str) -> Option<&'static [f64; 12]> {
    match name {
        "COLD" => Some(&COLD),
        "VERY_COLD" => Some(&VERY_COLD),
        "TEMPERATE" => Some(&TEMPERATE),
        "FLAT0" => Some(&FLAT0),
        _ => None,
    }
}
