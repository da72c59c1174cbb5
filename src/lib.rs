//! ropo: anomaly detection and removal for polar weather radar reflectivity.
//!
//! This library classifies non-meteorological echo (specks, emitter lines,
//! ships, clutter, solar interference) in single-elevation polar scans and
//! volumes, attaches the classification as quality fields, and removes or
//! fills in the flagged samples. Per-site detector parameterization comes
//! from an XML option table; absolute reflectivity thresholds can follow a
//! monthly climate calendar.

pub mod core;
pub mod io;
pub mod types;

// Re-export the main surface for easier access
pub use crate::core::{
    AnomalyDetector, DetectorChain, MarkerCode, ProbabilityField, Processor, ThresholdCalendar,
    CLASSIFICATION_TASK, MARKER_TASK, RESTORE_TASK,
};
pub use io::{RadarSourceId, SiteConfigStore, SiteOptions, ThresholdSpec};
pub use types::{
    PolarImage, ProcessingMode, QualityField, RadarObject, RawData, RopoError, RopoResult, Scan,
    ScanParam, StorageWidth, Volume,
};
