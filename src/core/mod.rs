//! Core processing: detector kernels, the chain, restoration, padding, the
//! threshold calendar, and the scan/volume driver.

pub mod calendar;
pub mod chain;
pub mod detectors;
pub mod kernels;
pub mod padding;
pub mod processor;
pub mod restore;

pub use calendar::ThresholdCalendar;
pub use chain::{DetectorChain, ProbabilityField, CLASSIFICATION_TASK, MARKER_TASK, RESTORE_TASK};
pub use detectors::{AnomalyDetector, MarkerCode};
pub use processor::Processor;
