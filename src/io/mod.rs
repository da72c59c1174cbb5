//! Configuration and metadata input modules

pub mod odim_source;
pub mod site_config;

pub use odim_source::RadarSourceId;
pub use site_config::{SiteConfigStore, SiteOptions, ThresholdSpec};
