//! Scan and volume level quality control.
//!
//! The processor ties everything together: per-site options, the monthly
//! threshold calendar, seam padding, the detector chain, restoration, and the
//! quality fields recording what was done. Data already carrying a
//! classification field is skipped unless reprocessing is requested, which
//! makes a second pass over the same file a no-op.

use crate::core::calendar::ThresholdCalendar;
use crate::core::chain::{DetectorChain, CLASSIFICATION_TASK, MARKER_TASK};
use crate::core::padding;
use crate::io::site_config::{SiteConfigStore, SiteOptions, ThresholdSpec};
use crate::types::{
    PolarImage, ProcessingMode, QualityField, RadarObject, RawData, RopoError, RopoResult, Scan,
    Volume,
};
use chrono::{Datelike, NaiveDate};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Anomaly detection and removal driver, one per configuration.
#[derive(Debug, Clone)]
pub struct Processor {
    store: SiteConfigStore,
    calendar: ThresholdCalendar,
}

impl Processor {
    /// Builds a processor from a loaded site option table. The calendar's
    /// DEFAULT alias comes from the table's root attribute.
    pub fn new(store: SiteConfigStore) -> RopoResult<Processor> {
        let calendar = ThresholdCalendar::new(&store.default_profile)?;
        Ok(Processor { store, calendar })
    }

    /// Quality controls one radar object in place.
    ///
    /// With `reprocess` false, data that already carries a classification
    /// field is returned completely untouched; the skip happens before any
    /// metadata repair. Otherwise the what/source string is repaired if the
    /// NOD identifier can be recovered and the object is dispatched by type.
    pub fn generate(
        &self,
        object: &mut RadarObject,
        mode: ProcessingMode,
        reprocess: bool,
    ) -> RopoResult<()> {
        if !reprocess && already_classified(object) {
            log::info!("Input already classified, skipping");
            return Ok(());
        }

        let opts = self.store.resolve(object.source_mut())?;
        log::info!(
            "Quality controlling {} with parameters {:?}",
            object.source(),
            opts.parameters
        );
        match object {
            RadarObject::Scan(scan) => {
                let month0 = month_index(&scan.date)?;
                self.process_scan(scan, &opts, month0, mode)
            }
            RadarObject::Volume(volume) => self.process_volume(volume, &opts, mode),
        }
    }

    /// Quality controls every scan of a volume.
    ///
    /// The month is resolved once from the volume date; scan order is
    /// preserved.
    pub fn process_volume(
        &self,
        volume: &mut Volume,
        opts: &SiteOptions,
        mode: ProcessingMode,
    ) -> RopoResult<()> {
        copy_top_attributes(volume);

        let month0 = month_index(&volume.date)?;

        #[cfg(feature = "parallel")]
        {
            volume
                .scans
                .par_iter_mut()
                .try_for_each(|scan| self.process_scan(scan, opts, month0, mode))?;
        }
        #[cfg(not(feature = "parallel"))]
        {
            for scan in &mut volume.scans {
                self.process_scan(scan, opts, month0, mode)?;
            }
        }
        Ok(())
    }

    /// Runs the configured detector sequence over one scan.
    pub fn process_scan(
        &self,
        scan: &mut Scan,
        opts: &SiteOptions,
        month0: usize,
        mode: ProcessingMode,
    ) -> RopoResult<()> {
        let quantity = opts.parameters.as_str();
        if !scan.has_param(quantity) {
            return Err(RopoError::MissingParameter(format!(
                "scan at {:.1} deg has no {} parameter",
                scan.elangle, quantity
            )));
        }

        let threshold = match &opts.threshold {
            ThresholdSpec::Literal(v) => Some(*v),
            ThresholdSpec::Profile(name) => self.calendar.lookup(name, month0)?,
            ThresholdSpec::Unset => None,
        };

        // The emitter line filters look sideways in azimuth; pad the seam
        // with enough rays to cover their neighborhood on both sides.
        let low_elevation = scan.elangle < opts.highest_elev;
        let pad_width_deg = match opts.emitter2 {
            Some((_, _, width)) if low_elevation => 2.0 * width as f64,
            _ => 0.0,
        };
        let (padded, pad) = padding::pad(scan, quantity, pad_width_deg)?;

        let image = PolarImage::from_scan(&padded, quantity)?;
        let mut chain = DetectorChain::new(image);

        if let Some(dbz) = threshold {
            let raw = chain.image().byte_from_dbz(dbz);
            chain.threshold(raw);
        }
        if let Some((min_dbz, max_area)) = opts.speck {
            chain.speck(min_dbz, max_area);
        }
        if low_elevation {
            if let Some((min_dbz, max_area, max_n)) = opts.speck_norm_old {
                chain.speck_norm_old(min_dbz, max_area, max_n);
            }
            if let Some((max_dbz, r1, r2)) = opts.softcut {
                chain.softcut(max_dbz, r1, r2);
            }
            if let Some((min_rel_dbz, max_area)) = opts.ship {
                chain.ship(min_rel_dbz, max_area);
            }
            if let Some((min_dbz, length, width)) = opts.emitter2 {
                chain.emitter2(min_dbz, length, width);
            }
        }

        chain.classify();
        let provenance = chain.provenance();

        let restored = match (opts.restore, opts.restore_fill) {
            (true, false) => chain.restore(opts.restore_thresh)?,
            (false, true) => chain.restore2(opts.restore_thresh)?,
            _ => {
                return Err(RopoError::Config(
                    "exactly one of restore and restore-fill must be set".to_string(),
                ))
            }
        };

        let classification = chain
            .classification()
            .cloned()
            .unwrap_or_else(|| ndarray::Array2::zeros(restored.dim()));
        let markers = chain
            .markers()
            .cloned()
            .unwrap_or_else(|| ndarray::Array2::zeros(restored.dim()));

        let data = match restored.to_raw_data() {
            RawData::U8(a) => RawData::U8(padding::strip_rows(&a, pad)?),
            RawData::U16(a) => RawData::U16(padding::strip_rows(&a, pad)?),
            RawData::U32(a) => RawData::U32(padding::strip_rows(&a, pad)?),
        };
        let classification = padding::strip_rows(&classification, pad)?;
        let markers = padding::strip_rows(&markers, pad)?;

        if mode == ProcessingMode::AnalyzeAndApply {
            if let Some(param) = scan.param_mut(quantity) {
                // Only the sample plane changes; the calibration quadruple
                // is the input's, untouched.
                param.data = data;
            }
        }

        scan.set_quality(QualityField {
            task: CLASSIFICATION_TASK.to_string(),
            task_args: provenance.clone(),
            data: classification,
        });
        scan.set_quality(QualityField {
            task: MARKER_TASK.to_string(),
            task_args: provenance,
            data: markers,
        });

        log::info!(
            "Processed scan at {:.1} deg ({} detectors, pad {})",
            scan.elangle,
            chain.probability_field_count(),
            pad
        );
        Ok(())
    }
}

/// True when the object already carries the classification quality field on
/// the scan, or on every scan of a volume.
fn already_classified(object: &RadarObject) -> bool {
    match object {
        RadarObject::Scan(scan) => scan.quality_by_task(CLASSIFICATION_TASK).is_some(),
        RadarObject::Volume(volume) => {
            !volume.scans.is_empty()
                && volume
                    .scans
                    .iter()
                    .all(|s| s.quality_by_task(CLASSIFICATION_TASK).is_some())
        }
    }
}

/// Fills empty scan-level what attributes from the volume.
fn copy_top_attributes(volume: &mut Volume) {
    for scan in &mut volume.scans {
        if scan.date.is_empty() {
            scan.date = volume.date.clone();
        }
        if scan.time.is_empty() {
            scan.time = volume.time.clone();
        }
        if scan.source.is_empty() {
            scan.source = volume.source.clone();
        }
    }
}

/// 0-based month index from a YYYYMMDD date string.
fn month_index(date: &str) -> RopoResult<usize> {
    let parsed = NaiveDate::parse_from_str(date, "%Y%m%d")
        .map_err(|e| RopoError::Processing(format!("malformed date {:?}: {}", date, e)))?;
    Ok(parsed.month0() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_index_is_zero_based() {
        assert_eq!(month_index("20250115").unwrap(), 0);
        assert_eq!(month_index("20251231").unwrap(), 11);
        assert!(month_index("2025-01-15").is_err());
        assert!(month_index("").is_err());
    }
}
