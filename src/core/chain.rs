//! Detector chain: binds one reflectivity image, accumulates probability
//! fields from the detectors run against it, merges them into a single
//! classification with marker codes, and drives restoration.

use crate::core::detectors::{AnomalyDetector, MarkerCode};
use crate::core::restore::{restore_image, restore_image2};
use crate::types::{PolarImage, RopoResult};
use ndarray::Array2;

/// Task identifier of the merged classification quality field.
pub const CLASSIFICATION_TASK: &str = "fi.fmi.ropo.detector.classification";
/// Task identifier of the marker-plane quality field.
pub const MARKER_TASK: &str = "fi.fmi.ropo.detector.classification_marker";
/// Task identifier recorded on restored data.
pub const RESTORE_TASK: &str = "fi.fmi.ropo.restore";

/// One detector's output, kept in insertion order for the merge.
#[derive(Debug, Clone)]
pub struct ProbabilityField {
    pub data: Array2<u8>,
    pub marker: MarkerCode,
    pub task_args: String,
}

/// Accumulates detector runs against a bound image.
#[derive(Debug, Clone)]
pub struct DetectorChain {
    image: PolarImage,
    fields: Vec<ProbabilityField>,
    classification: Option<Array2<u8>>,
    markers: Option<Array2<u8>>,
}

impl DetectorChain {
    pub fn new(image: PolarImage) -> DetectorChain {
        DetectorChain {
            image,
            fields: Vec::new(),
            classification: None,
            markers: None,
        }
    }

    pub fn image(&self) -> &PolarImage {
        &self.image
    }

    /// Rebinds the chain onto a new image, discarding every accumulated
    /// probability field and cached classification.
    pub fn set_image(&mut self, image: PolarImage) {
        self.image = image;
        self.fields.clear();
        self.classification = None;
        self.markers = None;
    }

    /// Absolute reflectivity pre-filter. Blanks every working-plane sample
    /// below the raw threshold directly on the bound image; produces no
    /// probability field.
    pub fn threshold(&mut self, thresh: u8) {
        let nodata = self.image.nodata as u8;
        let undetect = self.image.orig_undetect;
        let mut bytes = self.image.bytes().clone();
        let mut raw = self.image.raw().clone();
        for (byte, raw_v) in bytes.iter_mut().zip(raw.iter_mut()) {
            if *byte < thresh && *byte != nodata {
                *byte = 0;
                *raw_v = undetect;
            }
        }
        // Same shape in, same shape out; cannot fail.
        let _ = self.image.set_planes(bytes, raw);
        self.classification = None;
        self.markers = None;
    }

    /// Runs a detector against the bound image and accumulates its output.
    pub fn add(&mut self, detector: AnomalyDetector) -> &mut Self {
        log::debug!("Running detector {}", detector.task_args());
        let data = detector.run(&self.image);
        self.fields.push(ProbabilityField {
            data,
            marker: detector.marker(),
            task_args: detector.task_args(),
        });
        self.classification = None;
        self.markers = None;
        self
    }

    pub fn speck(&mut self, min_dbz: i32, max_area: i32) -> &mut Self {
        self.add(AnomalyDetector::Speck { min_dbz, max_area })
    }

    pub fn speck_norm_old(&mut self, min_dbz: i32, max_area: i32, max_n: i32) -> &mut Self {
        self.add(AnomalyDetector::SpeckNormOld {
            min_dbz,
            max_area,
            max_n,
        })
    }

    pub fn softcut(&mut self, max_dbz: i32, range_km: i32, range2_km: i32) -> &mut Self {
        self.add(AnomalyDetector::Softcut {
            max_dbz,
            range_km,
            range2_km,
        })
    }

    pub fn ship(&mut self, min_rel_dbz: i32, max_area: i32) -> &mut Self {
        self.add(AnomalyDetector::Ship {
            min_rel_dbz,
            max_area,
        })
    }

    pub fn emitter(&mut self, min_dbz: i32, length: i32) -> &mut Self {
        self.add(AnomalyDetector::Emitter { min_dbz, length })
    }

    pub fn emitter2(&mut self, min_dbz: i32, length: i32, width: i32) -> &mut Self {
        self.add(AnomalyDetector::Emitter2 {
            min_dbz,
            length,
            width,
        })
    }

    pub fn clutter(&mut self, min_dbz: i32, max_area: i32) -> &mut Self {
        self.add(AnomalyDetector::Clutter { min_dbz, max_area })
    }

    pub fn biomet(
        &mut self,
        max_dbz: i32,
        dbz_delta: i32,
        max_alt: i32,
        alt_delta: i32,
    ) -> &mut Self {
        self.add(AnomalyDetector::Biomet {
            max_dbz,
            dbz_delta,
            max_alt,
            alt_delta,
        })
    }

    pub fn sun(&mut self, min_dbz: i32, min_length: i32, max_thickness: i32) -> &mut Self {
        self.add(AnomalyDetector::Sun {
            min_dbz,
            min_length,
            max_thickness,
        })
    }

    pub fn sun2(
        &mut self,
        min_dbz: i32,
        min_length: i32,
        max_thickness: i32,
        azimuth: i32,
        azimuth_delta: i32,
    ) -> &mut Self {
        self.add(AnomalyDetector::Sun2 {
            min_dbz,
            min_length,
            max_thickness,
            azimuth,
            azimuth_delta,
        })
    }

    pub fn probability_field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn probability_field(&self, index: usize) -> Option<&ProbabilityField> {
        self.fields.get(index)
    }

    /// Provenance of the accumulated detectors, their tags joined with ";".
    pub fn provenance(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.task_args.as_str())
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Merges the accumulated probability fields into the classification and
    /// marker planes. Always a full recomputation over every field, in
    /// insertion order: a detector's probability wins a pixel when it reaches
    /// the running maximum, its marker code following along.
    pub fn classify(&mut self) -> &mut Self {
        let dim = self.image.dim();
        let mut classification = Array2::<u8>::zeros(dim);
        let mut markers = Array2::<u8>::from_elem(dim, MarkerCode::Clear as u8);
        for field in &self.fields {
            for ((cls, mark), prob) in classification
                .iter_mut()
                .zip(markers.iter_mut())
                .zip(field.data.iter())
            {
                if *prob >= *cls {
                    *cls = *prob;
                    *mark = field.marker as u8;
                }
            }
        }
        self.classification = Some(classification);
        self.markers = Some(markers);
        self
    }

    /// Discards the accumulated probability fields and leaves empty-evidence
    /// classification and marker planes behind. The probability field count
    /// drops to zero and the provenance loses every detector tag.
    pub fn declassify(&mut self) -> &mut Self {
        self.fields.clear();
        self.classification = Some(Array2::zeros(self.image.dim()));
        self.markers = Some(Array2::from_elem(
            self.image.dim(),
            MarkerCode::Clear as u8,
        ));
        self
    }

    pub fn classification(&self) -> Option<&Array2<u8>> {
        self.classification.as_ref()
    }

    pub fn markers(&self) -> Option<&Array2<u8>> {
        self.markers.as_ref()
    }

    fn classification_for_restore(&mut self) -> Array2<u8> {
        if self.classification.is_none() {
            self.classify();
        }
        // classify always fills the cache
        self.classification.clone().unwrap_or_else(|| {
            Array2::zeros(self.image.dim())
        })
    }

    /// Returns a copy of the bound image with classified samples removed.
    pub fn restore(&mut self, thresh: u8) -> RopoResult<PolarImage> {
        let classification = self.classification_for_restore();
        let mut restored = self.image.clone();
        restore_image(&mut restored, &classification, thresh)?;
        restored.set_attribute("task", RESTORE_TASK);
        restored.set_attribute("task_args", &self.provenance());
        Ok(restored)
    }

    /// Returns a copy of the bound image with classified samples filled in
    /// from their surviving neighborhood.
    pub fn restore2(&mut self, thresh: u8) -> RopoResult<PolarImage> {
        let classification = self.classification_for_restore();
        let mut restored = self.image.clone();
        restore_image2(&mut restored, &classification, thresh)?;
        restored.set_attribute("task", RESTORE_TASK);
        restored.set_attribute("task_args", &self.provenance());
        Ok(restored)
    }

    /// Restores in place: the restored image replaces the bound image and the
    /// accumulated fields are discarded, as after any rebind.
    pub fn restore_self(&mut self, thresh: u8) -> RopoResult<()> {
        let restored = self.restore(thresh)?;
        self.set_image(restored);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawData, Scan, ScanParam};
    use std::collections::BTreeMap;

    fn scan(data: Array2<u8>) -> Scan {
        Scan {
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
        }
    }

    fn speckled_image() -> PolarImage {
        let mut data = Array2::<u8>::zeros((16, 16));
        data[[3, 3]] = 200;
        for r in 8..12 {
            for b in 8..14 {
                data[[r, b]] = 200;
            }
        }
        PolarImage::from_scan(&scan(data), "DBZH").unwrap()
    }

    #[test]
    fn chain_accumulates_fields_in_order() {
        let mut chain = DetectorChain::new(speckled_image());
        chain.speck(-20, 5).emitter(-10, 8);
        assert_eq!(chain.probability_field_count(), 2);
        assert_eq!(chain.probability_field(0).unwrap().task_args, "SPECK: -20,5");
        assert_eq!(
            chain.probability_field(1).unwrap().task_args,
            "EMITTER: -10,8"
        );
        assert_eq!(chain.provenance(), "SPECK: -20,5;EMITTER: -10,8");
    }

    #[test]
    fn rebind_clears_accumulated_fields() {
        let mut chain = DetectorChain::new(speckled_image());
        chain.speck(-20, 5);
        chain.set_image(speckled_image());
        assert_eq!(chain.probability_field_count(), 0);
        assert!(chain.classification().is_none());
    }

    #[test]
    fn threshold_blanks_below_without_adding_a_field() {
        let mut data = Array2::<u8>::zeros((4, 4));
        data[[1, 1]] = 10; // -27 dBZ
        data[[2, 2]] = 200; // 68 dBZ
        let mut chain = DetectorChain::new(PolarImage::from_scan(&scan(data), "DBZH").unwrap());
        // 64 on the working scale is 0 dBZ
        chain.threshold(64);
        assert_eq!(chain.probability_field_count(), 0);
        assert_eq!(chain.image().bytes()[[1, 1]], 0);
        assert_eq!(chain.image().bytes()[[2, 2]], 200);
    }

    #[test]
    fn classify_merges_with_ties_to_the_later_field() {
        let mut chain = DetectorChain::new(speckled_image());
        chain.speck(-20, 5).clutter(-20, 5);
        chain.classify();
        let markers = chain.markers().unwrap();
        // Identical probabilities on the speck pixel: the later detector's
        // marker wins the >= merge.
        assert_eq!(markers[[3, 3]], MarkerCode::Clutter as u8);
        let cls = chain.classification().unwrap();
        assert!(cls[[3, 3]] > 0);
        assert_eq!(cls[[0, 0]], 0);
    }

    #[test]
    fn declassify_clears_evidence_and_provenance() {
        let mut chain = DetectorChain::new(speckled_image());
        chain.speck(-20, 5);
        chain.classify();
        assert!(chain.classification().unwrap().iter().any(|&v| v > 0));

        chain.declassify();
        assert_eq!(chain.probability_field_count(), 0);
        assert_eq!(chain.provenance(), "");
        assert!(chain.classification().unwrap().iter().all(|&v| v == 0));
        assert!(chain.markers().unwrap().iter().all(|&v| v == 0));
    }

    #[test]
    fn reclassification_reflects_cumulative_state() {
        let mut chain = DetectorChain::new(speckled_image());
        chain.speck(-20, 5).emitter(-10, 8);
        chain.classify();
        chain.clutter(-20, 5);
        chain.classify();
        let p = chain.provenance();
        assert!(p.contains("SPECK:") && p.contains("EMITTER:") && p.contains("CLUTTER:"));
    }

    #[test]
    fn restore_is_lazy_about_classification() {
        let mut chain = DetectorChain::new(speckled_image());
        chain.speck(-20, 5);
        let restored = chain.restore(100).unwrap();
        assert_eq!(restored.bytes()[[3, 3]], 0);
        // the large block survives
        assert_eq!(restored.bytes()[[9, 9]], 200);
        assert_eq!(restored.attribute("task"), Some(RESTORE_TASK));
        assert_eq!(restored.attribute("task_args"), Some("SPECK: -20,5"));
    }

    #[test]
    fn restore_self_rebinds_the_restored_image() {
        let mut chain = DetectorChain::new(speckled_image());
        chain.speck(-20, 5);
        chain.restore_self(100).unwrap();
        assert_eq!(chain.probability_field_count(), 0);
        assert_eq!(chain.image().bytes()[[3, 3]], 0);
        assert_eq!(chain.image().attribute("task"), Some(RESTORE_TASK));
    }

    #[test]
    fn restore_idempotence_on_the_byte_plane() {
        let mut chain = DetectorChain::new(speckled_image());
        chain.speck(-20, 5);
        let once = chain.restore(100).unwrap();

        let mut chain2 = DetectorChain::new(once.clone());
        chain2.speck(-20, 5);
        let twice = chain2.restore(100).unwrap();
        assert_eq!(once.bytes(), twice.bytes());
    }
}
