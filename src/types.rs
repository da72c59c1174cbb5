use ndarray::Array2;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Working-space calibration used when non-8-bit data is mapped down to the
/// 8-bit detector space: dBZ = BYTE_OFFSET + byte * BYTE_GAIN.
pub const BYTE_OFFSET: f64 = -32.0;
pub const BYTE_GAIN: f64 = 0.5;
pub const BYTE_NODATA: f64 = 255.0;
pub const BYTE_UNDETECT: f64 = 0.0;

/// Error types for ropo processing
#[derive(Debug, thiserror::Error)]
pub enum RopoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for ropo operations
pub type RopoResult<T> = Result<T, RopoError>;

/// Sample storage width of a polar parameter. Preserved end-to-end:
/// a restored image is emitted with the width its source was read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageWidth {
    U8,
    U16,
    U32,
}

/// Raw sample plane of one scan parameter, ray x gate.
#[derive(Debug, Clone, PartialEq)]
pub enum RawData {
    U8(Array2<u8>),
    U16(Array2<u16>),
    U32(Array2<u32>),
}

impl RawData {
    pub fn width(&self) -> StorageWidth {
        match self {
            RawData::U8(_) => StorageWidth::U8,
            RawData::U16(_) => StorageWidth::U16,
            RawData::U32(_) => StorageWidth::U32,
        }
    }

    /// (nrays, nbins)
    pub fn dim(&self) -> (usize, usize) {
        match self {
            RawData::U8(a) => a.dim(),
            RawData::U16(a) => a.dim(),
            RawData::U32(a) => a.dim(),
        }
    }

    /// Converts a plane of raw values into storage of the requested width,
    /// rounding and clamping to the representable range.
    pub fn from_f64(values: &Array2<f64>, width: StorageWidth) -> RawData {
        match width {
            StorageWidth::U8 => {
                RawData::U8(values.mapv(|v| v.round().clamp(0.0, u8::MAX as f64) as u8))
            }
            StorageWidth::U16 => {
                RawData::U16(values.mapv(|v| v.round().clamp(0.0, u16::MAX as f64) as u16))
            }
            StorageWidth::U32 => {
                RawData::U32(values.mapv(|v| v.round().clamp(0.0, u32::MAX as f64) as u32))
            }
        }
    }

    pub fn to_f64(&self) -> Array2<f64> {
        match self {
            RawData::U8(a) => plane_to_f64(a),
            RawData::U16(a) => plane_to_f64(a),
            RawData::U32(a) => plane_to_f64(a),
        }
    }
}

fn plane_to_f64<T: ToPrimitive + Copy>(a: &Array2<T>) -> Array2<f64> {
    a.mapv(|v| v.to_f64().unwrap_or(0.0))
}

/// One parameter (quantity) of a polar scan with its calibration quadruple.
#[derive(Debug, Clone)]
pub struct ScanParam {
    pub quantity: String,
    pub data: RawData,
    pub offset: f64,
    pub gain: f64,
    pub nodata: f64,
    pub undetect: f64,
}

impl ScanParam {
    pub fn nrays(&self) -> usize {
        self.data.dim().0
    }

    pub fn nbins(&self) -> usize {
        self.data.dim().1
    }
}

/// A quality field attached to a scan, identified by its how/task string.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityField {
    pub task: String,
    pub task_args: String,
    pub data: Array2<u8>,
}

/// One single-elevation polar sweep.
#[derive(Debug, Clone)]
pub struct Scan {
    /// Elevation angle in degrees.
    pub elangle: f64,
    /// Range bin depth in meters.
    pub rscale: f64,
    /// Acquisition date, YYYYMMDD.
    pub date: String,
    /// Acquisition time, HHMMSS.
    pub time: String,
    /// ODIM what/source string.
    pub source: String,
    pub longitude: f64,
    pub latitude: f64,
    pub height: f64,
    pub beamwidth: f64,
    pub params: Vec<ScanParam>,
    pub quality: Vec<QualityField>,
    /// Free-form how attributes.
    pub attrs: BTreeMap<String, String>,
}

impl Scan {
    pub fn nrays(&self) -> usize {
        self.params.first().map(|p| p.nrays()).unwrap_or(0)
    }

    pub fn nbins(&self) -> usize {
        self.params.first().map(|p| p.nbins()).unwrap_or(0)
    }

    pub fn param(&self, quantity: &str) -> Option<&ScanParam> {
        self.params.iter().find(|p| p.quantity == quantity)
    }

    pub fn param_mut(&mut self, quantity: &str) -> Option<&mut ScanParam> {
        self.params.iter_mut().find(|p| p.quantity == quantity)
    }

    pub fn has_param(&self, quantity: &str) -> bool {
        self.param(quantity).is_some()
    }

    pub fn quality_by_task(&self, task: &str) -> Option<&QualityField> {
        self.quality.iter().find(|q| q.task == task)
    }

    /// Attaches a quality field, replacing any previous field carrying the
    /// same task identifier.
    pub fn set_quality(&mut self, field: QualityField) {
        if let Some(existing) = self.quality.iter_mut().find(|q| q.task == field.task) {
            *existing = field;
        } else {
            self.quality.push(field);
        }
    }
}

/// An ordered collection of scans from one acquisition.
#[derive(Debug, Clone)]
pub struct Volume {
    pub date: String,
    pub time: String,
    pub source: String,
    pub longitude: f64,
    pub latitude: f64,
    pub height: f64,
    pub beamwidth: f64,
    pub attrs: BTreeMap<String, String>,
    pub scans: Vec<Scan>,
}

/// Top-level radar object accepted by the entry point.
#[derive(Debug, Clone)]
pub enum RadarObject {
    Scan(Scan),
    Volume(Volume),
}

impl RadarObject {
    pub fn source(&self) -> &str {
        match self {
            RadarObject::Scan(s) => &s.source,
            RadarObject::Volume(v) => &v.source,
        }
    }

    pub fn source_mut(&mut self) -> &mut String {
        match self {
            RadarObject::Scan(s) => &mut s.source,
            RadarObject::Volume(v) => &mut v.source,
        }
    }
}

/// Quality control modes recognized by the entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    /// Write restored data back into the processed parameter (default).
    AnalyzeAndApply,
    /// Attach the classification field but leave the original data untouched.
    AnalyzeOnly,
}

/// Ray x gate reflectivity image bound into a detector chain.
///
/// Detectors operate on an 8-bit working plane; the native-width samples are
/// carried alongside so restoration can emit data in the width the source was
/// stored with. For 8-bit sources the working plane is the data itself and
/// both calibrations coincide; wider sources are mapped down through dBZ onto
/// the fixed working scale (BYTE_OFFSET/BYTE_GAIN).
#[derive(Debug, Clone)]
pub struct PolarImage {
    bytes: Array2<u8>,
    raw: Array2<f64>,
    storage: StorageWidth,
    /// Elevation angle in degrees.
    pub elangle: f64,
    /// Range bin depth in meters.
    pub bin_depth: f64,
    /// Working-plane calibration.
    pub offset: f64,
    pub gain: f64,
    pub nodata: f64,
    pub undetect: f64,
    /// Native calibration of the source parameter.
    pub orig_offset: f64,
    pub orig_gain: f64,
    pub orig_nodata: f64,
    pub orig_undetect: f64,
    attrs: BTreeMap<String, String>,
}

impl PolarImage {
    /// Binds the named parameter of a scan.
    pub fn from_scan(scan: &Scan, quantity: &str) -> RopoResult<PolarImage> {
        let param = scan
            .param(quantity)
            .ok_or_else(|| RopoError::MissingParameter(quantity.to_string()))?;

        let raw = param.data.to_f64();
        let storage = param.data.width();

        let (bytes, offset, gain, nodata, undetect) = match storage {
            StorageWidth::U8 => {
                let bytes = raw.mapv(|v| v as u8);
                (bytes, param.offset, param.gain, param.nodata, param.undetect)
            }
            _ => {
                // Wider data goes through dBZ onto the working scale.
                let (po, pg, pn, pu) = (param.offset, param.gain, param.nodata, param.undetect);
                let bytes = raw.mapv(|v| {
                    if v == pn {
                        BYTE_NODATA as u8
                    } else if v == pu {
                        BYTE_UNDETECT as u8
                    } else {
                        let dbz = po + pg * v;
                        ((dbz - BYTE_OFFSET) / BYTE_GAIN).round().clamp(1.0, 254.0) as u8
                    }
                });
                (bytes, BYTE_OFFSET, BYTE_GAIN, BYTE_NODATA, BYTE_UNDETECT)
            }
        };

        Ok(PolarImage {
            bytes,
            raw,
            storage,
            elangle: scan.elangle,
            bin_depth: scan.rscale,
            offset,
            gain,
            nodata,
            undetect,
            orig_offset: param.offset,
            orig_gain: param.gain,
            orig_nodata: param.nodata,
            orig_undetect: param.undetect,
            attrs: BTreeMap::new(),
        })
    }

    /// (nrays, nbins)
    pub fn dim(&self) -> (usize, usize) {
        self.bytes.dim()
    }

    pub fn nrays(&self) -> usize {
        self.bytes.dim().0
    }

    pub fn nbins(&self) -> usize {
        self.bytes.dim().1
    }

    pub fn storage(&self) -> StorageWidth {
        self.storage
    }

    pub fn bytes(&self) -> &Array2<u8> {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut Array2<u8> {
        &mut self.bytes
    }

    pub fn raw(&self) -> &Array2<f64> {
        &self.raw
    }

    pub fn raw_mut(&mut self) -> &mut Array2<f64> {
        &mut self.raw
    }

    /// Replaces both sample planes in lockstep. The planes must agree in shape.
    pub fn set_planes(&mut self, bytes: Array2<u8>, raw: Array2<f64>) -> RopoResult<()> {
        if bytes.dim() != raw.dim() {
            return Err(RopoError::Processing(format!(
                "working plane {:?} and raw plane {:?} disagree in shape",
                bytes.dim(),
                raw.dim()
            )));
        }
        self.bytes = bytes;
        self.raw = raw;
        Ok(())
    }

    /// Converts a dBZ threshold into the working-plane raw value.
    pub fn byte_from_dbz(&self, dbz: f64) -> u8 {
        ((dbz - self.offset) / self.gain).round().clamp(0.0, 255.0) as u8
    }

    /// Calibrated value of one working-plane sample.
    pub fn dbz_at(&self, ray: usize, bin: usize) -> f64 {
        self.offset + self.gain * self.bytes[[ray, bin]] as f64
    }

    /// Native-width sample plane, for writing back onto a scan parameter.
    pub fn to_raw_data(&self) -> RawData {
        RawData::from_f64(&self.raw, self.storage)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(|s| s.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        self.attrs.insert(name.to_string(), value.to_string());
    }
}
