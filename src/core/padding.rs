//! Circular azimuth padding.
//!
//! Detectors that scan an azimuthal neighborhood of rays (notably the
//! emitter line filters) truncate that neighborhood at the 0/360 degree seam,
//! missing detections there. The fix is geometric: before detection the ray
//! dimension is extended with copies of the rays from the opposite edge, and
//! after detection the same number of rays is stripped from both the restored
//! data and the classification field.

use crate::types::{RawData, RopoError, RopoResult, Scan};
use ndarray::{concatenate, s, Array2, Axis};

/// Number of rays needed to cover an azimuthal neighborhood width in degrees.
///
/// An exactly integral quotient is taken as is; anything else is rounded up
/// so the padding errs on the side of one extra ray, never one short.
pub fn pad_ray_count(width_deg: f64, nrays: usize) -> usize {
    if width_deg <= 0.0 || nrays == 0 {
        return 0;
    }
    let ray_width = 360.0 / nrays as f64;
    let q = width_deg / ray_width;
    let floor = q.floor();
    if q - floor < 1e-9 {
        floor as usize
    } else {
        floor as usize + 1
    }
}

/// Builds a scan holding only the named parameter, with `pad_ray_count`
/// trailing-edge rays prepended and the same number of leading-edge rays
/// appended. Returns the padded scan and the pad count actually used.
pub fn pad(scan: &Scan, quantity: &str, width_deg: f64) -> RopoResult<(Scan, usize)> {
    let param = scan
        .param(quantity)
        .ok_or_else(|| RopoError::MissingParameter(quantity.to_string()))?;

    let nrays = param.nrays();
    let p = pad_ray_count(width_deg, nrays);
    if p * 2 >= nrays && p > 0 {
        return Err(RopoError::Processing(format!(
            "pad of {} rays does not fit a {}-ray scan",
            p, nrays
        )));
    }

    let mut padded_param = param.clone();
    padded_param.data = match &param.data {
        RawData::U8(a) => RawData::U8(wrap_rows(a, p)?),
        RawData::U16(a) => RawData::U16(wrap_rows(a, p)?),
        RawData::U32(a) => RawData::U32(wrap_rows(a, p)?),
    };

    let mut out = scan.clone();
    out.params = vec![padded_param];
    out.quality.clear();
    log::debug!(
        "Padded scan at {:.1} deg with {} rays for a {:.1} deg neighborhood",
        scan.elangle,
        p,
        width_deg
    );
    Ok((out, p))
}

/// Strips `pad` rays from both ends of the ray dimension of a scan and its
/// classification field, in lockstep.
pub fn unpad(
    scan: &Scan,
    classification: &Array2<u8>,
    pad: usize,
) -> RopoResult<(Scan, Array2<u8>)> {
    let mut out = scan.clone();
    for param in &mut out.params {
        param.data = match &param.data {
            RawData::U8(a) => RawData::U8(strip_rows(a, pad)?),
            RawData::U16(a) => RawData::U16(strip_rows(a, pad)?),
            RawData::U32(a) => RawData::U32(strip_rows(a, pad)?),
        };
    }
    let stripped = strip_rows(classification, pad)?;
    Ok((out, stripped))
}

fn wrap_rows<T: Clone>(a: &Array2<T>, p: usize) -> RopoResult<Array2<T>> {
    if p == 0 {
        return Ok(a.clone());
    }
    let n = a.nrows();
    let head = a.slice(s![n - p.., ..]);
    let tail = a.slice(s![..p, ..]);
    concatenate(Axis(0), &[head, a.view(), tail])
        .map_err(|e| RopoError::Processing(format!("failed to pad ray dimension: {}", e)))
}

pub(crate) fn strip_rows<T: Clone>(a: &Array2<T>, p: usize) -> RopoResult<Array2<T>> {
    let n = a.nrows();
    if p * 2 >= n && p > 0 {
        return Err(RopoError::Processing(format!(
            "cannot strip {} rays from both ends of a {}-ray array",
            p, n
        )));
    }
    Ok(a.slice(s![p..n - p, ..]).to_owned())
}
