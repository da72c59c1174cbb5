//! Circular azimuth padding over full-size scans.

use ndarray::Array2;
use ropo::core::padding::{pad, pad_ray_count, unpad};
use ropo::{RawData, Scan, ScanParam};
use std::collections::BTreeMap;

fn scan_with(data: RawData) -> Scan {
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
            data,
            offset: -32.0,
            gain: 0.5,
            nodata: 255.0,
            undetect: 0.0,
        }],
        quality: Vec::new(),
        attrs: BTreeMap::new(),
    }
}

#[test]
fn full_circle_scan_pads_four_rays_for_four_degrees() {
    // 360 rays, one degree each: a 4 degree neighborhood is exactly 4 rays.
    let data = Array2::from_shape_fn((360, 8), |(r, _)| (r % 251) as u8);
    let scan = scan_with(RawData::U8(data.clone()));

    let (padded, p) = pad(&scan, "DBZH", 4.0).unwrap();
    assert_eq!(p, 4);
    assert_eq!(padded.nrays(), 368);

    let padded_data = match &padded.param("DBZH").unwrap().data {
        RawData::U8(a) => a.clone(),
        _ => panic!("storage width changed"),
    };
    // Leading pad rows are copies of the trailing edge and vice versa.
    for i in 0..4 {
        assert_eq!(padded_data.row(i), data.row(356 + i));
        assert_eq!(padded_data.row(364 + i), data.row(i));
    }
    assert_eq!(padded_data.row(4), data.row(0));
}

#[test]
fn fractional_quotient_rounds_the_pad_up() {
    assert_eq!(pad_ray_count(4.0, 420), 5);
    assert_eq!(pad_ray_count(4.0, 360), 4);
    assert_eq!(pad_ray_count(6.0, 360), 6);
}

#[test]
fn unpad_restores_the_original_dimensions() {
    let data = Array2::from_shape_fn((360, 8), |(r, b)| ((r + b) % 251) as u8);
    let scan = scan_with(RawData::U8(data.clone()));

    let (padded, p) = pad(&scan, "DBZH", 4.0).unwrap();
    let classification = Array2::<u8>::zeros((padded.nrays(), padded.nbins()));
    let (stripped, cls) = unpad(&padded, &classification, p).unwrap();

    assert_eq!(stripped.nrays(), 360);
    assert_eq!(cls.dim(), (360, 8));
    match &stripped.param("DBZH").unwrap().data {
        RawData::U8(a) => assert_eq!(a, &data),
        _ => panic!("storage width changed"),
    }
}

#[test]
fn oversized_pad_is_rejected() {
    let data = Array2::<u8>::zeros((6, 8));
    let scan = scan_with(RawData::U8(data));
    // 6 rays of 60 degrees each; a 180 degree neighborhood needs 3 rays and
    // stripping 3 from both ends of 6 leaves nothing.
    assert!(pad(&scan, "DBZH", 180.0).is_err());
}

#[test]
fn padding_preserves_wider_storage() {
    let data = Array2::from_shape_fn((360, 8), |(r, _)| (r * 100) as u16);
    let scan = scan_with(RawData::U16(data.clone()));

    let (padded, p) = pad(&scan, "DBZH", 4.0).unwrap();
    assert_eq!(p, 4);
    match &padded.param("DBZH").unwrap().data {
        RawData::U16(a) => {
            assert_eq!(a.nrows(), 368);
            assert_eq!(a.row(4), data.row(0));
        }
        _ => panic!("storage width changed"),
    }
}
