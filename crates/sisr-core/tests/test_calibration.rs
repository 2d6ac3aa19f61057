mod common;

use ndarray::Array2;
use sisr_core::calibration::{
    build_flatfield, build_master_dark, flatfield_from_frames, prepare_flatfield,
    prepare_master_dark, NormalizeMode,
};
use sisr_core::combine::CombineOptions;
use sisr_core::error::SisrError;
use sisr_core::frame::Frame;
use sisr_core::store::{FileExistenceCache, FrameStore, FLATFIELD_NAME, MASTER_DARK_NAME};

use common::*;

// ---------------------------------------------------------------------------
// Master dark
// ---------------------------------------------------------------------------

#[test]
fn test_master_dark_is_pixel_median() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = [90.0, 100.0, 400.0]
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            write_frame(dir.path(), &format!("d{i}.fit"), constant(4, 4, v), &[exposure(30.0)])
        })
        .collect();
    let master = build_master_dark(&paths, &CombineOptions::default()).unwrap();
    assert!(master.data.iter().all(|&v| v == 100.0));
    assert_eq!(master.header.exposure_time(), Some(30.0));
    assert_eq!(master.header.image_type(), Some("Master Dark"));
}

#[test]
fn test_prepare_master_dark_reuses_existing_product() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..3 {
        write_frame(dir.path(), &format!("d{i}.fit"), constant(4, 4, 100.0), &[exposure(30.0)]);
    }
    let store = FrameStore::new();
    let options = CombineOptions::default();
    let first =
        prepare_master_dark(&store, &FileExistenceCache, dir.path(), &options, true).unwrap();
    assert!(!first.reused);
    assert_eq!(first.path.as_deref(), Some(dir.path().join(MASTER_DARK_NAME).as_path()));
    let bytes = std::fs::read(dir.path().join(MASTER_DARK_NAME)).unwrap();

    // The product itself is never an input on the second pass.
    let second =
        prepare_master_dark(&store, &FileExistenceCache, dir.path(), &options, true).unwrap();
    assert!(second.reused);
    assert_eq!(second.frame.data, first.frame.data);
    assert_eq!(std::fs::read(dir.path().join(MASTER_DARK_NAME)).unwrap(), bytes);
}

#[test]
fn test_empty_dark_directory_is_missing_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let result = prepare_master_dark(
        &FrameStore::new(),
        &FileExistenceCache,
        dir.path(),
        &CombineOptions::default(),
        true,
    );
    assert!(matches!(result, Err(SisrError::MissingCalibration(_))));
}

#[test]
fn test_write_disabled_keeps_master_in_memory() {
    let dir = tempfile::tempdir().unwrap();
    write_frame(dir.path(), "d0.fit", constant(2, 2, 5.0), &[exposure(10.0)]);
    let master = prepare_master_dark(
        &FrameStore::new(),
        &FileExistenceCache,
        dir.path(),
        &CombineOptions::default(),
        false,
    )
    .unwrap();
    assert!(master.path.is_none());
    assert!(!dir.path().join(MASTER_DARK_NAME).exists());
}

// ---------------------------------------------------------------------------
// Flatfield
// ---------------------------------------------------------------------------

#[test]
fn test_flatfield_has_unit_mean() {
    let flat = Array2::from_shape_fn((20, 30), |(r, c)| 1000.0 + 10.0 * r as f32 + 3.0 * c as f32);
    let dark = Array2::from_elem((20, 30), 50.0f32);
    let out = build_flatfield(&flat, 10.0, &dark, 10.0, NormalizeMode::Mean).unwrap();
    let mean = out.iter().map(|&v| v as f64).sum::<f64>() / out.len() as f64;
    assert!((mean - 1.0).abs() < 1e-5);
    assert!(out[[19, 29]] > out[[0, 0]]);
}

#[test]
fn test_flat_dark_scaled_by_exposure() {
    // 500 ADU flat at 60 s, 100 ADU dark at 30 s: 500 - 200 leaves 300 everywhere.
    let flat = Frame::with_header(constant(4, 4, 500.0), header(&[exposure(60.0)]));
    let dark = Frame::with_header(constant(4, 4, 100.0), header(&[exposure(30.0)]));
    let out = flatfield_from_frames(&flat, &dark, NormalizeMode::Median).unwrap();
    assert!(out.data.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    assert_eq!(out.header.get_f64("FLATNORM"), Some(300.0));
    assert_eq!(out.header.get_str("FLATMODE"), Some("median"));
}

#[test]
fn test_flat_rejects_dead_pixel_and_missing_exposure() {
    let mut flat = constant(4, 4, 500.0);
    flat[[2, 2]] = 100.0;
    let dark = constant(4, 4, 100.0);
    assert!(matches!(
        build_flatfield(&flat, 30.0, &dark, 30.0, NormalizeMode::Mean),
        Err(SisrError::Division(_))
    ));

    let no_exposure = Frame::new(constant(4, 4, 500.0));
    let master = Frame::with_header(dark, header(&[exposure(30.0)]));
    assert!(matches!(
        flatfield_from_frames(&no_exposure, &master, NormalizeMode::Mean),
        Err(SisrError::Config(_))
    ));
}

#[test]
fn test_prepare_flatfield_selects_dark_from_flat_header() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..3 {
        write_frame(
            dir.path(),
            &format!("f{i}.fit"),
            constant(8, 8, 500.0),
            &[exposure(30.0), filter("R")],
        );
    }
    let dark = Frame::with_header(constant(8, 8, 100.0), header(&[exposure(30.0)]));
    let store = FrameStore::new();

    let mut seen = None;
    let flat = prepare_flatfield(
        &store,
        &FileExistenceCache,
        dir.path(),
        |h| {
            seen = h.exposure_time();
            Ok(&dark)
        },
        &CombineOptions::default(),
        NormalizeMode::Mean,
        true,
    )
    .unwrap();
    assert_eq!(seen, Some(30.0));
    assert!(flat.frame.data.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    assert_eq!(flat.frame.header.filter(), Some("R"));
    assert!(dir.path().join(FLATFIELD_NAME).is_file());

    // Cached: the dark is not needed any more.
    let again = prepare_flatfield(
        &store,
        &FileExistenceCache,
        dir.path(),
        |_| panic!("dark selected for a cached flatfield"),
        &CombineOptions::default(),
        NormalizeMode::Mean,
        true,
    )
    .unwrap();
    assert!(again.reused);
}
