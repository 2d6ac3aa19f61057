mod common;

use ndarray::Array2;
use sisr_core::combine::{combine, combine_paths, CombineMethod, CombineOptions, SigmaClipParams};
use sisr_core::error::SisrError;

use common::*;

fn ramp(h: usize, w: usize, seed: usize) -> Array2<f32> {
    Array2::from_shape_fn((h, w), |(r, c)| ((r * 31 + c * 17 + seed * 7) % 23) as f32 + seed as f32)
}

fn clipped(method: CombineMethod) -> CombineOptions {
    CombineOptions {
        method,
        sigma_clip: Some(SigmaClipParams::default()),
        memory_limit_bytes: None,
    }
}

// ---------------------------------------------------------------------------
// In-memory combination
// ---------------------------------------------------------------------------

#[test]
fn test_single_frame_is_identity_for_every_method() {
    let frame = ramp(6, 5, 1);
    for method in [CombineMethod::Median, CombineMethod::Mean, CombineMethod::Sum] {
        assert_eq!(combine(&[frame.clone()], &CombineOptions::with_method(method)).unwrap(), frame);
        assert_eq!(combine(&[frame.clone()], &clipped(method)).unwrap(), frame);
    }
}

#[test]
fn test_median_of_even_count_averages_middle_pair() {
    let frames: Vec<Array2<f32>> = [1.0, 2.0, 4.0, 10.0]
        .iter()
        .map(|&v| Array2::from_elem((2, 2), v))
        .collect();
    let out = combine(&frames, &CombineOptions::default()).unwrap();
    assert!((out[[1, 1]] - 3.0).abs() < 1e-6);
}

#[test]
fn test_mean_and_sum() {
    let frames: Vec<Array2<f32>> = [1.0, 2.0, 6.0]
        .iter()
        .map(|&v| Array2::from_elem((3, 3), v))
        .collect();
    let mean = combine(&frames, &CombineOptions::with_method(CombineMethod::Mean)).unwrap();
    let sum = combine(&frames, &CombineOptions::with_method(CombineMethod::Sum)).unwrap();
    assert!((mean[[0, 0]] - 3.0).abs() < 1e-6);
    assert!((sum[[2, 2]] - 9.0).abs() < 1e-6);
}

#[test]
fn test_sigma_clip_rejects_outlier_before_mean() {
    let mut frames: Vec<Array2<f32>> = (0..20).map(|_| Array2::from_elem((2, 2), 100.0)).collect();
    frames[3][[0, 0]] = 10_000.0;
    let plain = combine(&frames, &CombineOptions::with_method(CombineMethod::Mean)).unwrap();
    let clip = combine(&frames, &clipped(CombineMethod::Mean)).unwrap();
    // (19 * 100 + 10000) / 20
    assert!((plain[[0, 0]] - 595.0).abs() < 1e-3);
    assert!((clip[[0, 0]] - 100.0).abs() < 1e-3);
    assert!((clip[[1, 1]] - 100.0).abs() < 1e-6);
}

#[test]
fn test_non_finite_samples_are_ignored() {
    let mut a = Array2::from_elem((2, 2), 2.0f32);
    let b = Array2::from_elem((2, 2), 4.0f32);
    a[[0, 0]] = f32::NAN;
    let mut c = Array2::from_elem((2, 2), 6.0f32);
    c[[0, 0]] = f32::NAN;
    let out = combine(&[a, b, c], &CombineOptions::with_method(CombineMethod::Mean)).unwrap();
    assert!((out[[0, 0]] - 4.0).abs() < 1e-6);
    assert!((out[[1, 1]] - 4.0).abs() < 1e-6);
}

#[test]
fn test_empty_and_mismatched_groups() {
    assert!(matches!(
        combine(&[], &CombineOptions::default()),
        Err(SisrError::EmptyGroup)
    ));
    let result = combine(
        &[Array2::zeros((2, 2)), Array2::zeros((2, 3))],
        &CombineOptions::default(),
    );
    assert!(matches!(result, Err(SisrError::ShapeMismatch { .. })));
}

// ---------------------------------------------------------------------------
// Streaming from disk
// ---------------------------------------------------------------------------

#[test]
fn test_memory_ceiling_does_not_change_result() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = (0..5)
        .map(|i| write_frame(dir.path(), &format!("f{i}.fit"), ramp(37, 29, i), &[exposure(10.0)]))
        .collect();

    for method in [CombineMethod::Median, CombineMethod::Mean, CombineMethod::Sum] {
        let mut options = clipped(method);
        let whole = combine_paths(&paths, &options).unwrap();
        // One row per band.
        options.memory_limit_bytes = Some(1);
        let banded = combine_paths(&paths, &options).unwrap();
        assert_eq!(whole.data, banded.data, "{method}");
        // Bands that do not divide the height.
        options.memory_limit_bytes = Some(29 * 5 * 4 * 8);
        let uneven = combine_paths(&paths, &options).unwrap();
        assert_eq!(whole.data, uneven.data, "{method}");
    }
}

#[test]
fn test_combined_header_records_provenance() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = (0..3)
        .map(|i| write_frame(dir.path(), &format!("d{i}.fit"), ramp(4, 4, i), &[exposure(30.0)]))
        .collect();
    let frame = combine_paths(&paths, &clipped(CombineMethod::Median)).unwrap();
    assert_eq!(frame.header.get_i64("NCOMBINE"), Some(3));
    assert_eq!(frame.header.get_str("COMBMETH"), Some("median"));
    assert_eq!(frame.header.exposure_time(), Some(30.0));
    assert!(frame.header.contains("CLIPSIG"));
}

#[test]
fn test_streaming_rejects_mismatched_shapes() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_frame(dir.path(), "a.fit", constant(4, 4, 1.0), &[]);
    let b = write_frame(dir.path(), "b.fit", constant(4, 5, 1.0), &[]);
    assert!(matches!(
        combine_paths(&[a, b], &CombineOptions::default()),
        Err(SisrError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        combine_paths(&[], &CombineOptions::default()),
        Err(SisrError::EmptyGroup)
    ));
}
