mod common;

use sisr_core::error::SisrError;
use sisr_core::frame::HeaderValue;
use sisr_core::store::{FileExistenceCache, FrameStore, NoCache, DIFFERENCE_NAME};
use sisr_core::subtract::{subtract_frames, PlainDifference, SubtractOutcome};

use common::*;

#[test]
fn test_difference_written_once_then_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let align = dir.path().join("cal/wcs/align");
    let reference = write_frame(
        &align,
        "a-000.fit",
        constant(8, 8, 120.0),
        &[exposure(30.0), ("OBJECT", HeaderValue::Text("SN field".into()))],
    );
    let mut later = constant(8, 8, 100.0);
    later[[4, 5]] = 900.0;
    let target = write_frame(&align, "a-001.fit", later, &[exposure(60.0)]);
    let store = FrameStore::new();

    let outcome = subtract_frames(
        &store,
        &FileExistenceCache,
        &reference,
        &target,
        dir.path(),
        &PlainDifference,
        true,
    )
    .unwrap();
    let SubtractOutcome::Written(path) = outcome else {
        panic!("expected a written difference, got {outcome:?}");
    };
    assert_eq!(path, dir.path().join(DIFFERENCE_NAME));

    let diff = read(&path);
    assert_eq!(diff.data[[0, 0]], 20.0);
    assert_eq!(diff.data[[4, 5]], -780.0);
    assert_eq!(diff.header.image_type(), Some("Difference"));
    assert_eq!(diff.header.get_str("OBJECT"), Some("SN field"));
    assert_eq!(diff.header.exposure_time(), Some(30.0));
    assert!(diff.header.history().any(|h| h.contains("a-001.fit")));

    let before = snapshot(dir.path());
    let again = subtract_frames(
        &store,
        &FileExistenceCache,
        &reference,
        &target,
        dir.path(),
        &PlainDifference,
        true,
    )
    .unwrap();
    assert!(matches!(again, SubtractOutcome::Skipped(p) if p == path));
    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn test_difference_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let reference = write_frame(dir.path(), "a-000.fit", constant(4, 4, 5.0), &[]);
    let target = write_frame(dir.path(), "a-001.fit", constant(4, 4, 2.0), &[]);

    let outcome = subtract_frames(
        &FrameStore::new(),
        &NoCache,
        &reference,
        &target,
        dir.path(),
        &PlainDifference,
        false,
    )
    .unwrap();
    match outcome {
        SubtractOutcome::Computed(frame) => assert!(frame.data.iter().all(|&v| v == 3.0)),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(!dir.path().join(DIFFERENCE_NAME).exists());
}

#[test]
fn test_difference_rejects_mismatched_frames() {
    let dir = tempfile::tempdir().unwrap();
    let reference = write_frame(dir.path(), "a-000.fit", constant(4, 4, 5.0), &[]);
    let target = write_frame(dir.path(), "a-001.fit", constant(4, 6, 2.0), &[]);

    let result = subtract_frames(
        &FrameStore::new(),
        &FileExistenceCache,
        &reference,
        &target,
        dir.path(),
        &PlainDifference,
        true,
    );
    assert!(matches!(result, Err(SisrError::ShapeMismatch { .. })));
    assert!(!dir.path().join(DIFFERENCE_NAME).exists());
}
