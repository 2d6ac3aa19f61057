mod common;

use sisr_core::combine::CombineOptions;
use sisr_core::stack::{stack_group, StackOutcome};
use sisr_core::store::{FileExistenceCache, FrameStore, STACK_NAME};

use common::*;

#[test]
fn test_stack_writes_once_then_skips() {
    let dir = tempfile::tempdir().unwrap();
    let align = dir.path().join("cal/wcs/align");
    let aligned: Vec<_> = [10.0, 20.0, 60.0]
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            write_frame(&align, &format!("a-{i}.fit"), constant(6, 6, v), &[exposure(30.0)])
        })
        .collect();
    let store = FrameStore::new();
    let options = CombineOptions::default();

    let outcome =
        stack_group(&store, &FileExistenceCache, &aligned, dir.path(), &options, true).unwrap();
    let StackOutcome::Written { path, frames } = outcome else {
        panic!("expected a written stack, got {outcome:?}");
    };
    assert_eq!(path, dir.path().join(STACK_NAME));
    assert_eq!(frames, 3);
    let stack = read(&path);
    assert!(stack.data.iter().all(|&v| v == 20.0));
    assert_eq!(stack.header.image_type(), Some("Stack"));
    assert_eq!(stack.header.get_i64("NCOMBINE"), Some(3));

    let again =
        stack_group(&store, &FileExistenceCache, &aligned, dir.path(), &options, true).unwrap();
    assert!(matches!(again, StackOutcome::Skipped(p) if p == path));
}

#[test]
fn test_stack_without_inputs_or_writes() {
    let dir = tempfile::tempdir().unwrap();
    let store = FrameStore::new();
    let options = CombineOptions::default();
    let empty = stack_group(&store, &FileExistenceCache, &[], dir.path(), &options, true).unwrap();
    assert!(matches!(empty, StackOutcome::Empty));

    let input = write_frame(dir.path(), "a-0.fit", constant(2, 2, 7.0), &[]);
    let computed =
        stack_group(&store, &FileExistenceCache, &[input], dir.path(), &options, false).unwrap();
    match computed {
        StackOutcome::Computed { frame, frames } => {
            assert_eq!(frames, 1);
            assert_eq!(frame.data[[1, 1]], 7.0);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(!dir.path().join(STACK_NAME).exists());
}
