use std::path::{Path, PathBuf};

use tracing::info;

use crate::combine::{combine_paths, CombineOptions};
use crate::error::Result;
use crate::frame::Frame;
use crate::store::{FrameStore, StageCache, StageKey, StageKind};

/// Outcome of stacking one group.
#[derive(Clone, Debug)]
pub enum StackOutcome {
    Written { path: PathBuf, frames: usize },
    /// Computed but not persisted.
    Computed { frame: Frame, frames: usize },
    Skipped(PathBuf),
    Empty,
}

/// Combine the aligned frames of a group into `output_dir/stack.fit`.
pub fn stack_group(
    store: &FrameStore,
    cache: &dyn StageCache,
    aligned: &[PathBuf],
    output_dir: &Path,
    options: &CombineOptions,
    write: bool,
) -> Result<StackOutcome> {
    if let Some(existing) = cache.lookup(&StageKey::group(StageKind::Stacked, output_dir)) {
        info!(output = %existing.display(), "Stack already exists, skipping");
        return Ok(StackOutcome::Skipped(existing));
    }
    if aligned.is_empty() {
        info!(dir = %output_dir.display(), "No aligned frames to stack");
        return Ok(StackOutcome::Empty);
    }

    let mut frame = combine_paths(aligned, options)?;
    frame.header.set_with_comment("IMAGETYP", "Stack", Some("type of image"));
    frame
        .header
        .add_history(&format!("stacked {} frames ({})", aligned.len(), options.method));

    let frames = aligned.len();
    if !write {
        return Ok(StackOutcome::Computed { frame, frames });
    }
    let path = StageKey::group(StageKind::Stacked, output_dir).expected_output();
    store.write(&path, &frame)?;
    info!(output = %path.display(), frames, method = %options.method, "Wrote stack");
    Ok(StackOutcome::Written { path, frames })
}
