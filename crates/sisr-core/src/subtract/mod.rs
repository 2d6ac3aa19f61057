use std::path::{Path, PathBuf};

use ndarray::{Array2, Zip};
use tracing::info;

use crate::error::{Result, SisrError};
use crate::frame::Frame;
use crate::store::{file_name, FrameStore, StageCache, StageKey, StageKind};

/// Produces a difference image from a reference and a later target frame.
pub trait FrameSubtractor: Send + Sync {
    fn name(&self) -> &str;

    fn subtract(&self, reference: &Array2<f32>, target: &Array2<f32>) -> Result<Array2<f32>>;
}

/// Pixelwise `reference - target`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainDifference;

impl FrameSubtractor for PlainDifference {
    fn name(&self) -> &str {
        "difference"
    }

    fn subtract(&self, reference: &Array2<f32>, target: &Array2<f32>) -> Result<Array2<f32>> {
        if reference.dim() != target.dim() {
            return Err(SisrError::ShapeMismatch {
                expected: reference.dim(),
                actual: target.dim(),
            });
        }
        let mut out = reference.clone();
        Zip::from(&mut out).and(target).for_each(|r, &t| *r -= t);
        Ok(out)
    }
}

/// Outcome of one frame subtraction.
#[derive(Clone, Debug)]
pub enum SubtractOutcome {
    Written(PathBuf),
    /// Computed but not persisted.
    Computed(Frame),
    Skipped(PathBuf),
}

/// Subtract `target` from `reference` into `output_dir/subtract.fit`.
///
/// Both frames are expected on the same pixel grid, as aligned frames are.
/// The difference keeps the reference header.
pub fn subtract_frames(
    store: &FrameStore,
    cache: &dyn StageCache,
    reference: &Path,
    target: &Path,
    output_dir: &Path,
    subtractor: &dyn FrameSubtractor,
    write: bool,
) -> Result<SubtractOutcome> {
    let key = StageKey::group(StageKind::Difference, output_dir);
    if let Some(existing) = cache.lookup(&key) {
        info!(output = %existing.display(), "Difference frame already exists, skipping");
        return Ok(SubtractOutcome::Skipped(existing));
    }

    let reference_frame = store.read(reference)?;
    let target_frame = store.read(target)?;
    let data = subtractor.subtract(&reference_frame.data, &target_frame.data)?;

    let mut header = reference_frame.header;
    header.set_with_comment("IMAGETYP", "Difference", Some("type of image"));
    header.add_history(&format!(
        "subtracted {} from {} with {}",
        file_name(target),
        file_name(reference),
        subtractor.name()
    ));
    let frame = Frame::with_header(data, header);

    if !write {
        return Ok(SubtractOutcome::Computed(frame));
    }
    let path = key.expected_output();
    store.write(&path, &frame)?;
    info!(
        output = %path.display(),
        reference = %file_name(reference),
        target = %file_name(target),
        "Wrote difference frame"
    );
    Ok(SubtractOutcome::Written(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_difference_is_reference_minus_target() {
        let reference = Array2::from_elem((2, 3), 10.0f32);
        let mut target = Array2::from_elem((2, 3), 4.0f32);
        target[[1, 2]] = 12.0;
        let diff = PlainDifference.subtract(&reference, &target).unwrap();
        assert_eq!(diff[[0, 0]], 6.0);
        assert_eq!(diff[[1, 2]], -2.0);
    }

    #[test]
    fn test_plain_difference_checks_shapes() {
        let reference = Array2::zeros((2, 2));
        let target = Array2::zeros((3, 2));
        assert!(matches!(
            PlainDifference.subtract(&reference, &target),
            Err(SisrError::ShapeMismatch { .. })
        ));
    }
}
