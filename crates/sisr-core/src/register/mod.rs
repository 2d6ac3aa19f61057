pub mod phase_correlation;
pub mod reproject;
pub mod wcs;

use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SisrError};
use crate::frame::Frame;
use crate::report::StageReport;
use crate::store::{file_name, FrameStore, StageCache, StageKey, StageKind};

pub use phase_correlation::{compute_offset, shift_array, Offset, PhaseCorrelationRegistrator};
pub use reproject::TanReprojector;
pub use wcs::Wcs;

/// Aligns a target frame onto a reference frame from pixel data alone.
pub trait Registrator: Send + Sync {
    fn name(&self) -> &str;

    fn register(&self, target: &Array2<f32>, reference: &Array2<f32>) -> Result<Array2<f32>>;
}

/// Resamples a target onto the reference's sky grid using both WCS solutions.
/// Returns the resampled data and the footprint of covered pixels.
pub trait Reprojector: Send + Sync {
    fn name(&self) -> &str;

    fn reproject(
        &self,
        target: &Array2<f32>,
        target_wcs: &Wcs,
        reference_wcs: &Wcs,
        shape: (usize, usize),
    ) -> Result<(Array2<f32>, Array2<bool>)>;
}

/// Configured alignment method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignMethod {
    /// Match pixel content (no WCS needed).
    Feature,
    /// Resample through the plate solution.
    #[default]
    Reproject,
}

impl fmt::Display for AlignMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignMethod::Feature => write!(f, "feature"),
            AlignMethod::Reproject => write!(f, "reproject"),
        }
    }
}

/// Alignment method bound to its implementation.
#[derive(Clone, Copy)]
pub enum AlignStrategy<'a> {
    Feature(&'a dyn Registrator),
    Reproject(&'a dyn Reprojector),
}

impl AlignStrategy<'_> {
    pub fn name(&self) -> &str {
        match self {
            AlignStrategy::Feature(r) => r.name(),
            AlignStrategy::Reproject(r) => r.name(),
        }
    }
}

/// Align `inputs` onto their first member and write `a-<name>` products.
///
/// The reference is the first of the full sorted group even when its own
/// output already exists. Targets are written with the reference header.
pub fn align_group(
    store: &FrameStore,
    cache: &dyn StageCache,
    inputs: &[PathBuf],
    output_dir: &Path,
    strategy: AlignStrategy<'_>,
    write: bool,
    mut on_frame: impl FnMut(usize),
) -> Result<StageReport> {
    let mut report = StageReport::new(StageKind::Aligned);
    let Some((reference_path, targets)) = inputs.split_first() else {
        info!(dir = %output_dir.display(), "No frames to align, skipping");
        return Ok(report);
    };

    let cached =
        |input: &Path| cache.lookup(&StageKey::per_frame(StageKind::Aligned, output_dir, input));
    let pending: Vec<&PathBuf> = targets
        .iter()
        .filter(|input| match cached(input) {
            Some(existing) => {
                debug!(output = %existing.display(), "Already aligned, skipping");
                report.skipped.push(input.to_path_buf());
                false
            }
            None => true,
        })
        .collect();
    let reference_cached = cached(reference_path);

    if reference_cached.is_some() && pending.is_empty() {
        report.skipped.push(reference_path.clone());
        info!(dir = %output_dir.display(), "Nothing to align");
        return Ok(report);
    }

    store.ensure_dir(output_dir)?;
    let reference = store.read(reference_path)?;

    match reference_cached {
        Some(_) => report.skipped.push(reference_path.clone()),
        None => {
            let output = store.output_path(output_dir, StageKind::Aligned, reference_path);
            let mut frame = reference.clone();
            frame.header.add_history("alignment reference");
            if write {
                store.write(&output, &frame)?;
            }
            info!(reference = %file_name(reference_path), "Wrote alignment reference");
            report.produced.push(output);
        }
    }
    on_frame(1);

    if targets.is_empty() {
        info!(reference = %file_name(reference_path), "Single frame group, nothing to align");
        return Ok(report);
    }

    let reference_wcs = match strategy {
        AlignStrategy::Reproject(_) if !pending.is_empty() => {
            Some(Wcs::from_header(&reference.header)?)
        }
        _ => None,
    };

    info!(
        frames = pending.len(),
        reference = %file_name(reference_path),
        method = strategy.name(),
        "Aligning frames"
    );
    for (i, input) in pending.into_iter().enumerate() {
        let output = store.output_path(output_dir, StageKind::Aligned, input);
        let result = store
            .read(input)
            .and_then(|target| align_frame(&target, &reference, reference_wcs.as_ref(), strategy));
        match result {
            Ok(data) => {
                let mut header = reference.header.clone();
                header.add_history(&format!(
                    "aligned {} to {} with {}",
                    file_name(input),
                    file_name(reference_path),
                    strategy.name()
                ));
                if write {
                    store.write(&output, &Frame::with_header(data, header))?;
                }
                debug!(frame = %file_name(input), "Aligned frame");
                report.produced.push(output);
            }
            Err(e) => {
                warn!(frame = %input.display(), error = %e, "Alignment failed");
                report.record_failure(input, e);
            }
        }
        on_frame(i + 2);
    }
    Ok(report)
}

fn align_frame(
    target: &Frame,
    reference: &Frame,
    reference_wcs: Option<&Wcs>,
    strategy: AlignStrategy<'_>,
) -> Result<Array2<f32>> {
    match strategy {
        AlignStrategy::Feature(registrator) => {
            if target.shape() != reference.shape() {
                return Err(SisrError::ShapeMismatch {
                    expected: reference.shape(),
                    actual: target.shape(),
                });
            }
            registrator.register(&target.data, &reference.data)
        }
        AlignStrategy::Reproject(reprojector) => {
            let reference_wcs = reference_wcs
                .ok_or_else(|| SisrError::Registration("reference has no WCS".into()))?;
            let target_wcs = Wcs::from_header(&target.header)?;
            let (data, footprint) =
                reprojector.reproject(&target.data, &target_wcs, reference_wcs, reference.shape())?;
            let covered = footprint.iter().filter(|&&f| f).count();
            if covered == 0 {
                return Err(SisrError::Registration("target does not overlap the reference".into()));
            }
            Ok(data)
        }
    }
}
