pub mod artifacts;
pub mod background;
pub mod mask;
pub mod mesh;

use std::path::{Path, PathBuf};

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::consts::{DEFAULT_BACKGROUND_SIGMA, DEFAULT_CLIP_ITERATIONS};
use crate::error::{Result, SisrError};
use crate::frame::Frame;
use crate::report::StageReport;
use crate::stats::{self, BackgroundStats};
use crate::store::{file_name, FrameStore, StageCache, StageKey, StageKind};

pub use artifacts::{
    ArtifactConfig, ArtifactRemover, ArtifactResult, MedianArtifactRemover, NoArtifactRemoval,
};
pub use background::{
    subtract_background, BackgroundEstimate, BackgroundModel, BackgroundPolicy, BackgroundStatistic,
    MaskBackground, SigmaBackground,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    pub background: BackgroundPolicy,
    /// Remove artifacts before estimating the background (default) or after.
    pub clean_before_background: bool,
    pub artifacts: ArtifactConfig,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            background: BackgroundPolicy::default(),
            clean_before_background: true,
            artifacts: ArtifactConfig::default(),
        }
    }
}

/// A reduced frame with what each step did to it.
#[derive(Clone, Debug)]
pub struct ReducedFrame {
    pub frame: Frame,
    pub artifact_pixels: usize,
    pub background: Option<BackgroundEstimate>,
    /// Statistics of the calibrated frame before background removal.
    pub stats: Option<BackgroundStats>,
}

/// `(raw - dark) / flat`, checking shapes and flat pixels.
pub fn calibrate(raw: &Array2<f32>, dark: &Array2<f32>, flat: &Array2<f32>) -> Result<Array2<f32>> {
    for other in [dark, flat] {
        if other.dim() != raw.dim() {
            return Err(SisrError::ShapeMismatch {
                expected: raw.dim(),
                actual: other.dim(),
            });
        }
    }
    let bad = flat.iter().filter(|v| !v.is_finite() || **v <= 0.0).count();
    if bad > 0 {
        return Err(SisrError::Division(format!(
            "flatfield has {bad} non-positive or non-finite pixels"
        )));
    }

    let mut out = raw.clone();
    Zip::from(&mut out)
        .and(dark)
        .and(flat)
        .for_each(|v, &d, &f| *v = (*v - d) / f);
    Ok(out)
}

/// Reduce one raw frame: dark subtraction, flat division, then artifact
/// removal and background subtraction in the configured order.
///
/// The result carries the raw header plus provenance cards.
pub fn reduce_frame(
    raw: &Frame,
    dark: &Frame,
    flat: &Frame,
    config: &ReductionConfig,
    remover: &dyn ArtifactRemover,
) -> Result<ReducedFrame> {
    let calibrated = calibrate(&raw.data, &dark.data, &flat.data)?;
    let frame_stats = BackgroundStats::compute(
        &stats::finite_values(&calibrated),
        DEFAULT_BACKGROUND_SIGMA,
        DEFAULT_CLIP_ITERATIONS,
    );

    let (data, artifact_pixels, background) = if config.clean_before_background {
        let cleaned = remover.detect_artifacts(&calibrated)?;
        let artifact_pixels = cleaned.flagged();
        let (data, background) = subtract_background(&cleaned.clean, &config.background)?;
        (data, artifact_pixels, background)
    } else {
        let (subtracted, background) = subtract_background(&calibrated, &config.background)?;
        let cleaned = remover.detect_artifacts(&subtracted)?;
        let artifact_pixels = cleaned.flagged();
        (cleaned.clean, artifact_pixels, background)
    };

    let mut header = raw.header.clone();
    header.set_with_comment("BKGSUB", config.background.to_string(), Some("background method"));
    if let Some(estimate) = &background {
        header.set_with_comment("BKGLEVEL", estimate.level, Some("background level subtracted"));
    }
    header.set_with_comment("CRPIXELS", artifact_pixels, Some("pixels replaced as artifacts"));
    header.add_history(&format!("dark subtracted ({} x {})", dark.height(), dark.width()));
    header.add_history("flatfield divided");
    header.add_history(&format!("artifacts removed with {}", remover.name()));

    Ok(ReducedFrame {
        frame: Frame::with_header(data, header),
        artifact_pixels,
        background,
        stats: frame_stats,
    })
}

/// Reduce every input whose `reduced-` output is not already present in
/// `output_dir`. Failed frames are recorded and never written.
#[allow(clippy::too_many_arguments)]
pub fn reduce_paths(
    store: &FrameStore,
    cache: &dyn StageCache,
    inputs: &[PathBuf],
    output_dir: &Path,
    dark: &Frame,
    flat: &Frame,
    config: &ReductionConfig,
    remover: &dyn ArtifactRemover,
    write: bool,
    mut on_frame: impl FnMut(usize),
) -> Result<StageReport> {
    let mut report = StageReport::new(StageKind::Reduced);
    let pending: Vec<&PathBuf> = inputs
        .iter()
        .filter(|input| {
            let key = StageKey::per_frame(StageKind::Reduced, output_dir, input);
            match cache.lookup(&key) {
                Some(existing) => {
                    debug!(output = %existing.display(), "Already reduced, skipping");
                    report.skipped.push(input.to_path_buf());
                    false
                }
                None => true,
            }
        })
        .collect();

    if pending.is_empty() {
        info!(dir = %output_dir.display(), "Nothing to reduce");
        return Ok(report);
    }
    store.ensure_dir(output_dir)?;

    for (i, input) in pending.into_iter().enumerate() {
        let output = store.output_path(output_dir, StageKind::Reduced, input);
        let result = store
            .read(input)
            .and_then(|raw| reduce_frame(&raw, dark, flat, config, remover));
        match result {
            Ok(reduced) => {
                if let Some(s) = &reduced.stats {
                    debug!(
                        frame = %file_name(input),
                        mean = s.mean,
                        median = s.median,
                        biweight = s.biweight,
                        mad_std = s.mad_std,
                        clipped_median = s.clipped.median,
                        clipped_std = s.clipped.std,
                        "Frame statistics"
                    );
                }
                if write {
                    store.write(&output, &reduced.frame)?;
                }
                info!(
                    frame = %file_name(input),
                    artifacts = reduced.artifact_pixels,
                    background = reduced.background.as_ref().map(|b| b.level),
                    "Reduced frame"
                );
                report.produced.push(output);
            }
            Err(e) => {
                warn!(frame = %input.display(), error = %e, "Reduction failed");
                report.record_failure(input, e);
            }
        }
        on_frame(i + 1);
    }
    Ok(report)
}
