use std::fmt;

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::consts::FLAT_MIN_PIXEL;
use crate::error::{Result, SisrError};
use crate::frame::Frame;
use crate::stats;

/// Global statistic a flatfield is divided by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizeMode {
    #[default]
    Mean,
    Median,
}

impl fmt::Display for NormalizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeMode::Mean => write!(f, "mean"),
            NormalizeMode::Median => write!(f, "median"),
        }
    }
}

/// Subtract the exposure-scaled master dark from a combined flat and
/// normalize the result to unit mean (or median).
pub fn build_flatfield(
    combined_flat: &Array2<f32>,
    flat_exposure: f64,
    master_dark: &Array2<f32>,
    dark_exposure: f64,
    mode: NormalizeMode,
) -> Result<Array2<f32>> {
    normalize_flat(combined_flat, flat_exposure, master_dark, dark_exposure, mode).map(|(f, _)| f)
}

fn normalize_flat(
    combined_flat: &Array2<f32>,
    flat_exposure: f64,
    master_dark: &Array2<f32>,
    dark_exposure: f64,
    mode: NormalizeMode,
) -> Result<(Array2<f32>, f64)> {
    for (label, exposure) in [("flat", flat_exposure), ("dark", dark_exposure)] {
        if !exposure.is_finite() || exposure <= 0.0 {
            return Err(SisrError::Config(format!(
                "{label} exposure must be positive, got {exposure}"
            )));
        }
    }
    if combined_flat.dim() != master_dark.dim() {
        return Err(SisrError::ShapeMismatch {
            expected: combined_flat.dim(),
            actual: master_dark.dim(),
        });
    }

    let scale = (flat_exposure / dark_exposure) as f32;
    let mut corrected = combined_flat.clone();
    Zip::from(&mut corrected)
        .and(master_dark)
        .for_each(|f, &d| *f -= d * scale);

    let mut values = stats::finite_values(&corrected);
    let normalizer = match mode {
        NormalizeMode::Mean => stats::mean(&values),
        NormalizeMode::Median => stats::median(&mut values),
    };
    let normalizer = match normalizer {
        Some(n) if n.is_finite() && n > 0.0 => n,
        other => {
            return Err(SisrError::Division(format!(
                "flat {mode} after dark subtraction is {}",
                other.map_or("undefined".to_string(), |v| v.to_string())
            )));
        }
    };

    let divisor = normalizer as f32;
    corrected.mapv_inplace(|v| v / divisor);
    validate_flatfield(&corrected)?;
    Ok((corrected, normalizer))
}

/// Reject flatfields with pixels that would blow up a division.
pub fn validate_flatfield(flat: &Array2<f32>) -> Result<()> {
    let bad = flat
        .iter()
        .filter(|v| !v.is_finite() || **v <= FLAT_MIN_PIXEL)
        .count();
    if bad > 0 {
        return Err(SisrError::Division(format!(
            "flatfield has {bad} non-finite or non-positive pixels"
        )));
    }
    Ok(())
}

/// Build a flatfield frame from a combined flat and a master dark, taking
/// both exposure times from their headers.
pub fn flatfield_from_frames(
    combined_flat: &Frame,
    master_dark: &Frame,
    mode: NormalizeMode,
) -> Result<Frame> {
    let flat_exposure = combined_flat
        .header
        .exposure_time()
        .ok_or_else(|| SisrError::Config("combined flat has no exposure time".into()))?;
    let dark_exposure = master_dark
        .header
        .exposure_time()
        .ok_or_else(|| SisrError::Config("master dark has no exposure time".into()))?;

    let (data, normalizer) = normalize_flat(
        &combined_flat.data,
        flat_exposure,
        &master_dark.data,
        dark_exposure,
        mode,
    )?;
    info!(
        flat_exposure,
        dark_exposure,
        normalizer,
        mode = %mode,
        "Built flatfield"
    );

    let mut header = combined_flat.header.clone();
    header.set("IMAGETYP", "Flatfield");
    header.set_with_comment("FLATNORM", normalizer, Some("flat normalization level"));
    header.set_with_comment("FLATMODE", mode.to_string(), Some("flat normalization statistic"));
    header.add_history(&format!(
        "dark subtracted with scale {:.6}",
        flat_exposure / dark_exposure
    ));
    Ok(Frame::with_header(data, header))
}
