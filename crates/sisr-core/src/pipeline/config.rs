use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::calibration::NormalizeMode;
use crate::combine::CombineOptions;
use crate::error::{Result, SisrError};
use crate::reduce::{BackgroundPolicy, ReductionConfig};
use crate::register::AlignMethod;
use crate::solve::SearchHint;

/// Everything a pipeline run needs, passed explicitly to every stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root holding `dark/`, `flat/` and one directory per object.
    pub input: PathBuf,
    #[serde(default)]
    pub combine: CombineConfig,
    #[serde(default)]
    pub flat: FlatConfig,
    #[serde(default)]
    pub reduction: ReductionConfig,
    #[serde(default)]
    pub solve: SolveConfig,
    #[serde(default)]
    pub align: AlignConfig,
    #[serde(default)]
    pub stages: StageToggles,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

impl PipelineConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            combine: CombineConfig::default(),
            flat: FlatConfig::default(),
            reduction: ReductionConfig::default(),
            solve: SolveConfig::default(),
            align: AlignConfig::default(),
            stages: StageToggles::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }

    /// Reject settings no stage could run with.
    pub fn validate(&self) -> Result<()> {
        for (name, options) in [
            ("dark", &self.combine.dark),
            ("flat", &self.combine.flat),
            ("stack", &self.combine.stack),
        ] {
            if let Some(clip) = &options.sigma_clip {
                if !positive(clip.sigma as f64) {
                    return Err(SisrError::Config(format!(
                        "combine.{name}: sigma must be positive"
                    )));
                }
            }
            if options.memory_limit_bytes == Some(0) {
                return Err(SisrError::Config(format!(
                    "combine.{name}: memory limit must be positive"
                )));
            }
        }

        match &self.reduction.background {
            BackgroundPolicy::Sigma(p) if !positive(p.sigma as f64) => {
                return Err(SisrError::Config("background sigma must be positive".into()));
            }
            BackgroundPolicy::Mask(p) if p.mesh_size == 0 || !positive(p.sigma as f64) => {
                return Err(SisrError::Config(
                    "mask background needs a positive mesh size and sigma".into(),
                ));
            }
            _ => {}
        }

        if let Some(hint) = &self.solve.search {
            if !positive(hint.radius) {
                return Err(SisrError::Config("search radius must be positive".into()));
            }
        }
        Ok(())
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Combine settings per product.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    pub dark: CombineOptions,
    pub flat: CombineOptions,
    pub stack: CombineOptions,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatConfig {
    pub normalize: NormalizeMode,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveConfig {
    pub executable: PathBuf,
    pub extra_args: Vec<String>,
    pub search: Option<SearchHint>,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("solve-field"),
            extra_args: Vec::new(),
            search: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    pub method: AlignMethod,
    /// Align the solved frames even when some frames of the group failed
    /// an earlier stage.
    pub allow_incomplete_group: bool,
}

/// Which stages run, and whether master products are persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageToggles {
    pub solve: bool,
    pub align: bool,
    pub stack: bool,
    pub diagnostics: bool,
    pub write_dark: bool,
    pub write_flat: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            solve: true,
            align: true,
            stack: true,
            diagnostics: false,
            write_dark: true,
            write_flat: true,
        }
    }
}

impl fmt::Display for StageToggles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut enabled = vec!["reduce"];
        if self.solve {
            enabled.push("solve");
        }
        if self.align {
            enabled.push("align");
        }
        if self.stack {
            enabled.push("stack");
        }
        if self.diagnostics {
            enabled.push("diagnostics");
        }
        write!(f, "{}", enabled.join(" -> "))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub executable: PathBuf,
    /// SExtractor configuration file passed as `-c`.
    pub config: Option<PathBuf>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("sex"),
            config: None,
        }
    }
}
