//! Post-stack quality figures from an external source extractor.

pub mod catalog;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::error::{Result, SisrError};
use crate::stats;

pub use catalog::Catalog;

/// Detects sources in an image and returns their catalog.
pub trait SourceExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, image: &Path) -> Result<Catalog>;
}

/// Runs SExtractor (`sex`) with an ASCII_HEAD catalog in the temp directory.
///
/// With `config` set, `sex` gets it as `-c` and runs in its directory so the
/// parameter and filter files it names resolve next to it. Otherwise it runs
/// in the image's directory.
#[derive(Clone, Debug)]
pub struct SExtractor {
    pub executable: PathBuf,
    pub config: Option<PathBuf>,
}

impl Default for SExtractor {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("sex"),
            config: None,
        }
    }
}

impl SExtractor {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: Option<PathBuf>) -> Self {
        self.config = config;
        self
    }

    fn catalog_path(image: &Path) -> PathBuf {
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".into());
        std::env::temp_dir().join(format!("sisr-{}-{stem}.cat", std::process::id()))
    }
}

impl SourceExtractor for SExtractor {
    fn name(&self) -> &str {
        "sextractor"
    }

    fn extract(&self, image: &Path) -> Result<Catalog> {
        let image = fs::canonicalize(image)?;
        let catalog_path = Self::catalog_path(&image);
        let mut command = Command::new(&self.executable);
        command.arg(&image);
        let working_dir = match &self.config {
            Some(config) => {
                let config = fs::canonicalize(config)?;
                command.arg("-c").arg(&config);
                config.parent().map(Path::to_path_buf)
            }
            None => image.parent().map(Path::to_path_buf),
        };
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }
        let output = command
            .arg("-CATALOG_NAME")
            .arg(&catalog_path)
            .arg("-CATALOG_TYPE")
            .arg("ASCII_HEAD")
            .output()
            .map_err(|e| {
                SisrError::Subprocess(format!("failed to run {}: {e}", self.executable.display()))
            })?;

        if !output.status.success() {
            let _ = fs::remove_file(&catalog_path);
            return Err(SisrError::Subprocess(format!(
                "{} exited with {}: {}",
                self.executable.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = fs::read_to_string(&catalog_path);
        if let Err(e) = fs::remove_file(&catalog_path) {
            debug!(path = %catalog_path.display(), error = %e, "Could not remove catalog");
        }
        Catalog::parse(&text?)
    }
}

/// Source count and median seeing of a stacked image.
#[derive(Clone, Debug, PartialEq)]
pub struct StackDiagnostics {
    pub sources: usize,
    /// Median `FWHM_IMAGE` in pixels.
    pub median_fwhm: Option<f64>,
    /// Median `FLUX_RADIUS` in pixels.
    pub median_flux_radius: Option<f64>,
}

impl StackDiagnostics {
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let median_of = |name: &str| {
            catalog.column(name).and_then(|values| {
                let mut finite: Vec<f32> =
                    values.iter().filter(|v| v.is_finite()).map(|&v| v as f32).collect();
                stats::median(&mut finite)
            })
        };
        Self {
            sources: catalog.len(),
            median_fwhm: median_of("FWHM_IMAGE"),
            median_flux_radius: median_of("FLUX_RADIUS"),
        }
    }
}

impl fmt::Display for StackDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<f64>| v.map_or_else(|| "None".to_string(), |v| format!("{v:.2}"));
        write!(
            f,
            "sources={} fwhm={} flux_radius={}",
            self.sources,
            show(self.median_fwhm),
            show(self.median_flux_radius)
        )
    }
}

/// Extract sources from `image` and summarize them. Failures are logged
/// and yield `None`.
pub fn diagnose_stack(extractor: &dyn SourceExtractor, image: &Path) -> Option<StackDiagnostics> {
    match extractor.extract(image) {
        Ok(catalog) => Some(StackDiagnostics::from_catalog(&catalog)),
        Err(e) => {
            warn!(
                image = %image.display(),
                extractor = extractor.name(),
                error = %e,
                "Stack diagnostics failed"
            );
            None
        }
    }
}
