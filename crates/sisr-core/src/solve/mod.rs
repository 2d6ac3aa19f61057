pub mod astrometry_net;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SisrError};
use crate::report::StageReport;
use crate::store::{file_name, FrameStore, StageCache, StageKey, StageKind};

pub use astrometry_net::AstrometryNetSolver;

/// Where to look on the sky. RA and Dec are passed to the solver verbatim,
/// so both sexagesimal and decimal degrees work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHint {
    pub ra: String,
    pub dec: String,
    /// Search radius in degrees.
    pub radius: f64,
}

/// An external astrometric engine that writes its products next to `image`.
pub trait PlateSolver: Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, image: &Path, hint: Option<&SearchHint>) -> Result<()>;
}

/// Sibling files a solver run leaves behind.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverArtifacts {
    pub auxiliary: Vec<PathBuf>,
    /// The input image with the solution added to its header.
    pub solved: PathBuf,
}

const AUXILIARY_EXTENSIONS: [&str; 6] = ["axy", "corr", "match", "rdls", "solved", "wcs"];
const INDEX_SUFFIX: &str = "-indx.xyls";

impl SolverArtifacts {
    pub fn for_image(image: &Path) -> Self {
        let mut auxiliary: Vec<PathBuf> = AUXILIARY_EXTENSIONS
            .iter()
            .map(|ext| image.with_extension(ext))
            .collect();
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        auxiliary.push(image.with_file_name(format!("{stem}{INDEX_SUFFIX}")));
        Self {
            auxiliary,
            solved: image.with_extension("new"),
        }
    }

    /// Delete the auxiliary files. Missing files are fine; anything else is
    /// logged and otherwise ignored.
    pub fn clean_up(&self) {
        for path in &self.auxiliary {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Removed solver artifact"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not remove solver artifact")
                }
            }
        }
    }
}

/// Solve one image and move the solved copy to `output_dir/wcs-<name>`.
///
/// Whatever the solver reports, the presence of its solved image decides
/// the outcome.
pub fn solve_frame(
    solver: &dyn PlateSolver,
    input: &Path,
    output_dir: &Path,
    hint: Option<&SearchHint>,
) -> Result<PathBuf> {
    let artifacts = SolverArtifacts::for_image(input);
    let outcome = solver.solve(input, hint);
    artifacts.clean_up();

    if !artifacts.solved.is_file() {
        return Err(match outcome {
            Err(e) => e,
            Ok(()) => SisrError::SolveFailed(input.to_path_buf()),
        });
    }
    if let Err(e) = outcome {
        warn!(
            image = %input.display(),
            error = %e,
            "Solver reported an error but produced a solution"
        );
    }

    fs::create_dir_all(output_dir)?;
    let output = output_dir.join(StageKind::Solved.output_name(&file_name(input)));
    move_file(&artifacts.solved, &output)?;
    Ok(output)
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

/// Solve every input without a `wcs-` product in `output_dir`.
pub fn solve_paths(
    cache: &dyn StageCache,
    inputs: &[PathBuf],
    output_dir: &Path,
    solver: &dyn PlateSolver,
    hint: Option<&SearchHint>,
    mut on_frame: impl FnMut(usize),
) -> Result<StageReport> {
    let mut report = StageReport::new(StageKind::Solved);
    let pending: Vec<&PathBuf> = inputs
        .iter()
        .filter(|input| {
            match cache.lookup(&StageKey::per_frame(StageKind::Solved, output_dir, input)) {
                Some(existing) => {
                    debug!(output = %existing.display(), "Already solved, skipping");
                    report.skipped.push(input.to_path_buf());
                    false
                }
                None => true,
            }
        })
        .collect();

    if pending.is_empty() {
        info!(dir = %output_dir.display(), "Nothing to solve");
        return Ok(report);
    }
    FrameStore::new().ensure_dir(output_dir)?;
    info!(frames = pending.len(), solver = solver.name(), "Plate solving");

    for (i, input) in pending.into_iter().enumerate() {
        match solve_frame(solver, input, output_dir, hint) {
            Ok(output) => {
                info!(frame = %file_name(input), output = %output.display(), "Solved frame");
                report.produced.push(output);
            }
            Err(e) => {
                warn!(frame = %input.display(), error = %e, "Plate solve failed");
                report.record_failure(input, e);
            }
        }
        on_frame(i + 1);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        let artifacts = SolverArtifacts::for_image(Path::new("/data/cal/reduced-m42.fit"));
        let names: Vec<String> = artifacts.auxiliary.iter().map(|p| file_name(p)).collect();
        assert_eq!(
            names,
            vec![
                "reduced-m42.axy",
                "reduced-m42.corr",
                "reduced-m42.match",
                "reduced-m42.rdls",
                "reduced-m42.solved",
                "reduced-m42.wcs",
                "reduced-m42-indx.xyls",
            ]
        );
        assert_eq!(artifacts.solved, Path::new("/data/cal/reduced-m42.new"));
    }
}
