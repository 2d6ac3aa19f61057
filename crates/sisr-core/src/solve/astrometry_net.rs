//! Wrapper around astrometry.net's `solve-field`.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::error::{Result, SisrError};

use super::{PlateSolver, SearchHint};

/// Runs `solve-field --no-plots --overwrite` on an image. The solver leaves
/// its products next to the image; `solve_frame` collects them.
#[derive(Clone, Debug)]
pub struct AstrometryNetSolver {
    pub executable: PathBuf,
    pub extra_args: Vec<String>,
}

impl Default for AstrometryNetSolver {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("solve-field"),
            extra_args: Vec::new(),
        }
    }
}

impl AstrometryNetSolver {
    pub fn new(executable: impl Into<PathBuf>, extra_args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            extra_args,
        }
    }

    fn command(&self, image: &Path, hint: Option<&SearchHint>) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("--no-plots").arg("--overwrite");
        cmd.args(&self.extra_args);
        cmd.arg(image);
        if let Some(hint) = hint {
            cmd.arg("--ra")
                .arg(&hint.ra)
                .arg("--dec")
                .arg(&hint.dec)
                .arg("--radius")
                .arg(hint.radius.to_string());
        }
        cmd
    }
}

impl PlateSolver for AstrometryNetSolver {
    fn name(&self) -> &str {
        "astrometry.net"
    }

    fn solve(&self, image: &Path, hint: Option<&SearchHint>) -> Result<()> {
        let mut cmd = self.command(image, hint);
        debug!(command = ?cmd, "Running solve-field");
        let output = cmd.output().map_err(|e| {
            SisrError::Subprocess(format!("failed to run {}: {e}", self.executable.display()))
        })?;
        if !output.status.success() {
            warn!(
                image = %image.display(),
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "solve-field exited with an error"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_with_hint() {
        let extra = vec!["--downsample".into(), "2".into()];
        let solver = AstrometryNetSolver::new("/opt/an/solve-field", extra);
        let hint = SearchHint {
            ra: "05:35:17".into(),
            dec: "-05:23:28".into(),
            radius: 2.0,
        };
        let cmd = solver.command(Path::new("frame.fit"), Some(&hint));
        let args: Vec<String> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "--no-plots",
                "--overwrite",
                "--downsample",
                "2",
                "frame.fit",
                "--ra",
                "05:35:17",
                "--dec",
                "-05:23:28",
                "--radius",
                "2",
            ]
        );
        assert_eq!(cmd.get_program(), "/opt/an/solve-field");
    }
}
