use std::path::{Path, PathBuf};

use crate::store::stage::StageKind;

/// Identifies one stage product: the stage, the directory its outputs live
/// in, and the input it derives from (absent for group-level stages).
#[derive(Clone, Copy, Debug)]
pub struct StageKey<'a> {
    pub stage: StageKind,
    pub output_dir: &'a Path,
    pub input: Option<&'a Path>,
}

impl<'a> StageKey<'a> {
    pub fn per_frame(stage: StageKind, output_dir: &'a Path, input: &'a Path) -> Self {
        Self {
            stage,
            output_dir,
            input: Some(input),
        }
    }

    pub fn group(stage: StageKind, output_dir: &'a Path) -> Self {
        Self {
            stage,
            output_dir,
            input: None,
        }
    }

    /// Path the stage writes its product to.
    pub fn expected_output(&self) -> PathBuf {
        let input_name = self
            .input
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.output_dir.join(self.stage.output_name(&input_name))
    }
}

/// Decides whether a stage product already exists and may be reused.
pub trait StageCache: Send + Sync {
    fn lookup(&self, key: &StageKey<'_>) -> Option<PathBuf>;
}

/// Treats an existing output file as proof the stage completed.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileExistenceCache;

impl StageCache for FileExistenceCache {
    fn lookup(&self, key: &StageKey<'_>) -> Option<PathBuf> {
        let path = key.expected_output();
        path.is_file().then_some(path)
    }
}

/// Never reports a hit, forcing every stage to recompute.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCache;

impl StageCache for NoCache {
    fn lookup(&self, _key: &StageKey<'_>) -> Option<PathBuf> {
        None
    }
}
