use std::path::{Path, PathBuf};

use crate::store::StageKind;

/// A frame that a stage could not process, with the reason.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Per-frame outcome of one stage over a group.
#[derive(Clone, Debug, PartialEq)]
pub struct StageReport {
    pub stage: StageKind,
    /// Outputs produced by this run (written, or computed when writing is off).
    pub produced: Vec<PathBuf>,
    /// Inputs whose output already existed.
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<FrameFailure>,
}

impl StageReport {
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            produced: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, path: &Path, reason: impl ToString) {
        self.failed.push(FrameFailure {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        });
    }

    /// Inputs this stage looked at.
    pub fn total(&self) -> usize {
        self.produced.len() + self.skipped.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
