use std::path::PathBuf;

use crate::diagnostics::StackDiagnostics;
use crate::report::{FrameFailure, StageReport};

/// Pipeline processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    MasterDarks,
    Flatfields,
    Intake,
    Reduction,
    PlateSolve,
    Alignment,
    Stacking,
    Diagnostics,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MasterDarks => write!(f, "Master darks"),
            Self::Flatfields => write!(f, "Flatfields"),
            Self::Intake => write!(f, "Collecting frames"),
            Self::Reduction => write!(f, "Reducing"),
            Self::PlateSolve => write!(f, "Plate solving"),
            Self::Alignment => write!(f, "Aligning"),
            Self::Stacking => write!(f, "Stacking"),
            Self::Diagnostics => write!(f, "Diagnostics"),
        }
    }
}

/// Thread-safe progress reporting for the pipeline.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (e.g., frame count), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// `items_done` work items of the current stage have completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// Progress reporter that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// One master dark or flatfield directory.
#[derive(Clone, Debug)]
pub struct CalibrationReport {
    pub dir: PathBuf,
    /// Product on disk, when it was reused or written.
    pub product: Option<PathBuf>,
    pub reused: bool,
    pub error: Option<String>,
}

/// Everything that happened to one object directory.
#[derive(Clone, Debug)]
pub struct GroupReport {
    pub name: String,
    pub dir: PathBuf,
    /// Frames moved from the object directory into `raw/`.
    pub moved: usize,
    pub stages: Vec<StageReport>,
    pub stack: Option<PathBuf>,
    pub diagnostics: Option<StackDiagnostics>,
    /// Why a downstream stage did not run although it was enabled.
    pub blocked: Option<String>,
    /// Group-level failure that stopped processing.
    pub error: Option<String>,
}

impl GroupReport {
    pub fn new(name: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            name: name.into(),
            dir,
            moved: 0,
            stages: Vec::new(),
            stack: None,
            diagnostics: None,
            blocked: None,
            error: None,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &FrameFailure> {
        self.stages.iter().flat_map(|s| s.failed.iter())
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.blocked.is_none() && self.failures().next().is_none()
    }
}

/// Outcome of a whole pipeline run.
#[derive(Clone, Debug, Default)]
pub struct PipelineReport {
    pub darks: Vec<CalibrationReport>,
    pub flats: Vec<CalibrationReport>,
    pub groups: Vec<GroupReport>,
}

impl PipelineReport {
    pub fn is_complete(&self) -> bool {
        self.darks.iter().chain(&self.flats).all(|c| c.error.is_none())
            && self.groups.iter().all(GroupReport::is_complete)
    }

    /// Frames written across all groups and stages.
    pub fn produced(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| g.stages.iter())
            .map(|s| s.produced.len())
            .sum()
    }
}
