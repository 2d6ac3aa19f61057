pub mod config;
mod group;
mod masters;
mod orchestrator;
mod types;

pub use config::{
    AlignConfig, CombineConfig, DiagnosticsConfig, FlatConfig, PipelineConfig, SolveConfig,
    StageToggles,
};
pub use group::GroupLayout;
pub use orchestrator::{run_pipeline, Collaborators};
pub use types::{
    CalibrationReport, GroupReport, NoOpReporter, PipelineReport, PipelineStage, ProgressReporter,
};
