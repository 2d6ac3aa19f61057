use tracing::info;

use crate::diagnostics::{SExtractor, SourceExtractor};
use crate::error::{Result, SisrError};
use crate::reduce::ArtifactRemover;
use crate::register::{PhaseCorrelationRegistrator, Registrator, Reprojector, TanReprojector};
use crate::solve::{AstrometryNetSolver, PlateSolver};
use crate::store::{file_name, FileExistenceCache, FrameStore, StageCache};

use super::config::PipelineConfig;
use super::group::process_group;
use super::masters::{CalibrationLibrary, DARK_DIR, FLAT_DIR};
use super::types::{PipelineReport, ProgressReporter};

/// The external engines and policies a run delegates to.
pub struct Collaborators {
    pub store: FrameStore,
    pub cache: Box<dyn StageCache>,
    pub remover: Box<dyn ArtifactRemover>,
    pub solver: Box<dyn PlateSolver>,
    pub registrator: Box<dyn Registrator>,
    pub reprojector: Box<dyn Reprojector>,
    pub extractor: Box<dyn SourceExtractor>,
}

impl Collaborators {
    /// Built-in implementations configured from `config`.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            store: FrameStore::new(),
            cache: Box::new(FileExistenceCache),
            remover: config.reduction.artifacts.build(),
            solver: Box::new(AstrometryNetSolver::new(
                config.solve.executable.clone(),
                config.solve.extra_args.clone(),
            )),
            registrator: Box::new(PhaseCorrelationRegistrator),
            reprojector: Box::new(TanReprojector),
            extractor: Box::new(
                SExtractor::new(config.diagnostics.executable.clone())
                    .with_config(config.diagnostics.config.clone()),
            ),
        }
    }
}

/// Run every stage over the input root: master darks, flatfields, then each
/// object directory in name order.
///
/// Per-frame failures are recorded in the group's report; a failing group
/// does not stop the others. Only an unusable configuration or input root
/// is an error.
pub fn run_pipeline(
    config: &PipelineConfig,
    collab: &Collaborators,
    reporter: &dyn ProgressReporter,
) -> Result<PipelineReport> {
    config.validate()?;
    if !config.input.is_dir() {
        return Err(SisrError::Config(format!(
            "input directory {} does not exist",
            config.input.display()
        )));
    }
    info!(input = %config.input.display(), stages = %config.stages, "Starting pipeline");

    let mut library = CalibrationLibrary::default();
    let mut report = PipelineReport {
        darks: library.load_darks(&collab.store, collab.cache.as_ref(), config, reporter)?,
        ..Default::default()
    };
    report.flats = library.load_flats(&collab.store, collab.cache.as_ref(), config, reporter)?;

    let groups: Vec<_> = collab
        .store
        .list_subdirs(&config.input)?
        .into_iter()
        .filter(|dir| {
            let name = file_name(dir);
            name != DARK_DIR && name != FLAT_DIR
        })
        .collect();
    info!(groups = groups.len(), "Processing object groups");

    for dir in &groups {
        info!(group = %file_name(dir), "Processing group");
        report
            .groups
            .push(process_group(dir, config, &library, collab, reporter));
    }

    info!(
        produced = report.produced(),
        complete = report.is_complete(),
        "Pipeline finished"
    );
    Ok(report)
}
