use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::diagnostics::diagnose_stack;
use crate::error::{Result, SisrError};
use crate::io::fits::read_header;
use crate::reduce::reduce_paths;
use crate::report::StageReport;
use crate::register::{align_group, AlignMethod, AlignStrategy};
use crate::solve::solve_paths;
use crate::stack::{stack_group, StackOutcome};
use crate::store::{file_name, StageCache, StageKey, StageKind};

use super::config::PipelineConfig;
use super::masters::CalibrationLibrary;
use super::orchestrator::Collaborators;
use super::types::{GroupReport, PipelineStage, ProgressReporter};

pub(super) const RAW_DIR: &str = "raw";
pub(super) const CAL_DIR: &str = "cal";
pub(super) const WCS_DIR: &str = "wcs";
pub(super) const ALIGN_DIR: &str = "align";

/// Directories of one object group.
#[derive(Clone, Debug)]
pub struct GroupLayout {
    pub root: PathBuf,
    pub raw: PathBuf,
    pub cal: PathBuf,
    pub wcs: PathBuf,
    pub align: PathBuf,
}

impl GroupLayout {
    /// Layout under `root`. Without solving, alignment reads from and
    /// writes next to the reduced frames.
    pub fn new(root: &Path, solve: bool) -> Self {
        let cal = root.join(CAL_DIR);
        let wcs = cal.join(WCS_DIR);
        let align = if solve { wcs.join(ALIGN_DIR) } else { cal.join(ALIGN_DIR) };
        Self {
            root: root.to_path_buf(),
            raw: root.join(RAW_DIR),
            cal,
            wcs,
            align,
        }
    }
}

/// Per-frame stage chain a raw frame goes through before alignment.
fn pre_align_chain(solve: bool) -> &'static [StageKind] {
    if solve {
        &[StageKind::Reduced, StageKind::Solved]
    } else {
        &[StageKind::Reduced]
    }
}

fn stage_dir(layout: &GroupLayout, stage: StageKind) -> &Path {
    match stage {
        StageKind::Solved => layout.wcs.as_path(),
        StageKind::Aligned => layout.align.as_path(),
        _ => layout.cal.as_path(),
    }
}

/// Raw frames whose product at the end of `chain` was neither produced by
/// this run nor found by the cache.
fn incomplete(
    raw: &[PathBuf],
    layout: &GroupLayout,
    chain: &[StageKind],
    cache: &dyn StageCache,
    produced: &[PathBuf],
) -> Vec<PathBuf> {
    let Some((&last, earlier)) = chain.split_last() else {
        return Vec::new();
    };
    raw.iter()
        .filter(|input| {
            let mut source = input.to_path_buf();
            for &stage in earlier {
                source = StageKey::per_frame(stage, stage_dir(layout, stage), &source)
                    .expected_output();
            }
            let key = StageKey::per_frame(last, stage_dir(layout, last), &source);
            !produced.contains(&key.expected_output()) && cache.lookup(&key).is_none()
        })
        .cloned()
        .collect()
}

pub(super) fn process_group(
    dir: &Path,
    config: &PipelineConfig,
    library: &CalibrationLibrary,
    collab: &Collaborators,
    reporter: &dyn ProgressReporter,
) -> GroupReport {
    let mut report = GroupReport::new(file_name(dir), dir.to_path_buf());
    if let Err(e) = run_group(dir, config, library, collab, reporter, &mut report) {
        warn!(group = %report.name, error = %e, "Object group failed");
        report.error = Some(e.to_string());
    }
    report
}

fn run_group(
    dir: &Path,
    config: &PipelineConfig,
    library: &CalibrationLibrary,
    collab: &Collaborators,
    reporter: &dyn ProgressReporter,
    report: &mut GroupReport,
) -> Result<()> {
    let store = &collab.store;
    let cache = collab.cache.as_ref();
    let layout = GroupLayout::new(dir, config.stages.solve);

    // Intake: loose frames move into raw/.
    let loose = store.list_inputs(dir)?;
    if !loose.is_empty() {
        reporter.begin_stage(PipelineStage::Intake, Some(loose.len()));
        for (i, frame) in loose.iter().enumerate() {
            store.move_into(frame, &layout.raw)?;
            reporter.advance(i + 1);
        }
        reporter.finish_stage();
        info!(group = %report.name, frames = loose.len(), "Moved frames into raw/");
        report.moved = loose.len();
    }

    let raw = store.list_inputs(&layout.raw)?;
    if raw.is_empty() {
        info!(group = %report.name, "No raw frames, nothing to do");
        return Ok(());
    }

    // Reduction. Masters are only needed while some frame is unreduced.
    let unreduced: Vec<&PathBuf> = raw
        .iter()
        .filter(|input| {
            let key = StageKey::per_frame(StageKind::Reduced, &layout.cal, input);
            cache.lookup(&key).is_none()
        })
        .collect();
    let reduced = match unreduced.first() {
        None => {
            info!(group = %report.name, "All frames already reduced");
            let mut reduced = StageReport::new(StageKind::Reduced);
            reduced.skipped = raw.clone();
            reduced
        }
        Some(first_path) => {
            let first = read_header(first_path)?;
            let exposure = first.exposure_time().ok_or_else(|| {
                SisrError::Config(format!("{} has no exposure time", first_path.display()))
            })?;
            let dark = library.dark_for(exposure)?;
            let flat = library.flat_for(first.filter())?;

            reporter.begin_stage(PipelineStage::Reduction, Some(raw.len()));
            let reduced = reduce_paths(
                store,
                cache,
                &raw,
                &layout.cal,
                dark,
                flat,
                &config.reduction,
                collab.remover.as_ref(),
                true,
                |done| reporter.advance(done),
            )?;
            reporter.finish_stage();
            reduced
        }
    };
    report.stages.push(reduced);

    // Plate solving
    let align_inputs = if config.stages.solve {
        let reduced = store.list_stage(&layout.cal, StageKind::Reduced)?;
        reporter.begin_stage(PipelineStage::PlateSolve, Some(reduced.len()));
        let solved = solve_paths(
            cache,
            &reduced,
            &layout.wcs,
            collab.solver.as_ref(),
            config.solve.search.as_ref(),
            |done| reporter.advance(done),
        )?;
        reporter.finish_stage();
        report.stages.push(solved);
        store.list_stage(&layout.wcs, StageKind::Solved)?
    } else {
        store.list_stage(&layout.cal, StageKind::Reduced)?
    };

    if !config.stages.align && !config.stages.stack {
        return Ok(());
    }

    let chain = pre_align_chain(config.stages.solve);
    let produced: Vec<PathBuf> = report
        .stages
        .iter()
        .filter(|stage| chain.last() == Some(&stage.stage))
        .flat_map(|stage| stage.produced.iter().cloned())
        .collect();
    let missing = incomplete(&raw, &layout, chain, cache, &produced);
    if !missing.is_empty() {
        let reason = format!(
            "{} of {} frames have not completed {}",
            missing.len(),
            raw.len(),
            if config.stages.solve { "plate solving" } else { "reduction" }
        );
        if !config.align.allow_incomplete_group {
            warn!(group = %report.name, reason = %reason, "Skipping alignment and stacking");
            report.blocked = Some(reason);
            return Ok(());
        }
        warn!(group = %report.name, reason = %reason, "Aligning an incomplete group");
    }

    // Alignment
    let stack_inputs = if config.stages.align {
        let strategy = match config.align.method {
            AlignMethod::Reproject if config.stages.solve => {
                AlignStrategy::Reproject(collab.reprojector.as_ref())
            }
            _ => AlignStrategy::Feature(collab.registrator.as_ref()),
        };
        reporter.begin_stage(PipelineStage::Alignment, Some(align_inputs.len()));
        let aligned = align_group(
            store,
            cache,
            &align_inputs,
            &layout.align,
            strategy,
            true,
            |done| reporter.advance(done),
        )?;
        reporter.finish_stage();
        let failed = aligned.failed.len();
        report.stages.push(aligned);

        if failed > 0 {
            let reason = format!("{failed} frames failed alignment");
            warn!(group = %report.name, reason = %reason, "Skipping stacking");
            report.blocked = Some(reason);
            return Ok(());
        }
        align_inputs
            .iter()
            .map(|input| store.output_path(&layout.align, StageKind::Aligned, input))
            .collect()
    } else {
        align_inputs
    };

    if !config.stages.stack {
        return Ok(());
    }

    // Stacking
    reporter.begin_stage(PipelineStage::Stacking, Some(1));
    let outcome = stack_group(
        store,
        cache,
        &stack_inputs,
        &layout.root,
        &config.combine.stack,
        true,
    )?;
    reporter.advance(1);
    reporter.finish_stage();
    report.stack = match outcome {
        StackOutcome::Written { path, .. } | StackOutcome::Skipped(path) => Some(path),
        StackOutcome::Computed { .. } | StackOutcome::Empty => None,
    };

    // Diagnostics
    if config.stages.diagnostics {
        if let Some(stack) = &report.stack {
            reporter.begin_stage(PipelineStage::Diagnostics, None);
            report.diagnostics = diagnose_stack(collab.extractor.as_ref(), stack);
            reporter.finish_stage();
            if let Some(diag) = &report.diagnostics {
                info!(
                    group = %report.name,
                    sources = diag.sources,
                    fwhm = ?diag.median_fwhm,
                    "Stack diagnostics"
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileExistenceCache, NoCache};

    #[test]
    fn test_layout_follows_solve_toggle() {
        let solved = GroupLayout::new(Path::new("/n/m42"), true);
        assert_eq!(solved.align, Path::new("/n/m42/cal/wcs/align"));
        let unsolved = GroupLayout::new(Path::new("/n/m42"), false);
        assert_eq!(unsolved.align, Path::new("/n/m42/cal/align"));
        assert_eq!(unsolved.raw, Path::new("/n/m42/raw"));
    }

    #[test]
    fn test_incomplete_tracks_the_whole_chain() {
        let dir = tempfile::tempdir().unwrap();
        let layout = GroupLayout::new(dir.path(), true);
        std::fs::create_dir_all(&layout.wcs).unwrap();
        let raw = vec![layout.raw.join("a.fit"), layout.raw.join("b.fit")];
        std::fs::write(layout.wcs.join("wcs-reduced-a.fit"), b"").unwrap();
        std::fs::write(layout.cal.join("reduced-b.fit"), b"").unwrap();

        let missing = incomplete(&raw, &layout, pre_align_chain(true), &FileExistenceCache, &[]);
        assert_eq!(missing, vec![layout.raw.join("b.fit")]);
        let unsolved = incomplete(&raw, &layout, pre_align_chain(false), &FileExistenceCache, &[]);
        assert_eq!(unsolved, vec![layout.raw.join("a.fit")]);
    }

    #[test]
    fn test_incomplete_follows_the_cache_policy() {
        let dir = tempfile::tempdir().unwrap();
        let layout = GroupLayout::new(dir.path(), false);
        std::fs::create_dir_all(&layout.cal).unwrap();
        let raw = vec![layout.raw.join("a.fit"), layout.raw.join("b.fit")];
        std::fs::write(layout.cal.join("reduced-a.fit"), b"").unwrap();
        std::fs::write(layout.cal.join("reduced-b.fit"), b"").unwrap();

        let chain = pre_align_chain(false);
        assert!(incomplete(&raw, &layout, chain, &FileExistenceCache, &[]).is_empty());
        assert_eq!(incomplete(&raw, &layout, chain, &NoCache, &[]).len(), 2);

        let produced = vec![layout.cal.join("reduced-a.fit")];
        let missing = incomplete(&raw, &layout, chain, &NoCache, &produced);
        assert_eq!(missing, vec![layout.raw.join("b.fit")]);
    }
}
