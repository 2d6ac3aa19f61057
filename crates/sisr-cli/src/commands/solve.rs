use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use sisr_core::solve::{solve_paths, AstrometryNetSolver, SearchHint};
use sisr_core::store::{FileExistenceCache, FrameStore, StageKind};

use crate::progress::frame_bar;
use crate::summary::print_stage_report;

/// Sky position hint shared by `solve` and `run`.
#[derive(Args, Clone)]
pub struct SearchFlags {
    /// Approximate right ascension (sexagesimal or degrees)
    #[arg(long, requires = "dec")]
    pub ra: Option<String>,

    /// Approximate declination (sexagesimal or degrees)
    #[arg(long, requires = "ra")]
    pub dec: Option<String>,

    /// Search radius in degrees
    #[arg(long, default_value = "1")]
    pub radius: f64,

    /// solve-field executable
    #[arg(long, default_value = "solve-field")]
    pub solver: PathBuf,
}

impl SearchFlags {
    pub fn hint(&self) -> Option<SearchHint> {
        match (&self.ra, &self.dec) {
            (Some(ra), Some(dec)) => Some(SearchHint {
                ra: ra.clone(),
                dec: dec.clone(),
                radius: self.radius,
            }),
            _ => None,
        }
    }
}

#[derive(Args)]
pub struct SolveArgs {
    /// Directory of reduced- frames
    pub dir: PathBuf,

    #[command(flatten)]
    pub search: SearchFlags,

    /// Output directory for wcs- frames
    #[arg(short, long, default_value = "wcs")]
    pub output: PathBuf,
}

pub fn run(args: &SolveArgs) -> Result<()> {
    let inputs = FrameStore::new().list_stage(&args.dir, StageKind::Reduced)?;
    let solver = AstrometryNetSolver::new(args.search.solver.clone(), Vec::new());
    let hint = args.search.hint();

    let pb = frame_bar(inputs.len() as u64, "Plate solving");
    let report = solve_paths(
        &FileExistenceCache,
        &inputs,
        &args.output,
        &solver,
        hint.as_ref(),
        |done| pb.set_position(done as u64),
    )?;
    pb.finish_and_clear();

    print_stage_report(&report);
    Ok(())
}
