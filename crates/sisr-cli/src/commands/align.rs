use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use sisr_core::register::{align_group, AlignStrategy, PhaseCorrelationRegistrator, TanReprojector};
use sisr_core::store::{FileExistenceCache, FrameStore};

use crate::progress::frame_bar;
use crate::summary::print_stage_report;

#[derive(Clone, Copy, ValueEnum)]
pub enum AlignMethodArg {
    /// Phase correlation on pixel data
    Feature,
    /// Resample through each frame's WCS
    Reproject,
}

#[derive(Args)]
pub struct AlignArgs {
    /// Directory of frames to align; the first by name is the reference
    pub dir: PathBuf,

    #[arg(long, value_enum, default_value = "reproject")]
    pub method: AlignMethodArg,

    /// Output directory for a- frames
    #[arg(short, long, default_value = "align")]
    pub output: PathBuf,

    /// Compute without writing
    #[arg(long)]
    pub no_write: bool,
}

pub fn run(args: &AlignArgs) -> Result<()> {
    let store = FrameStore::new();
    let inputs = store.list_inputs(&args.dir)?;
    let strategy = match args.method {
        AlignMethodArg::Feature => AlignStrategy::Feature(&PhaseCorrelationRegistrator),
        AlignMethodArg::Reproject => AlignStrategy::Reproject(&TanReprojector),
    };

    let pb = frame_bar(inputs.len() as u64, "Aligning");
    let report = align_group(
        &store,
        &FileExistenceCache,
        &inputs,
        &args.output,
        strategy,
        !args.no_write,
        |done| pb.set_position(done as u64),
    )?;
    pb.finish_and_clear();

    print_stage_report(&report);
    Ok(())
}
