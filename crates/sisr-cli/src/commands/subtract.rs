use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use sisr_core::store::{FileExistenceCache, FrameStore};
use sisr_core::subtract::{subtract_frames, PlainDifference, SubtractOutcome};

#[derive(Args)]
pub struct SubtractArgs {
    /// Earlier frame the target is subtracted from
    pub reference: PathBuf,

    /// Later frame on the same pixel grid
    pub target: PathBuf,

    /// Directory to write subtract.fit into
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Compute without writing
    #[arg(long)]
    pub no_write: bool,
}

pub fn run(args: &SubtractArgs) -> Result<()> {
    let outcome = subtract_frames(
        &FrameStore::new(),
        &FileExistenceCache,
        &args.reference,
        &args.target,
        &args.output,
        &PlainDifference,
        !args.no_write,
    )?;

    match outcome {
        SubtractOutcome::Written(path) => println!("Wrote difference frame {}", path.display()),
        SubtractOutcome::Computed(_) => println!("Computed difference frame, not written"),
        SubtractOutcome::Skipped(path) => println!("{} already exists, skipping", path.display()),
    }
    Ok(())
}
