use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use sisr_core::stack::{stack_group, StackOutcome};
use sisr_core::store::{FileExistenceCache, FrameStore, StageKind};

use super::combine::CombineFlags;

#[derive(Args)]
pub struct StackArgs {
    /// Directory of aligned a- frames
    pub dir: PathBuf,

    #[command(flatten)]
    pub combine: CombineFlags,

    /// Directory to write stack.fit into
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Compute without writing
    #[arg(long)]
    pub no_write: bool,
}

pub fn run(args: &StackArgs) -> Result<()> {
    let store = FrameStore::new();
    let aligned = store.list_stage(&args.dir, StageKind::Aligned)?;
    let outcome = stack_group(
        &store,
        &FileExistenceCache,
        &aligned,
        &args.output,
        &args.combine.options(),
        !args.no_write,
    )?;

    match outcome {
        StackOutcome::Written { path, frames } => {
            println!("Stacked {frames} frames into {}", path.display())
        }
        StackOutcome::Computed { frames, .. } => println!("Stacked {frames} frames, not written"),
        StackOutcome::Skipped(path) => println!("{} already exists, skipping", path.display()),
        StackOutcome::Empty => println!("No aligned frames in {}", args.dir.display()),
    }
    Ok(())
}
