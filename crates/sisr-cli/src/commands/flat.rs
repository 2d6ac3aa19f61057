use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use sisr_core::calibration::{prepare_flatfield, NormalizeMode};
use sisr_core::store::{FileExistenceCache, FrameStore};

use super::combine::CombineFlags;

#[derive(Clone, Copy, ValueEnum)]
pub enum NormalizeArg {
    Mean,
    Median,
}

impl From<NormalizeArg> for NormalizeMode {
    fn from(arg: NormalizeArg) -> Self {
        match arg {
            NormalizeArg::Mean => NormalizeMode::Mean,
            NormalizeArg::Median => NormalizeMode::Median,
        }
    }
}

#[derive(Args)]
pub struct FlatArgs {
    /// Directory of raw flat frames; the flatfield is written here
    pub dir: PathBuf,

    /// Master dark to subtract (scaled to the flat exposure)
    #[arg(long)]
    pub dark: PathBuf,

    /// Statistic the flatfield is normalized to
    #[arg(long, value_enum, default_value = "mean")]
    pub normalize: NormalizeArg,

    #[command(flatten)]
    pub combine: CombineFlags,

    /// Compute without writing flatfield.fit
    #[arg(long)]
    pub no_write: bool,
}

pub fn run(args: &FlatArgs) -> Result<()> {
    let store = FrameStore::new();
    let dark = store
        .read(&args.dark)
        .with_context(|| format!("Failed to read master dark {}", args.dark.display()))?;

    let master = prepare_flatfield(
        &store,
        &FileExistenceCache,
        &args.dir,
        |_| Ok(&dark),
        &args.combine.options(),
        args.normalize.into(),
        !args.no_write,
    )
    .with_context(|| format!("Failed to build flatfield in {}", args.dir.display()))?;

    match (&master.path, master.reused) {
        (Some(path), true) => println!("Flatfield {} already exists, skipping", path.display()),
        (Some(path), false) => println!("Flatfield saved to {}", path.display()),
        (None, _) => println!(
            "Flatfield computed ({}x{}), not written",
            master.frame.width(),
            master.frame.height()
        ),
    }
    Ok(())
}
