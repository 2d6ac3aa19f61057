use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use sisr_core::io::save_preview;
use sisr_core::store::FrameStore;

#[derive(Args)]
pub struct PreviewArgs {
    /// Input FITS file
    pub file: PathBuf,

    /// Lower stretch percentile (0-1)
    #[arg(long, default_value = "0.01")]
    pub low: f32,

    /// Upper stretch percentile (0-1)
    #[arg(long, default_value = "0.995")]
    pub high: f32,

    /// Output PNG (defaults to the input name with .png)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &PreviewArgs) -> Result<()> {
    let frame = FrameStore::new()
        .read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.file.with_extension("png"));
    save_preview(&frame, &output, args.low, args.high)?;
    println!("Preview saved to {}", output.display());
    Ok(())
}
