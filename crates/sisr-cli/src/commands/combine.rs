use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use sisr_core::combine::{combine_paths, CombineMethod, CombineOptions, SigmaClipParams};
use sisr_core::store::FrameStore;

#[derive(Clone, Copy, ValueEnum)]
pub enum CombineMethodArg {
    Median,
    Mean,
    Sum,
}

impl From<CombineMethodArg> for CombineMethod {
    fn from(arg: CombineMethodArg) -> Self {
        match arg {
            CombineMethodArg::Median => CombineMethod::Median,
            CombineMethodArg::Mean => CombineMethod::Mean,
            CombineMethodArg::Sum => CombineMethod::Sum,
        }
    }
}

/// Combine options shared by every command that combines frames.
#[derive(Args, Clone)]
pub struct CombineFlags {
    /// Per-pixel combination
    #[arg(long, value_enum, default_value = "median")]
    pub method: CombineMethodArg,

    /// Sigma-clip samples farther than this many standard deviations
    #[arg(long)]
    pub sigma_clip: Option<f32>,

    /// Upper bound on pixel data held in memory, in megabytes
    #[arg(long)]
    pub memory_limit: Option<usize>,
}

impl CombineFlags {
    pub fn options(&self) -> CombineOptions {
        CombineOptions {
            method: self.method.into(),
            sigma_clip: self.sigma_clip.map(|sigma| SigmaClipParams {
                sigma,
                ..Default::default()
            }),
            memory_limit_bytes: self.memory_limit.map(|mb| mb * 1024 * 1024),
        }
    }
}

#[derive(Args)]
pub struct CombineArgs {
    /// FITS files, or a single directory of FITS files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    #[command(flatten)]
    pub combine: CombineFlags,

    /// Output FITS file
    #[arg(short, long, default_value = "master-dark.fit")]
    pub output: PathBuf,

    /// Recompute even if the output exists
    #[arg(long)]
    pub force: bool,
}

/// Expand a single directory argument into its frames.
pub fn collect_inputs(store: &FrameStore, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    match inputs {
        [dir] if dir.is_dir() => store
            .list_inputs(dir)
            .with_context(|| format!("Failed to list {}", dir.display())),
        files => Ok(files.to_vec()),
    }
}

pub fn run(args: &CombineArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        println!("{} already exists, skipping", args.output.display());
        return Ok(());
    }
    let store = FrameStore::new();
    let inputs = collect_inputs(&store, &args.inputs)?;
    if inputs.is_empty() {
        bail!("No input frames");
    }

    let options = args.combine.options();
    println!("Combining {} frames ({})", inputs.len(), options.method);
    let frame = combine_paths(&inputs, &options).context("Combine failed")?;
    write_output(&store, &args.output, &frame)?;
    println!("Saved to {}", args.output.display());
    Ok(())
}

pub fn write_output(
    store: &FrameStore,
    path: &Path,
    frame: &sisr_core::frame::Frame,
) -> Result<()> {
    store
        .write(path, frame)
        .with_context(|| format!("Failed to write {}", path.display()))
}
