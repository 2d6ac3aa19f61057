use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use sisr_core::reduce::{
    reduce_paths, ArtifactConfig, BackgroundPolicy, BackgroundStatistic, MaskBackground,
    ReductionConfig, SigmaBackground,
};
use sisr_core::store::{FileExistenceCache, FrameStore};

use crate::progress::frame_bar;
use crate::summary::print_stage_report;

#[derive(Clone, Copy, ValueEnum)]
pub enum BackgroundArg {
    Simple,
    Sigma,
    Mask,
    None,
}

/// Background options shared by `reduce` and `run`.
#[derive(Args, Clone)]
pub struct BackgroundFlags {
    /// Background estimate subtracted from each frame
    #[arg(long, value_enum, default_value = "sigma")]
    pub background: BackgroundArg,

    /// Clipping sigma for the sigma and mask backgrounds
    #[arg(long)]
    pub background_sigma: Option<f32>,

    /// Skip artifact (cosmic-ray) removal
    #[arg(long)]
    pub no_artifacts: bool,
}

impl BackgroundFlags {
    pub fn reduction(&self) -> ReductionConfig {
        let background = match self.background {
            BackgroundArg::Simple => BackgroundPolicy::Simple {
                statistic: BackgroundStatistic::Median,
            },
            BackgroundArg::Sigma => {
                let mut params = SigmaBackground::default();
                if let Some(sigma) = self.background_sigma {
                    params.sigma = sigma;
                }
                BackgroundPolicy::Sigma(params)
            }
            BackgroundArg::Mask => {
                let mut params = MaskBackground::default();
                if let Some(sigma) = self.background_sigma {
                    params.sigma = sigma;
                }
                BackgroundPolicy::Mask(params)
            }
            BackgroundArg::None => BackgroundPolicy::None,
        };
        ReductionConfig {
            background,
            artifacts: ArtifactConfig {
                enabled: !self.no_artifacts,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[derive(Args)]
pub struct ReduceArgs {
    /// Directory of raw frames
    pub raw: PathBuf,

    /// Master dark
    #[arg(long)]
    pub dark: PathBuf,

    /// Flatfield
    #[arg(long)]
    pub flat: PathBuf,

    #[command(flatten)]
    pub background: BackgroundFlags,

    /// Output directory for reduced- frames
    #[arg(short, long, default_value = "cal")]
    pub output: PathBuf,

    /// Compute without writing
    #[arg(long)]
    pub no_write: bool,
}

pub fn run(args: &ReduceArgs) -> Result<()> {
    let store = FrameStore::new();
    let dark = store
        .read(&args.dark)
        .with_context(|| format!("Failed to read master dark {}", args.dark.display()))?;
    let flat = store
        .read(&args.flat)
        .with_context(|| format!("Failed to read flatfield {}", args.flat.display()))?;
    let inputs = store.list_inputs(&args.raw)?;

    let config = args.background.reduction();
    let remover = config.artifacts.build();
    println!("Reducing {} frames (background: {})", inputs.len(), config.background);

    let pb = frame_bar(inputs.len() as u64, "Reducing");
    let report = reduce_paths(
        &store,
        &FileExistenceCache,
        &inputs,
        &args.output,
        &dark,
        &flat,
        &config,
        remover.as_ref(),
        !args.no_write,
        |done| pb.set_position(done as u64),
    )?;
    pb.finish_and_clear();

    print_stage_report(&report);
    Ok(())
}
