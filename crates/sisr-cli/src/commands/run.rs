use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use sisr_core::pipeline::{run_pipeline, Collaborators, PipelineConfig};
use sisr_core::register::AlignMethod;
use tracing::info;

use super::align::AlignMethodArg;
use super::combine::CombineFlags;
use super::reduce::BackgroundFlags;
use super::solve::SearchFlags;
use crate::progress::BarReporter;
use crate::summary::{print_pipeline_report, print_pipeline_summary};

#[derive(Args)]
pub struct RunArgs {
    /// Input root holding dark/, flat/ and object directories
    pub input: Option<PathBuf>,

    /// Pipeline config file (TOML); flags below are ignored when given
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub combine: CombineFlags,

    #[command(flatten)]
    pub background: BackgroundFlags,

    #[command(flatten)]
    pub search: SearchFlags,

    /// Alignment method
    #[arg(long, value_enum, default_value = "reproject")]
    pub align_method: AlignMethodArg,

    /// Align groups even when some frames failed an earlier stage
    #[arg(long)]
    pub allow_incomplete: bool,

    /// Skip plate solving (alignment uses phase correlation)
    #[arg(long)]
    pub no_solve: bool,

    /// Skip alignment
    #[arg(long)]
    pub no_align: bool,

    /// Skip stacking
    #[arg(long)]
    pub no_stack: bool,

    /// Run source extraction on each stack
    #[arg(long)]
    pub diagnostics: bool,

    /// SExtractor configuration file for --diagnostics
    #[arg(long)]
    pub sextractor_config: Option<PathBuf>,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let config = match (&args.config, &args.input) {
        (Some(path), _) => super::config::load(path)?,
        (None, Some(input)) => build_config_from_args(args, input.clone()),
        (None, None) => anyhow::bail!("Give an input directory or --config"),
    };

    info!(input = %config.input.display(), stages = %config.stages, "Loaded pipeline config");
    print_pipeline_summary(&config);

    let collaborators = Collaborators::from_config(&config);
    let reporter = BarReporter::new();
    let report = run_pipeline(&config, &collaborators, &reporter)
        .with_context(|| format!("Pipeline failed for {}", config.input.display()))?;

    print_pipeline_report(&report);
    Ok(())
}

fn build_config_from_args(args: &RunArgs, input: PathBuf) -> PipelineConfig {
    let mut config = PipelineConfig::new(input);
    let options = args.combine.options();
    config.combine.dark = options.clone();
    config.combine.flat = options.clone();
    config.combine.stack = options;
    config.reduction = args.background.reduction();

    config.solve.executable = args.search.solver.clone();
    config.solve.search = args.search.hint();

    config.align.method = match args.align_method {
        AlignMethodArg::Feature => AlignMethod::Feature,
        AlignMethodArg::Reproject => AlignMethod::Reproject,
    };
    config.align.allow_incomplete_group = args.allow_incomplete;

    config.stages.solve = !args.no_solve;
    config.stages.align = !args.no_align;
    config.stages.stack = !args.no_stack;
    config.stages.diagnostics = args.diagnostics;
    config.diagnostics.config = args.sextractor_config.clone();
    config
}
