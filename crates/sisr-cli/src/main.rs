mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sisr", about = "Static image series reduction for CCD frames")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over an input directory
    Run(commands::run::RunArgs),
    /// Print or save the default pipeline config
    Config(commands::config::ConfigArgs),
    /// Show FITS header summaries
    Info(commands::info::InfoArgs),
    /// Combine frames into one (e.g. a master dark)
    Combine(commands::combine::CombineArgs),
    /// Build a flatfield from a flat directory and a master dark
    Flat(commands::flat::FlatArgs),
    /// Dark-subtract, flatfield and clean raw frames
    Reduce(commands::reduce::ReduceArgs),
    /// Plate solve reduced frames
    Solve(commands::solve::SolveArgs),
    /// Align a group of frames onto its first frame
    Align(commands::align::AlignArgs),
    /// Stack aligned frames
    Stack(commands::stack::StackArgs),
    /// Subtract a later frame from a reference into subtract.fit
    Subtract(commands::subtract::SubtractArgs),
    /// Export a stretched PNG preview of a frame
    Preview(commands::preview::PreviewArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Combine(args) => commands::combine::run(args),
        Commands::Flat(args) => commands::flat::run(args),
        Commands::Reduce(args) => commands::reduce::run(args),
        Commands::Solve(args) => commands::solve::run(args),
        Commands::Align(args) => commands::align::run(args),
        Commands::Stack(args) => commands::stack::run(args),
        Commands::Subtract(args) => commands::subtract::run(args),
        Commands::Preview(args) => commands::preview::run(args),
    }
}
