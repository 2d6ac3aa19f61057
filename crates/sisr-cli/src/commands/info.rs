use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use sisr_core::io::FrameSummary;
use sisr_core::store::FrameStore;

use super::combine::collect_inputs;

#[derive(Args)]
pub struct InfoArgs {
    /// FITS files, or a directory of FITS files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let files = collect_inputs(&FrameStore::new(), &args.files)?;
    for file in &files {
        match FrameSummary::read(file) {
            Ok(summary) => println!("{summary}"),
            Err(e) => eprintln!("{}: {e}", file.display()),
        }
    }
    Ok(())
}
