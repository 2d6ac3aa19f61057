use std::path::PathBuf;

use tracing::{info, warn};

use crate::combine::{combine_paths, CombineOptions};
use crate::error::Result;
use crate::frame::Frame;
use crate::io::fits::read_header;

/// Combine raw darks into a master dark. The master keeps the first dark's
/// header, including its exposure time.
pub fn build_master_dark(paths: &[PathBuf], options: &CombineOptions) -> Result<Frame> {
    let mut master = combine_paths(paths, options)?;

    let exposure = master.header.exposure_time();
    for path in &paths[1..] {
        let other = read_header(path)?.exposure_time();
        if other != exposure {
            warn!(
                path = %path.display(),
                expected = ?exposure,
                found = ?other,
                "Dark exposure differs from the group"
            );
        }
    }

    master.header.set("IMAGETYP", "Master Dark");
    master
        .header
        .add_history(&format!("master dark from {} frames", paths.len()));
    info!(frames = paths.len(), exposure = ?exposure, "Built master dark");
    Ok(master)
}
