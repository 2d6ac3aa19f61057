pub mod dark;
pub mod flat;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::combine::{combine_paths, CombineOptions};
use crate::error::{Result, SisrError};
use crate::frame::{Frame, FrameHeader};
use crate::io::fits::read_header;
use crate::store::{FrameStore, StageCache, StageKey, StageKind};

pub use dark::build_master_dark;
pub use flat::{build_flatfield, flatfield_from_frames, validate_flatfield, NormalizeMode};

/// A master calibration product together with where it came from.
#[derive(Clone, Debug)]
pub struct MasterFrame {
    pub frame: Frame,
    /// Location on disk, if the product was reused or written.
    pub path: Option<PathBuf>,
    /// True when an existing product was loaded instead of computed.
    pub reused: bool,
}

/// Master dark for a directory of raw darks: reuse `master-dark.fit` if the
/// cache has it, otherwise combine the directory's frames.
pub fn prepare_master_dark(
    store: &FrameStore,
    cache: &dyn StageCache,
    dir: &Path,
    options: &CombineOptions,
    write: bool,
) -> Result<MasterFrame> {
    let key = StageKey::group(StageKind::MasterDark, dir);
    if let Some(existing) = cache.lookup(&key) {
        debug!(path = %existing.display(), "Master dark exists, reusing");
        return load_existing(store, existing);
    }

    let inputs = store.list_inputs(dir)?;
    if inputs.is_empty() {
        return Err(SisrError::MissingCalibration(format!(
            "no dark frames in {}",
            dir.display()
        )));
    }
    let master = build_master_dark(&inputs, options)?;
    persist(store, key.expected_output(), master, write)
}

/// Flatfield for a directory of raw flats: reuse `flatfield.fit` if the
/// cache has it, otherwise combine, dark-subtract and normalize.
///
/// `select_dark` receives the first flat's header and returns the master
/// dark to subtract; it is only called when the flatfield must be built.
pub fn prepare_flatfield<'d>(
    store: &FrameStore,
    cache: &dyn StageCache,
    dir: &Path,
    select_dark: impl FnOnce(&FrameHeader) -> Result<&'d Frame>,
    options: &CombineOptions,
    mode: NormalizeMode,
    write: bool,
) -> Result<MasterFrame> {
    let key = StageKey::group(StageKind::Flatfield, dir);
    if let Some(existing) = cache.lookup(&key) {
        debug!(path = %existing.display(), "Flatfield exists, reusing");
        return load_existing(store, existing);
    }

    let inputs = store.list_inputs(dir)?;
    if inputs.is_empty() {
        return Err(SisrError::MissingCalibration(format!(
            "no flat frames in {}",
            dir.display()
        )));
    }
    let master_dark = select_dark(&read_header(&inputs[0])?)?;
    let combined = combine_paths(&inputs, options)?;
    let flatfield = flatfield_from_frames(&combined, master_dark, mode)?;
    persist(store, key.expected_output(), flatfield, write)
}

fn load_existing(store: &FrameStore, path: PathBuf) -> Result<MasterFrame> {
    Ok(MasterFrame {
        frame: store.read(&path)?,
        path: Some(path),
        reused: true,
    })
}

fn persist(store: &FrameStore, path: PathBuf, frame: Frame, write: bool) -> Result<MasterFrame> {
    if !write {
        info!(path = %path.display(), "Write disabled, keeping product in memory");
        return Ok(MasterFrame {
            frame,
            path: None,
            reused: false,
        });
    }
    store.write(&path, &frame)?;
    info!(output = %path.display(), "Wrote calibration product");
    Ok(MasterFrame {
        frame,
        path: Some(path),
        reused: false,
    })
}
