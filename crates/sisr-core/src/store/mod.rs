pub mod cache;
pub mod stage;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::consts::FITS_EXTENSIONS;
use crate::error::Result;
use crate::frame::Frame;
use crate::io::{read_fits, write_fits};

pub use cache::{FileExistenceCache, NoCache, StageCache, StageKey};
pub use stage::{
    is_group_product, StageKind, DIFFERENCE_NAME, FLATFIELD_NAME, MASTER_DARK_NAME, STACK_NAME,
};

/// Directory-backed access to FITS frames. Listings are sorted by file name
/// so every stage sees its group in the same order.
#[derive(Clone, Debug)]
pub struct FrameStore {
    extensions: Vec<String>,
}

impl Default for FrameStore {
    fn default() -> Self {
        Self {
            extensions: FITS_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_frame_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    /// All frame files directly inside `dir`, sorted by name. A missing
    /// directory lists as empty.
    pub fn list_frames(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut frames = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && self.is_frame_file(&path) && !is_hidden(&path) {
                frames.push(path);
            }
        }
        frames.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));
        Ok(frames)
    }

    /// Frame files in `dir` that are not group-level stage products.
    pub fn list_inputs(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .list_frames(dir)?
            .into_iter()
            .filter(|p| !is_group_product(&file_name(p)))
            .collect())
    }

    /// Per-frame products of `stage` in `dir`.
    pub fn list_stage(&self, dir: &Path, stage: StageKind) -> Result<Vec<PathBuf>> {
        let prefix = stage.prefix().unwrap_or("");
        Ok(self
            .list_inputs(dir)?
            .into_iter()
            .filter(|p| file_name(p).starts_with(prefix))
            .collect())
    }

    /// Immediate subdirectories of `dir`, sorted by name.
    pub fn list_subdirs(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() && !is_hidden(&path) {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    pub fn read(&self, path: &Path) -> Result<Frame> {
        debug!(path = %path.display(), "Reading frame");
        read_fits(path)
    }

    /// Write a frame so that `path` only ever appears complete: the bytes go
    /// to a hidden sibling first and are renamed into place.
    pub fn write(&self, path: &Path, frame: &Frame) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let partial = path.with_file_name(format!(".{}.partial", file_name(path)));
        write_fits(&partial, frame)?;
        fs::rename(&partial, path)?;
        debug!(path = %path.display(), "Wrote frame");
        Ok(())
    }

    pub fn output_path(&self, output_dir: &Path, stage: StageKind, input: &Path) -> PathBuf {
        StageKey::per_frame(stage, output_dir, input).expected_output()
    }

    pub fn ensure_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        Ok(())
    }

    /// Move a file into `dir`, keeping its name.
    pub fn move_into(&self, file: &Path, dir: &Path) -> Result<PathBuf> {
        self.ensure_dir(dir)?;
        let target = dir.join(file_name(file));
        fs::rename(file, &target)?;
        Ok(target)
    }
}

/// File name of a path as an owned string (empty when absent).
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_hidden(path: &Path) -> bool {
    file_name(path).starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.fit", "a.fits", "c.txt", "stack.fit", ".hidden.fit"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("sub.fit")).unwrap();

        let store = FrameStore::new();
        let frames: Vec<String> = store
            .list_frames(dir.path())
            .unwrap()
            .iter()
            .map(|p| file_name(p))
            .collect();
        assert_eq!(frames, vec!["a.fits", "b.fit", "stack.fit"]);

        let inputs = store.list_inputs(dir.path()).unwrap();
        assert_eq!(inputs.len(), 2);
    }

    #[test]
    fn test_missing_directory_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::new();
        assert!(store.list_frames(&dir.path().join("nope")).unwrap().is_empty());
    }
}
