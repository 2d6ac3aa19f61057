#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Array2;

use sisr_core::diagnostics::{Catalog, SourceExtractor};
use sisr_core::error::Result;
use sisr_core::frame::{Frame, FrameHeader, HeaderValue};
use sisr_core::io::{read_fits, write_fits};
use sisr_core::pipeline::Collaborators;
use sisr_core::reduce::NoArtifactRemoval;
use sisr_core::register::{PhaseCorrelationRegistrator, TanReprojector};
use sisr_core::solve::{PlateSolver, SearchHint, SolverArtifacts};
use sisr_core::store::{FileExistenceCache, FrameStore};

// ---------------------------------------------------------------------------
// Frames on disk
// ---------------------------------------------------------------------------

pub fn header(cards: &[(&str, HeaderValue)]) -> FrameHeader {
    let mut header = FrameHeader::new();
    for (key, value) in cards {
        header.set(key, value.clone());
    }
    header
}

pub fn write_frame(
    dir: &Path,
    name: &str,
    data: Array2<f32>,
    cards: &[(&str, HeaderValue)],
) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    write_fits(&path, &Frame::with_header(data, header(cards))).unwrap();
    path
}

pub fn constant(h: usize, w: usize, value: f32) -> Array2<f32> {
    Array2::from_elem((h, w), value)
}

/// Flat background with one Gaussian star.
pub fn star_field(h: usize, w: usize, row: f32, col: f32) -> Array2<f32> {
    Array2::from_shape_fn((h, w), |(r, c)| {
        let d2 = (r as f32 - row).powi(2) + (c as f32 - col).powi(2);
        10.0 + 1000.0 * (-d2 / (2.0 * 2.0 * 2.0)).exp()
    })
}

pub fn exposure(seconds: f64) -> (&'static str, HeaderValue) {
    ("EXPTIME", HeaderValue::Real(seconds))
}

pub fn filter(name: &str) -> (&'static str, HeaderValue) {
    ("FILTER", HeaderValue::Text(name.to_string()))
}

/// TAN solution centred on the frame, 1 arcsec pixels.
pub fn wcs_cards(crpix1: f64, crpix2: f64) -> Vec<(&'static str, HeaderValue)> {
    vec![
        ("CTYPE1", HeaderValue::Text("RA---TAN".into())),
        ("CTYPE2", HeaderValue::Text("DEC--TAN".into())),
        ("CRPIX1", HeaderValue::Real(crpix1)),
        ("CRPIX2", HeaderValue::Real(crpix2)),
        ("CRVAL1", HeaderValue::Real(83.8)),
        ("CRVAL2", HeaderValue::Real(-5.4)),
        ("CD1_1", HeaderValue::Real(-1.0 / 3600.0)),
        ("CD1_2", HeaderValue::Real(0.0)),
        ("CD2_1", HeaderValue::Real(0.0)),
        ("CD2_2", HeaderValue::Real(1.0 / 3600.0)),
    ]
}

pub fn read(path: &Path) -> Frame {
    read_fits(path).unwrap()
}

/// Every file under `dir` with its bytes, keyed by relative path.
pub fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(dir, dir, &mut out);
    out
}

pub fn names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

// ---------------------------------------------------------------------------
// Stub collaborators
// ---------------------------------------------------------------------------

/// Behaves like solve-field: leaves every auxiliary sibling plus a `.new`
/// copy of the image carrying a WCS centred on the frame.
#[derive(Default)]
pub struct StubSolver {
    pub calls: AtomicUsize,
    /// File names the solver fails on (auxiliary files still appear).
    pub fail_on: Vec<String>,
}

impl StubSolver {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PlateSolver for StubSolver {
    fn name(&self) -> &str {
        "stub"
    }

    fn solve(&self, image: &Path, _hint: Option<&SearchHint>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let artifacts = SolverArtifacts::for_image(image);
        for aux in &artifacts.auxiliary {
            fs::write(aux, b"aux")?;
        }
        let name = image.file_name().unwrap().to_string_lossy().into_owned();
        if self.fail_on.contains(&name) {
            return Ok(());
        }

        let mut frame = read_fits(image)?;
        let (h, w) = frame.shape();
        for (key, value) in wcs_cards((w as f64 + 1.0) / 2.0, (h as f64 + 1.0) / 2.0) {
            frame.header.set(key, value);
        }
        write_fits(&artifacts.solved, &frame)
    }
}

/// Returns a fixed three-source catalog.
pub struct StubExtractor;

impl SourceExtractor for StubExtractor {
    fn name(&self) -> &str {
        "stub"
    }

    fn extract(&self, _image: &Path) -> Result<Catalog> {
        Catalog::parse("# 1 FWHM_IMAGE\n# 2 FLUX_RADIUS\n2.0 1.0\n3.0 1.5\n4.0 2.0\n")
    }
}

pub fn collaborators(solver: StubSolver) -> Collaborators {
    Collaborators {
        store: FrameStore::new(),
        cache: Box::new(FileExistenceCache),
        remover: Box::new(NoArtifactRemoval),
        solver: Box::new(solver),
        registrator: Box::new(PhaseCorrelationRegistrator),
        reprojector: Box::new(TanReprojector),
        extractor: Box::new(StubExtractor),
    }
}
