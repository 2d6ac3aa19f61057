use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::calibration::{prepare_flatfield, prepare_master_dark, MasterFrame};
use crate::error::{Result, SisrError};
use crate::frame::Frame;
use crate::store::{file_name, FrameStore, StageCache};

use super::config::PipelineConfig;
use super::types::{CalibrationReport, PipelineStage, ProgressReporter};

pub(super) const DARK_DIR: &str = "dark";
pub(super) const FLAT_DIR: &str = "flat";

struct FlatEntry {
    filter: Option<String>,
    master: MasterFrame,
}

/// Master darks keyed by whole-second exposure, and flatfields with the
/// filter they were taken through.
#[derive(Default)]
pub(super) struct CalibrationLibrary {
    darks: BTreeMap<i64, MasterFrame>,
    flats: Vec<FlatEntry>,
}

/// Whole seconds, as used for dark directory names.
pub(super) fn exposure_key(exposure: f64) -> i64 {
    exposure.trunc() as i64
}

impl CalibrationLibrary {
    /// Build or load every master dark under `<root>/dark/<exptime>/`.
    pub fn load_darks(
        &mut self,
        store: &FrameStore,
        cache: &dyn StageCache,
        config: &PipelineConfig,
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<CalibrationReport>> {
        let root = config.input.join(DARK_DIR);
        if !root.is_dir() {
            info!(dir = %root.display(), "No dark directory");
            return Ok(Vec::new());
        }
        let dirs = store.list_subdirs(&root)?;
        reporter.begin_stage(PipelineStage::MasterDarks, Some(dirs.len()));

        let mut reports = Vec::new();
        for (i, dir) in dirs.iter().enumerate() {
            let report = match dark_dir_exposure(dir) {
                Some(exposure) => {
                    let result = prepare_master_dark(
                        store,
                        cache,
                        dir,
                        &config.combine.dark,
                        config.stages.write_dark,
                    );
                    let report = calibration_report(dir, &result);
                    if let Ok(master) = result {
                        self.darks.insert(exposure, master);
                    }
                    report
                }
                None => {
                    warn!(
                        dir = %dir.display(),
                        "Dark directory name is not an exposure time, skipping"
                    );
                    CalibrationReport {
                        dir: dir.clone(),
                        product: None,
                        reused: false,
                        error: Some("directory name is not an exposure time".into()),
                    }
                }
            };
            reports.push(report);
            reporter.advance(i + 1);
        }
        reporter.finish_stage();
        Ok(reports)
    }

    /// Build or load every flatfield under `<root>/flat/<name>/`, each with
    /// the master dark closest to its exposure.
    pub fn load_flats(
        &mut self,
        store: &FrameStore,
        cache: &dyn StageCache,
        config: &PipelineConfig,
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<CalibrationReport>> {
        let root = config.input.join(FLAT_DIR);
        if !root.is_dir() {
            info!(dir = %root.display(), "No flat directory");
            return Ok(Vec::new());
        }
        let dirs = store.list_subdirs(&root)?;
        reporter.begin_stage(PipelineStage::Flatfields, Some(dirs.len()));

        let mut reports = Vec::new();
        for (i, dir) in dirs.iter().enumerate() {
            let result = prepare_flatfield(
                store,
                cache,
                dir,
                |header| {
                    let exposure = header.exposure_time().ok_or_else(|| {
                        SisrError::Config(format!(
                            "flats in {} have no exposure time",
                            dir.display()
                        ))
                    })?;
                    self.nearest_dark(exposure)
                },
                &config.combine.flat,
                config.flat.normalize,
                config.stages.write_flat,
            );
            reports.push(calibration_report(dir, &result));
            if let Ok(master) = result {
                let filter = master.frame.header.filter().map(str::to_string);
                info!(dir = %file_name(dir), filter = ?filter, "Flatfield ready");
                self.flats.push(FlatEntry { filter, master });
            }
            reporter.advance(i + 1);
        }
        reporter.finish_stage();
        Ok(reports)
    }

    /// Master dark taken at exactly this whole-second exposure.
    pub fn dark_for(&self, exposure: f64) -> Result<&Frame> {
        let key = exposure_key(exposure);
        self.darks
            .get(&key)
            .map(|m| &m.frame)
            .ok_or_else(|| {
                SisrError::MissingCalibration(format!("no master dark for {key} s exposures"))
            })
    }

    /// Master dark with the closest exposure; ties go to the shorter one.
    pub fn nearest_dark(&self, exposure: f64) -> Result<&Frame> {
        let key = exposure_key(exposure);
        let (found, master) = self
            .darks
            .iter()
            .min_by_key(|(k, _)| ((**k - key).abs(), **k))
            .ok_or_else(|| SisrError::MissingCalibration("no master darks available".into()))?;
        if *found != key {
            info!(
                wanted = key,
                using = *found,
                "No dark at the flat exposure, scaling the nearest"
            );
        }
        Ok(&master.frame)
    }

    /// Flatfield taken through `filter`. A lone flatfield serves every group.
    pub fn flat_for(&self, filter: Option<&str>) -> Result<&Frame> {
        if let [only] = self.flats.as_slice() {
            return Ok(&only.master.frame);
        }
        let wanted = filter.ok_or_else(|| {
            SisrError::MissingCalibration(
                "frames have no FILTER and several flatfields exist".into(),
            )
        })?;
        let mut matching = self
            .flats
            .iter()
            .filter(|f| f.filter.as_deref().is_some_and(|f| f.eq_ignore_ascii_case(wanted)));
        match (matching.next(), matching.next()) {
            (Some(entry), None) => Ok(&entry.master.frame),
            (Some(_), Some(_)) => Err(SisrError::MissingCalibration(format!(
                "several flatfields match filter '{wanted}'"
            ))),
            (None, _) => Err(SisrError::MissingCalibration(format!(
                "no flatfield for filter '{wanted}'"
            ))),
        }
    }
}

fn dark_dir_exposure(dir: &Path) -> Option<i64> {
    let name = file_name(dir);
    name.trim()
        .parse::<f64>()
        .ok()
        .filter(|e| e.is_finite() && *e >= 0.0)
        .map(exposure_key)
}

fn calibration_report(dir: &Path, result: &Result<MasterFrame>) -> CalibrationReport {
    match result {
        Ok(master) => CalibrationReport {
            dir: dir.to_path_buf(),
            product: master.path.clone(),
            reused: master.reused,
            error: None,
        },
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Calibration product failed");
            CalibrationReport {
                dir: dir.to_path_buf(),
                product: None,
                reused: false,
                error: Some(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn master(value: f32, filter: Option<&str>) -> MasterFrame {
        let mut frame = Frame::new(Array2::from_elem((2, 2), value));
        if let Some(filter) = filter {
            frame.header.set("FILTER", filter);
        }
        MasterFrame {
            frame,
            path: None,
            reused: false,
        }
    }

    #[test]
    fn test_dark_lookup_exact_and_nearest() {
        let mut library = CalibrationLibrary::default();
        library.darks.insert(30, master(1.0, None));
        library.darks.insert(120, master(2.0, None));

        assert_eq!(library.dark_for(30.7).unwrap().data[[0, 0]], 1.0);
        assert!(matches!(library.dark_for(60.0), Err(SisrError::MissingCalibration(_))));
        assert_eq!(library.nearest_dark(100.0).unwrap().data[[0, 0]], 2.0);
        assert_eq!(library.nearest_dark(75.0).unwrap().data[[0, 0]], 1.0);
    }

    #[test]
    fn test_flat_matched_by_filter() {
        let mut library = CalibrationLibrary::default();
        library.flats.push(FlatEntry {
            filter: Some("R".into()),
            master: master(1.0, Some("R")),
        });
        library.flats.push(FlatEntry {
            filter: Some("V".into()),
            master: master(2.0, Some("V")),
        });

        assert_eq!(library.flat_for(Some("v")).unwrap().data[[0, 0]], 2.0);
        assert!(library.flat_for(Some("B")).is_err());
        assert!(library.flat_for(None).is_err());
    }

    #[test]
    fn test_single_flat_serves_any_filter() {
        let mut library = CalibrationLibrary::default();
        library.flats.push(FlatEntry {
            filter: Some("R".into()),
            master: master(1.0, Some("R")),
        });
        assert!(library.flat_for(Some("Ha")).is_ok());
        assert!(library.flat_for(None).is_ok());
    }

    #[test]
    fn test_dark_directory_names() {
        assert_eq!(dark_dir_exposure(Path::new("/d/dark/30")), Some(30));
        assert_eq!(dark_dir_exposure(Path::new("/d/dark/2.5")), Some(2));
        assert_eq!(dark_dir_exposure(Path::new("/d/dark/bias")), None);
    }
}
