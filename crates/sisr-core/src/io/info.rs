use std::fmt;
use std::path::Path;

use crate::error::Result;
use crate::frame::FrameHeader;
use crate::io::fits::FitsReader;

/// Acquisition keywords worth reporting for a frame. Absent values print as "None".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameSummary {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub image_type: Option<String>,
    pub date_obs: Option<String>,
    pub exposure: Option<f64>,
    pub ccd_temperature: Option<f64>,
    pub binning: Option<(i64, i64)>,
    pub filter: Option<String>,
    pub instrument: Option<String>,
}

impl FrameSummary {
    pub fn from_header(name: &str, shape: (usize, usize), header: &FrameHeader) -> Self {
        Self {
            name: name.to_string(),
            height: shape.0,
            width: shape.1,
            image_type: header.image_type().map(str::to_string),
            date_obs: header.date_obs().map(str::to_string),
            exposure: header.exposure_time(),
            ccd_temperature: header.ccd_temperature(),
            binning: header.binning(),
            filter: header.filter().map(str::to_string),
            instrument: header.instrument().map(str::to_string),
        }
    }

    /// Summarize a file without decoding its pixels.
    pub fn read(path: &Path) -> Result<Self> {
        let reader = FitsReader::open(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::from_header(&name, reader.shape(), &reader.header))
    }
}

fn or_none<T: fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "None".to_string(),
    }
}

impl fmt::Display for FrameSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let binning = self.binning.map(|(x, y)| format!("{x}x{y}"));
        write!(
            f,
            "{}: {}x{} type={} date={} exptime={} ccd-temp={} binning={} filter={} instrument={}",
            self.name,
            self.width,
            self.height,
            or_none(&self.image_type),
            or_none(&self.date_obs),
            or_none(&self.exposure),
            or_none(&self.ccd_temperature),
            or_none(&binning),
            or_none(&self.filter),
            or_none(&self.instrument),
        )
    }
}
