use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SisrError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Empty frame group")]
    EmptyGroup,

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Division error: {0}")]
    Division(String),

    #[error("Plate solve produced no solved image for {}", .0.display())]
    SolveFailed(PathBuf),

    #[error("Missing calibration product: {0}")]
    MissingCalibration(String),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("External process error: {0}")]
    Subprocess(String),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, SisrError>;
