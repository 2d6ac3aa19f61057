/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f32 = 1e-10;

/// FITS logical record size in bytes.
pub const FITS_BLOCK_SIZE: usize = 2880;

/// FITS header card size in bytes.
pub const FITS_CARD_SIZE: usize = 80;

/// File extensions recognised as FITS frames (lowercase).
pub const FITS_EXTENSIONS: [&str; 3] = ["fit", "fits", "fts"];

/// Smallest pixel value a normalized flatfield may contain.
pub const FLAT_MIN_PIXEL: f32 = 1e-6;

/// Default sigma threshold for sigma-clipped background statistics.
pub const DEFAULT_BACKGROUND_SIGMA: f32 = 5.0;

/// Default number of clipping iterations for sigma-clipped statistics.
pub const DEFAULT_CLIP_ITERATIONS: usize = 5;

/// Default signal-to-noise threshold for source masking.
pub const DEFAULT_MASK_SNR: f32 = 2.0;

/// Minimum connected pixels for a source to enter the mask.
pub const DEFAULT_MASK_NPIXELS: usize = 5;

/// Side of the square structuring element used to grow the source mask.
pub const DEFAULT_MASK_DILATE_SIZE: usize = 31;

/// Sigma used for the statistics behind the source mask threshold.
pub const DEFAULT_MASK_SIGMA: f32 = 3.0;

/// Tile size (pixels) of the background mesh.
pub const DEFAULT_MESH_SIZE: usize = 64;

/// Median filter size (in tiles) applied to the background mesh.
pub const DEFAULT_MESH_FILTER_SIZE: usize = 3;

/// Fraction of a mesh tile that must be unmasked for the tile to be used.
pub const MESH_MIN_VALID_FRACTION: f32 = 0.1;

/// Default detection threshold (in noise sigmas) for cosmic-ray candidates.
pub const DEFAULT_ARTIFACT_SIGCLIP: f32 = 4.0;

/// Minimum ratio between a candidate's excess and its local source level.
pub const DEFAULT_ARTIFACT_CONTRAST: f32 = 2.0;

/// Scale factor turning a median absolute deviation into a Gaussian sigma.
pub const MAD_TO_SIGMA: f64 = 1.482_602_218_505_602;

/// Tuning constant of the biweight location estimator.
pub const BIWEIGHT_C: f64 = 6.0;
