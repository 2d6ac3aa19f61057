pub mod fits;
pub mod fits_writer;
pub mod info;
pub mod preview;

pub use fits::{read_fits, FitsReader};
pub use fits_writer::{encode_fits, write_fits};
pub use info::FrameSummary;
pub use preview::save_preview;
