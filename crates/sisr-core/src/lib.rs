pub mod calibration;
pub mod combine;
pub mod consts;
pub mod diagnostics;
pub mod error;
pub mod frame;
pub mod io;
pub mod pipeline;
pub mod reduce;
pub mod report;
pub mod register;
pub mod solve;
pub mod stack;
pub mod stats;
pub mod store;
pub mod subtract;
