pub mod align;
pub mod combine;
pub mod config;
pub mod flat;
pub mod info;
pub mod preview;
pub mod reduce;
pub mod run;
pub mod solve;
pub mod stack;
pub mod subtract;
