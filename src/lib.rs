pub mod config;
pub mod error;
pub mod event;
pub mod ffi;
pub mod frequency;
pub mod pca;
pub mod slicer;

pub use error::{Error, Result};

/// Maximum allowed sensor dimension to prevent excessive memory allocation.
/// Also the full range of the 16-bit event coordinates.
pub const MAX_SENSOR_DIM: u32 = 32768;
