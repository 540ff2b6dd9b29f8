//! BMP recovery engine: cluster classification, candidate collection and file resolution.

pub mod bmp;
pub mod candidate;
pub mod classifier;
pub mod driver;
pub mod recovery_error;
pub mod resolver;
