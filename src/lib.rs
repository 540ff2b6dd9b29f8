//!
//! fat_recov: A library and CLI for recovering BMP files from FAT32 images.
//!
//! This crate provides tools for:
//! - Mapping a FAT32 image and validating its boot sector
//! - Decoding directory slots and long filename chains, deleted ones included
//! - Classifying every data cluster and carving BMP files out of them
//! - Building FAT32 lab images to recover from
//!
//! The library is designed for extensibility and can be used both as a CLI tool and as a Rust library.
//!
//! # Re-exports
//! - [`FATVol`]: Mapped FAT32 image
//! - [`Recovery`]: Recovery run over an image
//! - [`RecoveryConfig`]: Settings of a run

pub mod commands;
pub mod config;
pub mod filesystem;
pub mod recovery;
pub mod traits;
pub mod utils;

/// Mapped FAT32 image (see [`filesystem::fat::FATVol`]).
pub use crate::filesystem::fat::FATVol;
/// Settings of a run (see [`config::RecoveryConfig`]).
pub use crate::config::RecoveryConfig;
/// Recovery run over an image (see [`recovery::driver::Recovery`]).
pub use crate::recovery::driver::{Recovery, RecoveryReport};
