//! Recovery settings.

use crate::recovery::resolver::DEFAULT_LOOKAHEAD;

/// Largest header-declared size accepted for a carved file.
pub const DEFAULT_MAX_CARVED_SIZE: u32 = 100 * 1024 * 1024;

pub const DEFAULT_WORKERS: usize = 4;

/// Settings of a recovery run.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Run the full FAT32 BPB validation on top of the signature and size checks
    pub validate: bool,
    /// Size of the worker pool; never below 1
    pub workers: usize,
    /// Clusters searched after the last confirmed one when a file is not contiguous
    pub lookahead: u32,
    /// Cross-check the 54-byte BMP header instead of trusting the "BM" magic alone
    pub strict_bmp_header: bool,
    pub max_carved_size: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            validate: false,
            workers: DEFAULT_WORKERS,
            lookahead: DEFAULT_LOOKAHEAD,
            strict_bmp_header: true,
            max_carved_size: DEFAULT_MAX_CARVED_SIZE,
        }
    }
}

impl RecoveryConfig {
    /// Number of worker threads to start.
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }
}
