use std::io;
use thiserror::Error;

use crate::filesystem::fat_error::FATError;

/// Errors raised by the recovery engine.
///
/// Only [`RecoveryError::InvalidImage`] and [`RecoveryError::WorkerPool`] stop a run; everything else
/// is contained at the cluster or candidate that raised it.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("Invalid image: {0}")]
    InvalidImage(FATError),

    #[error("Cluster {cluster} at byte {offset} lies outside the {len}-byte image")]
    OutOfRange { cluster: u32, offset: u64, len: u64 },

    #[error("Failed to allocate a {0}-byte buffer")]
    AllocationFailure(usize),

    #[error("Only {accounted} of {declared} bytes could be resolved")]
    ResolutionIncomplete { declared: u32, accounted: u64 },

    #[error("Cluster {0} does not hold a BMP header")]
    MissingHeader(u32),

    #[error("The file starting at cluster {0} is empty")]
    EmptyFile(u32),

    #[error("Worker panicked while resolving the file at cluster {0}")]
    WorkerPanic(u32),

    #[error("Failed to build the worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Failed to write recovered file: {0}")]
    Output(#[from] io::Error),

    #[error("Filesystem error: {0}")]
    Filesystem(FATError),
}

impl RecoveryError {
    /// Whether the error aborts the whole run rather than a single candidate.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RecoveryError::InvalidImage(_) | RecoveryError::WorkerPool(_)
        )
    }

    /// Wraps an error raised while opening the image.
    pub fn open(err: FATError) -> Self {
        RecoveryError::InvalidImage(err)
    }
}

impl From<FATError> for RecoveryError {
    fn from(err: FATError) -> Self {
        match err {
            FATError::OutOfRange {
                cluster,
                offset,
                len,
            } => RecoveryError::OutOfRange {
                cluster,
                offset,
                len,
            },
            other => RecoveryError::Filesystem(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_open_and_pool_errors_are_fatal() {
        assert!(RecoveryError::open(FATError::InvalidSignature("0x0000".into())).is_fatal());
        assert!(!RecoveryError::EmptyFile(3).is_fatal());
        assert!(!RecoveryError::AllocationFailure(1 << 40).is_fatal());
        assert!(
            !RecoveryError::ResolutionIncomplete {
                declared: 10,
                accounted: 5
            }
            .is_fatal()
        );
    }

    #[test]
    fn out_of_range_is_routed() {
        let err: RecoveryError = FATError::OutOfRange {
            cluster: 9,
            offset: 4096,
            len: 1024,
        }
        .into();
        assert!(matches!(err, RecoveryError::OutOfRange { cluster: 9, .. }));
        assert!(!err.is_fatal());
    }
}
