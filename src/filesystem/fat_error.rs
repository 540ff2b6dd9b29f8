//! Error types for FAT32 image access and directory decoding.
//!
//! The BPB describes the physical layout of the volume. This module defines the errors raised while
//! opening and validating an image, while translating cluster numbers into byte ranges of the mapped
//! image, and while assembling long filenames out of directory slots.

use std::io;
use thiserror::Error;

/// Errors that can occur while reading a FAT32 image.
#[derive(Error, Debug)]
pub enum FATError {
    /// The first three bytes of a FAT volume must contain a valid x86 jump instruction.
    #[error("Invalid jump instruction `{0}`")]
    InvalidJmp(String),

    /// Bytes per sector must be 512, 1024, 2048 or 4096.
    #[error("Invalid count of bytes per sector: `{0}`. Legal values: 512, 1024, 2048 or 4096")]
    InvalidBytesPerSec(u16),

    /// Sectors per cluster must be a power of 2: 1, 2, 4, 8, 16, 32, 64, or 128.
    #[error(
        "Invalid number of sector per cluster: `{0}`. Legal values: 1, 2, 4, 8, 16, 32, 64, 128"
    )]
    InvalidSecPerClus(u8),

    /// Total cluster size (bytes per sector × sectors per cluster) must not exceed 32 KiB.
    #[error("Invalid cluster size: `{0}`. Any value greater than 32K is invalid.")]
    InvalidClusSz(u32),

    /// The count of reserved sectors must be greater than 0.
    #[error("Invalid count of reserved sectors: `{0}`. Any value greater than 0 is valid.")]
    InvalidRsvdSecCnt(u16),

    /// The number of File Allocation Tables must be greater than 0.
    #[error("Invalid number of FATs on this volume: `{0}`.")]
    InvalidNumFat(u8),

    /// For FAT32 volumes, the root directory entries count must be 0.
    #[error(
        "Invalid count of directory entries in the root directory: `{0}`. It should be 0 for a FAT32 volume. "
    )]
    InvalidRootEntCnt(u16),

    /// The total sector count must be valid for the volume size.
    #[error("Invalid total count of sectors on the volume: `{0}`")]
    InvalidTotSec(String),

    /// The FAT size in sectors must be valid and consistent with the volume layout.
    #[error("Invalid FAT size:`{0}`")]
    InvalidFatSz(String),

    /// Clusters 0 and 1 are reserved, the data area starts at cluster 2.
    #[error(
        "Invalid cluster number of the first cluster of the root directory: `{0}`. This value should be greater than 2."
    )]
    InvalidRootClus(u32),

    /// The boot sector signature must be 0x55AA.
    #[error("Invalid BPB signature: `{0}`. Expected signature: 0x55AA")]
    InvalidSignature(String),

    /// `totalSectors × bytesPerSector` disagrees with the length of the image file.
    #[error("Image size mismatch: the BPB declares {declared} bytes but the image holds {actual} bytes")]
    SizeMismatch { declared: u64, actual: u64 },

    /// The image cannot even hold a boot sector.
    #[error("Image too small: {0} bytes")]
    ImageTooSmall(u64),

    /// The detected FAT type is not supported (only FAT32 is supported).
    #[error("Unsupported FAT type: `{0}`")]
    UnsupportedFATType(String),

    /// Cluster numbers 0 and 1 do not address the data area.
    #[error("Invalid cluster number: `{0}`")]
    InvalidClusterError(u32),

    /// The byte range of a cluster is not fully inside the mapped image.
    #[error("Cluster {cluster} at offset {offset} lies outside the {len}-byte image")]
    OutOfRange { cluster: u32, offset: u64, len: u64 },

    /// The checksum stored in a long filename fragment does not match its short entry.
    #[error("LFN checksum mismatch: stored 0x{stored:02X}, computed 0x{computed:02X}")]
    ChecksumMismatch { stored: u8, computed: u8 },

    /// The long filename fragments do not form a consistent chain.
    #[error("Broken LFN chain: {0}")]
    BrokenLfnChain(String),

    /// Underlying I/O errors that occur while opening the image.
    #[error("IO Error: `{0}`")]
    IOError(io::Error),

    /// Parsing error occured during structure initialization
    #[error("BinRead Error: `{0}`")]
    BinReadError(binread::Error),
}

/// Converts standard I/O errors into FATError.
impl From<io::Error> for FATError {
    fn from(err: io::Error) -> Self {
        FATError::IOError(err)
    }
}

/// Converts BinRead errors into FATError.
impl From<binread::Error> for FATError {
    fn from(err: binread::Error) -> Self {
        FATError::BinReadError(err)
    }
}
