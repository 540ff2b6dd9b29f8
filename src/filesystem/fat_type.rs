//! Enum for the different FAT types (FAT12, FAT16, FAT32).
//!
//! Only FAT32 images are recovered; the type is derived from the cluster count of the data area and is
//! checked when strict BPB validation is requested.

use std::fmt;

/// Represents the different types of FAT filesystems.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FATType {
    FAT12,
    FAT16,
    FAT32,
}

impl FATType {
    /// Microsoft's rule: fewer than 4085 clusters is FAT12, fewer than 65525 is FAT16.
    pub fn from_cluster_count(clus_cnt: u32) -> Self {
        match clus_cnt {
            0..4085 => FATType::FAT12,
            4085..65525 => FATType::FAT16,
            _ => FATType::FAT32,
        }
    }

    /// Width of a FAT entry in bits.
    pub fn entry_bits(&self) -> u8 {
        match self {
            FATType::FAT12 => 12,
            FATType::FAT16 => 16,
            FATType::FAT32 => 32,
        }
    }
}

impl fmt::Display for FATType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FAT{}", self.entry_bits())
    }
}
