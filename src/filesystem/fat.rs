//! FAT32 image accessor.
//!
//! This module maps a raw FAT32 image into memory and is the only place that touches the mapping:
//! - Opening the image and checking the boot signature and declared size
//! - Translating cluster numbers into bounds-checked byte ranges
//! - Reading the root directory cluster
//! - Displaying the volume layout

use log::{debug, info};
use memmap2::Mmap;
use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

use super::bpb::Bpb;
use super::fat_error::FATError;
use crate::traits::LayoutDisplay;

/// Structure for a mapped FAT32 image.
///
/// The mapping is acquired in [`FATVol::from_file`] and released when the value is dropped, on every
/// exit path. Consumers only ever receive slices that were checked against the mapped length.
pub struct FATVol {
    bpb: Bpb,
    mmap: Mmap,
    disk_path: PathBuf,
}

impl FATVol {
    /// Maps the image at `disk_path` and checks that it is a FAT32 image.
    ///
    /// # Parameters
    /// - `disk_path`: Path of the raw image
    /// - `validate`: Whether to run the full FAT32 BPB validation on top of the signature and size checks
    ///
    /// # Errors
    /// - `FATError::IOError` if the file cannot be opened or mapped
    /// - `FATError::InvalidSignature` if the boot signature is not 0xAA55
    /// - `FATError::SizeMismatch` if `totalSectors × bytesPerSector` differs from the file length
    /// - Any BPB validation error when `validate` is true
    pub fn from_file(disk_path: &Path, validate: bool) -> Result<FATVol, FATError> {
        let file = File::open(disk_path)?;
        let actual = file.metadata()?.len();
        if actual < super::bpb::BOOT_SECTOR_SIZE as u64 {
            return Err(FATError::ImageTooSmall(actual));
        }

        // SAFETY: the image is opened read-only and the recovery never writes through the mapping.
        // Concurrent modification of the file by another process is not supported.
        let mmap = unsafe { Mmap::map(&file)? };

        let bpb = Bpb::from_bytes(&mmap)?.check()?;
        let bpb = if validate { bpb.validate()? } else { bpb };

        if bpb.declared_len() != actual {
            return Err(FATError::SizeMismatch {
                declared: bpb.declared_len(),
                actual,
            });
        }

        info!("{}: {}", disk_path.display(), bpb);

        Ok(Self {
            bpb,
            mmap,
            disk_path: disk_path.to_path_buf(),
        })
    }

    pub fn bpb(&self) -> &Bpb {
        &self.bpb
    }

    pub fn disk_path(&self) -> &Path {
        &self.disk_path
    }

    /// Length of the mapped image in bytes.
    pub fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn cluster_size(&self) -> u32 {
        self.bpb.cluster_size()
    }

    /// Range of the data cluster numbers: `[2, clusterCount + 2)`.
    pub fn clusters(&self) -> Range<u32> {
        2..self.bpb.cluster_count().saturating_add(2)
    }

    /// Converts a cluster number to the byte offset of its first byte.
    ///
    /// # Errors
    /// - `FATError::InvalidClusterError` for clusters 0 and 1
    /// - `FATError::OutOfRange` if the whole cluster does not fit inside the image
    pub fn clus_to_offset(&self, cluster: u32) -> Result<u64, FATError> {
        if cluster < 2 {
            return Err(FATError::InvalidClusterError(cluster));
        }

        let sector = self.bpb.data_start_sector()
            + (cluster as u64 - 2) * *self.bpb.sec_per_clus() as u64;
        let offset = sector * *self.bpb.bytes_per_sec() as u64;

        if offset + self.cluster_size() as u64 > self.len() {
            return Err(FATError::OutOfRange {
                cluster,
                offset,
                len: self.len(),
            });
        }

        Ok(offset)
    }

    /// Returns the bytes of a cluster.
    ///
    /// # Errors
    /// Same as [`FATVol::clus_to_offset`]; nothing is read when the range is invalid.
    pub fn read_cluster(&self, cluster: u32) -> Result<&[u8], FATError> {
        let offset = self.clus_to_offset(cluster)? as usize;
        Ok(&self.mmap[offset..offset + self.cluster_size() as usize])
    }

    /// Returns the first cluster of the root directory.
    ///
    /// Only this cluster is read; the FAT chain of the root directory is not followed.
    pub fn root_dir_cluster(&self) -> Result<&[u8], FATError> {
        let root = *self.bpb.root_clus();
        debug!("Reading root directory at cluster {root}");
        self.read_cluster(root)
    }

    /// Returns the starting sector of the first FAT.
    fn fat_start(&self) -> u64 {
        *self.bpb.rsvd_sec_cnt() as u64
    }

    /// Returns the ending sector of the data region.
    fn data_end(&self) -> u64 {
        self.bpb.data_start_sector()
            + self.bpb.cluster_count() as u64 * *self.bpb.sec_per_clus() as u64
    }
}

/// Implements the LayoutDisplay trait for FATVol
impl LayoutDisplay for FATVol {
    fn display_layout(&self, indent: u8) -> Result<String, std::fmt::Error> {
        let mut out = String::from("");
        let indent = " ".repeat(indent.into());

        writeln!(out, "{}┌{:─^55}┐", indent, " FAT32 Image Layout ")?;
        writeln!(
            out,
            "{}├{:^12}┬{:^12}┬{:^12}┬{:^16}┤",
            indent, "Region", "Start", "End", "Description"
        )?;
        writeln!(
            out,
            "{}├{:─<12}┼{:─<12}┼{:─<12}┼{:─<16}┤",
            indent, "", "", "", ""
        )?;

        writeln!(
            out,
            "{}│{:<12}│{:<12}│{:<12}│{:<16}│",
            indent,
            "Reserved",
            0,
            self.fat_start(),
            "Boot + Reserved"
        )?;
        for i in 0..*self.bpb.num_fat() {
            let fat_i_start = self.fat_start() + i as u64 * self.bpb.fat_sz() as u64;
            let fat_i_end = fat_i_start + self.bpb.fat_sz() as u64;
            writeln!(
                out,
                "{}│{:<12}│{:<12}│{:<12}│{:<16}│",
                indent,
                format!("FAT #{}", i),
                fat_i_start,
                fat_i_end,
                "FAT Tables"
            )?;
        }
        writeln!(
            out,
            "{}│{:<12}│{:<12}│{:<12}│{:<16}│",
            indent,
            "Data",
            self.bpb.data_start_sector(),
            self.data_end(),
            format!("{} clusters", self.bpb.cluster_count())
        )?;
        let tot_sec = self.bpb.tot_sec() as u64;
        if self.data_end() < tot_sec {
            writeln!(
                out,
                "{}│{:<12}│{:<12}│{:<12}│{:<16}│",
                indent,
                "",
                self.data_end(),
                tot_sec,
                "Volume Slack"
            )?;
        }

        writeln!(
            out,
            "{}└{:─<12}┴{:─<12}┴{:─<12}┴{:─<16}┘",
            indent, "", "", "", ""
        )?;

        Ok(out)
    }
}
