//! FAT32 boot sector and BIOS Parameter Block.
//!
//! This module implements:
//! - Boot sector decoding straight from the first 512 bytes of the mapped image
//! - The geometry derived from the BPB (data area start, cluster size, cluster count)
//! - The checks every image goes through (signature) and the optional full FAT32 validation

use binread::{BinRead, BinReaderExt};
use getset::Getters;
use std::fmt;
use std::io;

use super::fat_error::FATError;
use super::fat_type::FATType;

/// Size of the boot sector in bytes.
pub const BOOT_SECTOR_SIZE: usize = 512;

/// Boot sector signature as read little-endian from offset 510.
pub const BOOT_SIGNATURE: u16 = 0xAA55;

/// BIOS Parameter Block structure for FAT32 filesystems.
///
/// Decoded once when the image is opened and never modified afterwards.
#[derive(BinRead, Debug, Clone, Getters)]
#[br(little)]
pub struct Bpb {
    /// Jump instruction to boot code (must be 0xEB ?? 0x90 or 0xE9 ?? ??)
    jmp: [u8; 3],
    /// OEM identifier (e.g., "MSWIN4.1")
    #[get = "pub"]
    oem_name: [u8; 8],
    /// Number of bytes per sector
    #[get = "pub"]
    bytes_per_sec: u16,
    /// Number of sectors per cluster
    #[get = "pub"]
    sec_per_clus: u8,
    /// Number of reserved sectors from start of volume
    #[get = "pub"]
    rsvd_sec_cnt: u16,
    /// Number of FAT copies
    #[get = "pub"]
    num_fat: u8,
    /// Maximum number of root directory entries (0 for FAT32)
    root_ent_cnt: u16,
    /// Total sectors for volumes < 32MB (0 for FAT32)
    tot_sec_16: u16,
    _media: u8,
    /// Sectors per FAT for FAT12/FAT16 (0 for FAT32)
    fat_sz_16: u16,
    _sec_per_trk: u16,
    _num_heads: u16,
    _hidd_sec: u32,
    /// Total sectors for volumes >= 32MB
    tot_sec_32: u32,

    // FAT32-specific fields
    /// Sectors per FAT
    fat_sz_32: u32,
    _ext_flags: u16,
    _fs_ver: u16,
    /// First cluster of root directory (typically 2)
    #[get = "pub"]
    root_clus: u32,
    _fs_info: u16,
    _bk_boot_sec: u16,
    _reserved: [u8; 12],
    _drv_num: u8,
    _reserved_1: u8,
    _boot_sig: u8,
    /// Volume serial number
    #[get = "pub"]
    vol_id: u32,
    #[get = "pub"]
    vol_lab: [u8; 11],
    _fil_sys_type: [u8; 8],

    #[br(count = 420)]
    _boot_code: Vec<u8>,
    /// Boot sector signature (0x55 0xAA)
    sig: [u8; 2],
}

impl Bpb {
    /// Decodes a BPB from the first bytes of an image.
    ///
    /// # Errors
    /// - `FATError::ImageTooSmall` if fewer than 512 bytes are available
    /// - `FATError::BinReadError` if decoding fails
    pub fn from_bytes(buf: &[u8]) -> Result<Bpb, FATError> {
        if buf.len() < BOOT_SECTOR_SIZE {
            return Err(FATError::ImageTooSmall(buf.len() as u64));
        }

        let mut reader = io::Cursor::new(&buf[..BOOT_SECTOR_SIZE]);
        Ok(reader.read_le()?)
    }

    /// The boot sector signature as a little-endian word.
    pub fn signature(&self) -> u16 {
        u16::from_le_bytes(self.sig)
    }

    pub fn fat_sz(&self) -> u32 {
        if self.fat_sz_16 > 0 {
            self.fat_sz_16 as u32
        } else {
            self.fat_sz_32
        }
    }

    pub fn tot_sec(&self) -> u32 {
        if self.tot_sec_16 != 0 {
            self.tot_sec_16 as u32
        } else {
            self.tot_sec_32
        }
    }

    /// Number of bytes the BPB claims the volume occupies.
    pub fn declared_len(&self) -> u64 {
        self.tot_sec() as u64 * self.bytes_per_sec as u64
    }

    /// First sector of the data area: `reserved + fatCount × sectorsPerFat`.
    pub fn data_start_sector(&self) -> u64 {
        self.rsvd_sec_cnt as u64 + self.num_fat as u64 * self.fat_sz() as u64
    }

    pub fn cluster_size(&self) -> u32 {
        self.sec_per_clus as u32 * self.bytes_per_sec as u32
    }

    /// Determines the number of clusters in the data area.
    pub fn cluster_count(&self) -> u32 {
        if self.sec_per_clus == 0 {
            return 0;
        }

        let data_sec = (self.tot_sec() as u64).saturating_sub(self.data_start_sector());
        (data_sec / self.sec_per_clus as u64) as u32
    }

    /// Determines the FAT type based on the number of clusters in the filesystem.
    pub fn fat_type(&self) -> FATType {
        FATType::from_cluster_count(self.cluster_count())
    }

    /// Checks performed on every image: the boot signature and a usable geometry.
    ///
    /// # Errors
    /// - `FATError::InvalidSignature`: If boot sector signature is not 0x55AA
    /// - `FATError::InvalidBytesPerSec` / `FATError::InvalidSecPerClus`: If either is 0
    /// - `FATError::InvalidNumFat`: If there is no FAT
    pub fn check(self) -> Result<Self, FATError> {
        if self.signature() != BOOT_SIGNATURE {
            return Err(FATError::InvalidSignature(format!(
                "0x{:02X}{:02X}",
                self.sig[0], self.sig[1]
            )));
        }

        if self.bytes_per_sec == 0 {
            return Err(FATError::InvalidBytesPerSec(self.bytes_per_sec));
        }

        if self.sec_per_clus == 0 {
            return Err(FATError::InvalidSecPerClus(self.sec_per_clus));
        }

        if self.num_fat == 0 {
            return Err(FATError::InvalidNumFat(self.num_fat));
        }

        Ok(self)
    }

    /// Validates the BPB according to FAT32 specification requirements.
    ///
    /// # Errors
    /// - `FATError::InvalidJmp`: If the jump instruction is invalid
    /// - `FATError::InvalidBytesPerSec`: If bytes per sector is not a valid value
    /// - `FATError::InvalidSecPerClus`: If sectors per cluster is not a valid value
    /// - `FATError::InvalidClusSz`: If cluster size exceeds 32 KiB
    /// - `FATError::UnsupportedFATType`: If filesystem is not FAT32
    pub fn validate(self) -> Result<Self, FATError> {
        if !((self.jmp[0] == 0xEB && self.jmp[2] == 0x90) || self.jmp[0] == 0xE9) {
            return Err(FATError::InvalidJmp(format!(
                "0x{:02X}{:02X}{:02X}",
                self.jmp[0], self.jmp[1], self.jmp[2],
            )));
        }

        const VALID_BYTES_PER_SEC: [u16; 4] = [512, 1024, 2048, 4096];
        if !VALID_BYTES_PER_SEC.contains(&self.bytes_per_sec) {
            return Err(FATError::InvalidBytesPerSec(self.bytes_per_sec));
        }

        const VALID_SEC_PER_CLUS: [u8; 8] = [1, 2, 4, 8, 16, 32, 64, 128];
        if !VALID_SEC_PER_CLUS.contains(&self.sec_per_clus) {
            return Err(FATError::InvalidSecPerClus(self.sec_per_clus));
        }

        if self.cluster_size() > 32 * 1024 {
            return Err(FATError::InvalidClusSz(self.cluster_size()));
        }

        let fat_type = self.fat_type();
        if fat_type == FATType::FAT32 {
            self.validate_fat32()
        } else {
            Err(FATError::UnsupportedFATType(fat_type.to_string()))
        }
    }

    fn validate_fat32(self) -> Result<Self, FATError> {
        if self.rsvd_sec_cnt == 0 {
            return Err(FATError::InvalidRsvdSecCnt(self.rsvd_sec_cnt));
        }

        if self.root_ent_cnt != 0 {
            return Err(FATError::InvalidRootEntCnt(self.root_ent_cnt));
        }

        if self.tot_sec_16 != 0 {
            return Err(FATError::InvalidTotSec(String::from(
                "BPB_TotSec16 should be 0 for a FAT32 volume.",
            )));
        }
        if self.tot_sec_32 == 0 {
            return Err(FATError::InvalidTotSec(String::from(
                "BPB_TotSec32 should be greater than 0 for a FAT32 volume.",
            )));
        }

        if self.fat_sz_16 != 0 {
            return Err(FATError::InvalidFatSz(String::from(
                "BPB_FATSz16 should be 0 for a FAT32 volume.",
            )));
        }
        if self.fat_sz_32 == 0 {
            return Err(FATError::InvalidFatSz(String::from(
                "BPB_FATSz32 should be greater than 0 for a FAT32 volume.",
            )));
        }

        if self.root_clus < 2 {
            return Err(FATError::InvalidRootClus(self.root_clus));
        }

        Ok(self)
    }
}

/// One-line geometry summary, in the spirit of `file(1)` output.
impl fmt::Display for Bpb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DOS/MBR boot sector, OEM-ID \"{}\", sectors/cluster {}, sectors {}, sectors/FAT {}, serial number 0x{:x}",
            String::from_utf8_lossy(&self.oem_name).trim_end(),
            self.sec_per_clus,
            self.tot_sec(),
            self.fat_sz(),
            self.vol_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::lab_image::{Geometry, LabImage};

    fn boot_sector(geometry: Geometry) -> Vec<u8> {
        LabImage::new(geometry).bytes()[..BOOT_SECTOR_SIZE].to_vec()
    }

    #[test]
    fn decodes_geometry() {
        let buf = boot_sector(Geometry::small(2048));
        let bpb = Bpb::from_bytes(&buf).unwrap().check().unwrap();

        assert_eq!(*bpb.bytes_per_sec(), 512);
        assert_eq!(*bpb.sec_per_clus(), 1);
        assert_eq!(*bpb.root_clus(), 2);
        assert_eq!(bpb.signature(), BOOT_SIGNATURE);
        assert_eq!(bpb.declared_len(), 2048 * 512);
        assert_eq!(
            bpb.data_start_sector(),
            *bpb.rsvd_sec_cnt() as u64 + *bpb.num_fat() as u64 * bpb.fat_sz() as u64
        );
    }

    #[test]
    fn rejects_bad_signature() {
        let mut buf = boot_sector(Geometry::small(2048));
        buf[510] = 0x00;

        let err = Bpb::from_bytes(&buf).unwrap().check().unwrap_err();
        assert!(matches!(err, FATError::InvalidSignature(_)));
    }

    #[test]
    fn rejects_short_buffer() {
        let err = Bpb::from_bytes(&[0u8; 100]).unwrap_err();
        assert!(matches!(err, FATError::ImageTooSmall(100)));
    }

    #[test]
    fn strict_validation_rejects_small_volumes() {
        // 2048 sectors of 512 bytes is far below the FAT32 cluster count threshold.
        let buf = boot_sector(Geometry::small(2048));
        let err = Bpb::from_bytes(&buf).unwrap().validate().unwrap_err();
        assert!(matches!(err, FATError::UnsupportedFATType(_)));
    }

    #[test]
    fn strict_validation_accepts_fat32_volume() {
        let buf = boot_sector(Geometry::small(70_000));
        let bpb = Bpb::from_bytes(&buf).unwrap().validate().unwrap();
        assert_eq!(bpb.fat_type(), FATType::FAT32);
    }
}
