//! In-memory FAT32 image builder.
//!
//! Lays out a boot sector, the FAT copies and a root directory, then lets callers drop files
//! (with their long names) into directory clusters, delete them again, and write the result to
//! disk. Files are always stored in contiguous clusters.

use log::info;
use std::fs;
use std::io;
use std::path::Path;

use super::bpb::{BOOT_SECTOR_SIZE, BOOT_SIGNATURE};
use super::dir_entry::{DELETED_MARKER, DIR_ENTRY_SIZE};
use super::fat_error::FATError;
use super::lfn;
use crate::utils::u32_at;

/// End of chain marker written into the FAT.
const FAT_EOC: u32 = 0x0FFF_FFFF;

/// Geometry of the image to build.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub bytes_per_sec: u16,
    pub sec_per_clus: u8,
    pub rsvd_sec_cnt: u16,
    pub num_fat: u8,
    pub tot_sec: u32,
    pub root_clus: u32,
}

impl Geometry {
    /// 512-byte sectors, one sector per cluster, two FATs.
    pub fn small(tot_sec: u32) -> Self {
        Self {
            bytes_per_sec: 512,
            sec_per_clus: 1,
            rsvd_sec_cnt: 32,
            num_fat: 2,
            tot_sec,
            root_clus: 2,
        }
    }

    /// Sectors per FAT, large enough to map every cluster of the data area.
    pub fn fat_sz(&self) -> u32 {
        let clusters =
            self.tot_sec.saturating_sub(self.rsvd_sec_cnt as u32) / self.sec_per_clus as u32 + 2;
        (clusters * 4).div_ceil(self.bytes_per_sec as u32)
    }

    pub fn cluster_size(&self) -> usize {
        self.bytes_per_sec as usize * self.sec_per_clus as usize
    }

    fn data_start(&self) -> usize {
        (self.rsvd_sec_cnt as usize + self.num_fat as usize * self.fat_sz() as usize)
            * self.bytes_per_sec as usize
    }
}

/// Slots occupied by a file added to a directory.
#[derive(Debug, Clone)]
pub struct FileSlots {
    pub dir_cluster: u32,
    /// Index of the first slot (a fragment when the file has a long name).
    pub first: usize,
    /// Index of the short entry.
    pub short: usize,
    pub cluster: u32,
    pub cluster_cnt: u32,
}

/// A FAT32 image under construction.
pub struct LabImage {
    geometry: Geometry,
    buf: Vec<u8>,
    next_cluster: u32,
    alias_cnt: u32,
}

impl LabImage {
    pub fn new(geometry: Geometry) -> Self {
        let len = geometry.tot_sec as usize * geometry.bytes_per_sec as usize;
        let mut image = Self {
            geometry,
            buf: vec![0; len],
            next_cluster: geometry.root_clus + 1,
            alias_cnt: 0,
        };

        image.write_boot_sector();
        for (cluster, value) in [(0, 0x0FFF_FFF8), (1, FAT_EOC), (geometry.root_clus, FAT_EOC)] {
            image.set_fat_entry(cluster, value);
        }

        image
    }

    fn write_boot_sector(&mut self) {
        let g = self.geometry;
        let bs = &mut self.buf[..BOOT_SECTOR_SIZE];

        bs[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        bs[3..11].copy_from_slice(b"MSWIN4.1");
        bs[11..13].copy_from_slice(&g.bytes_per_sec.to_le_bytes());
        bs[13] = g.sec_per_clus;
        bs[14..16].copy_from_slice(&g.rsvd_sec_cnt.to_le_bytes());
        bs[16] = g.num_fat;
        bs[21] = 0xF8;
        bs[24..26].copy_from_slice(&32u16.to_le_bytes());
        bs[26..28].copy_from_slice(&64u16.to_le_bytes());
        bs[32..36].copy_from_slice(&g.tot_sec.to_le_bytes());
        bs[36..40].copy_from_slice(&g.fat_sz().to_le_bytes());
        bs[44..48].copy_from_slice(&g.root_clus.to_le_bytes());
        bs[48..50].copy_from_slice(&1u16.to_le_bytes());
        bs[50..52].copy_from_slice(&6u16.to_le_bytes());
        bs[64] = 0x80;
        bs[66] = 0x29;
        bs[67..71].copy_from_slice(&0x1234_ABCDu32.to_le_bytes());
        bs[71..82].copy_from_slice(b"NO NAME    ");
        bs[82..90].copy_from_slice(b"FAT32   ");
        bs[510..512].copy_from_slice(&BOOT_SIGNATURE.to_le_bytes());
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn root_clus(&self) -> u32 {
        self.geometry.root_clus
    }

    /// Byte offset of a cluster, checked against the image length.
    pub fn cluster_offset(&self, cluster: u32) -> Result<usize, FATError> {
        if cluster < 2 {
            return Err(FATError::InvalidClusterError(cluster));
        }

        let offset = self.geometry.data_start() + (cluster as usize - 2) * self.geometry.cluster_size();
        if offset + self.geometry.cluster_size() > self.buf.len() {
            return Err(FATError::OutOfRange {
                cluster,
                offset: offset as u64,
                len: self.buf.len() as u64,
            });
        }

        Ok(offset)
    }

    /// Writes `data` starting at `cluster`, spilling into the following clusters.
    pub fn write_data(&mut self, cluster: u32, data: &[u8]) -> Result<(), FATError> {
        let cluster_cnt = (data.len().max(1)).div_ceil(self.geometry.cluster_size()) as u32;
        self.cluster_offset(cluster + cluster_cnt - 1)?;

        let offset = self.cluster_offset(cluster)?;
        self.buf[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Writes a raw 32-byte slot into a directory cluster.
    pub fn write_slot(
        &mut self,
        dir_cluster: u32,
        index: usize,
        slot: &[u8; DIR_ENTRY_SIZE],
    ) -> Result<(), FATError> {
        let offset = self.slot_offset(dir_cluster, index)?;
        self.buf[offset..offset + DIR_ENTRY_SIZE].copy_from_slice(slot);
        Ok(())
    }

    /// Adds a file at the next free clusters. See [`LabImage::add_file_at`].
    pub fn add_file(
        &mut self,
        dir_cluster: u32,
        name: &str,
        data: &[u8],
    ) -> Result<FileSlots, FATError> {
        let cluster = self.next_cluster;
        self.add_file_at(dir_cluster, name, cluster, data)
    }

    /// Adds a file whose data starts at `cluster`.
    ///
    /// Names that are not plain upper-case 8.3 names get a long name and a `~N` short alias.
    pub fn add_file_at(
        &mut self,
        dir_cluster: u32,
        name: &str,
        cluster: u32,
        data: &[u8],
    ) -> Result<FileSlots, FATError> {
        let (short_name, fragments) = if is_plain_short_name(name) {
            (lfn::short_name_bytes(name), vec![])
        } else {
            self.alias_cnt += 1;
            let short_name = alias(name, self.alias_cnt);
            (short_name, lfn::encode(name, &short_name)?)
        };

        let first = self.free_slot(dir_cluster)?;
        let short = first + fragments.len();
        self.slot_offset(dir_cluster, short)?;
        self.write_data(cluster, data)?;

        for (i, fragment) in fragments.iter().enumerate() {
            self.write_slot(dir_cluster, first + i, fragment)?;
        }
        self.write_slot(
            dir_cluster,
            short,
            &lfn::short_entry(&short_name, cluster, data.len() as u32),
        )?;
        let cluster_cnt = (data.len().max(1)).div_ceil(self.geometry.cluster_size()) as u32;
        for c in cluster..cluster + cluster_cnt {
            let next = if c + 1 == cluster + cluster_cnt { FAT_EOC } else { c + 1 };
            self.set_fat_entry(c, next);
        }
        self.next_cluster = self.next_cluster.max(cluster + cluster_cnt);

        Ok(FileSlots {
            dir_cluster,
            first,
            short,
            cluster,
            cluster_cnt,
        })
    }

    /// Deletes a file the way a FAT driver does: its slots get the 0xE5 marker and its clusters are
    /// released in the FAT. The data itself is left in place.
    pub fn delete(&mut self, file: &FileSlots) -> Result<(), FATError> {
        for index in file.first..=file.short {
            let offset = self.slot_offset(file.dir_cluster, index)?;
            self.buf[offset] = DELETED_MARKER;
        }
        for c in file.cluster..file.cluster + file.cluster_cnt {
            self.set_fat_entry(c, 0);
        }
        Ok(())
    }

    /// Writes the image to `path`.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, &self.buf)?;
        info!(
            "Wrote {} sectors of {} bytes to {}",
            self.geometry.tot_sec,
            self.geometry.bytes_per_sec,
            path.display()
        );
        Ok(())
    }

    fn slot_offset(&self, dir_cluster: u32, index: usize) -> Result<usize, FATError> {
        let slots = self.geometry.cluster_size() / DIR_ENTRY_SIZE;
        if index >= slots {
            return Err(FATError::OutOfRange {
                cluster: dir_cluster,
                offset: (index * DIR_ENTRY_SIZE) as u64,
                len: self.geometry.cluster_size() as u64,
            });
        }
        Ok(self.cluster_offset(dir_cluster)? + index * DIR_ENTRY_SIZE)
    }

    fn free_slot(&self, dir_cluster: u32) -> Result<usize, FATError> {
        let offset = self.cluster_offset(dir_cluster)?;
        let cluster = &self.buf[offset..offset + self.geometry.cluster_size()];
        Ok(cluster
            .chunks_exact(DIR_ENTRY_SIZE)
            .position(|slot| slot[0] == 0)
            .unwrap_or(cluster.len() / DIR_ENTRY_SIZE))
    }

    fn set_fat_entry(&mut self, cluster: u32, value: u32) {
        let g = self.geometry;
        for i in 0..g.num_fat as usize {
            let off = (g.rsvd_sec_cnt as usize + i * g.fat_sz() as usize) * g.bytes_per_sec as usize
                + cluster as usize * 4;
            let value = (u32_at(&self.buf, off) & 0xF000_0000) | (value & 0x0FFF_FFFF);
            self.buf[off..off + 4].copy_from_slice(&value.to_le_bytes());
        }
    }
}

fn is_plain_short_name(name: &str) -> bool {
    let (base, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    let valid = |s: &str| {
        s.bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b"_-~!#$%&'()@^{}".contains(&b))
    };
    !base.is_empty() && base.len() <= 8 && ext.len() <= 3 && valid(base) && valid(ext)
}

/// Short alias `BASE~N.EXT` for a long name.
fn alias(name: &str, n: u32) -> [u8; 11] {
    let (base, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    let keep = |s: &str, len: usize| -> String {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(len)
            .collect::<String>()
            .to_ascii_uppercase()
    };
    let suffix = format!("~{n}");
    let base = keep(base, 8 - suffix.len());
    lfn::short_name_bytes(&format!("{base}{suffix}.{}", keep(ext, 3)))
}
