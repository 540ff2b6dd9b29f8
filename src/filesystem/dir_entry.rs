//! FAT directory slot decoding.
//!
//! A directory cluster is an array of 32-byte slots. Each slot decodes into one [`DirSlot`] variant:
//! free, deleted, long filename fragment, short 8.3 entry (file or directory), volume label, or an
//! unknown shape. Decoding is total; garbage bytes become [`DirSlot::Unknown`].

use binread::{BinRead, BinReaderExt};
use getset::Getters;
use std::fmt;
use std::io;

/// Size of a directory slot in bytes.
pub const DIR_ENTRY_SIZE: usize = 32;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = ATTR_READ_ONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_VOLUME_ID;

/// First byte of a slot that has been deleted.
pub const DELETED_MARKER: u8 = 0xE5;

/// Character rendered in place of anything that is not printable ASCII, including the first
/// character of a deleted short name.
pub const PLACEHOLDER: char = '_';

/// Bit flagging the last (highest numbered) fragment of a long filename.
pub const LAST_LONG_ENTRY: u8 = 0x40;

/// A long filename is at most 255 characters, i.e. 20 fragments of 13 characters.
pub const MAX_LFN_FRAGMENTS: u8 = 20;

/// Characters never allowed in a short name.
const FORBIDDEN_SHORT_CHARS: &[u8] = b"\"*+,./:;<=>?[\\]|";

/// Short (8.3) directory entry.
///
/// # Fields
/// - `name`: 8.3 format filename (8 characters for name, 3 for extension)
/// - `attr`: File attributes (read-only, hidden, system, volume label, directory, archive)
/// - `fst_clus_hi`: High 16 bits of the first cluster number
/// - `fst_clus_lo`: Low 16 bits of the first cluster number
/// - `file_size`: Size of the file in bytes (0 for directories)
#[derive(BinRead, Debug, Clone, Getters)]
#[br(little)]
pub struct DirEntry {
    #[get = "pub"]
    name: [u8; 11],
    #[get = "pub"]
    attr: u8,
    _n_t_res: u8,
    _ctr_time_tenth: u8,
    _crt_time: u16,
    _crt_date: u16,
    _lst_acc_date: u16,
    fst_clus_hi: u16,
    _wrt_time: u16,
    _wrt_date: u16,
    fst_clus_lo: u16,
    #[get = "pub"]
    file_size: u32,
}

/// Long filename fragment.
///
/// Each fragment carries 13 UTF-16 code units split in three groups, and the checksum of the short
/// entry that owns the name.
#[derive(BinRead, Debug, Clone, Getters)]
#[br(little)]
pub struct LfnEntry {
    /// Sequence byte: position in the low 6 bits, 0x40 on the last fragment
    #[get = "pub"]
    ord: u8,
    name1: [u16; 5],
    _attr: u8,
    entry_type: u8,
    #[get = "pub"]
    chksum: u8,
    name2: [u16; 6],
    fst_clus_lo: u16,
    name3: [u16; 2],
}

/// Whether a short entry names a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// A deleted slot. Only the first byte was overwritten, so the rest is decoded as usual.
#[derive(Debug, Clone)]
pub enum Deleted {
    Short(DirEntry),
    /// A fragment whose sequence byte is lost; its position follows from storage order.
    LongName(LfnEntry),
}

/// Decoded form of a 32-byte directory slot.
#[derive(Debug, Clone)]
pub enum DirSlot {
    /// First byte 0x00: no further slot of this directory region is in use.
    Free,
    /// First byte 0xE5.
    Deleted(Deleted),
    LongName(LfnEntry),
    Short { entry: DirEntry, kind: EntryKind },
    VolumeId(DirEntry),
    Unknown,
}

impl DirSlot {
    /// Decodes a 32-byte slot. Never fails; anything undecodable is `Unknown`.
    pub fn parse(buf: &[u8]) -> DirSlot {
        if buf.len() < DIR_ENTRY_SIZE {
            return DirSlot::Unknown;
        }

        match buf[0] {
            0x00 => return DirSlot::Free,
            DELETED_MARKER if buf[0x0B] == ATTR_LONG_NAME => {
                return LfnEntry::from_slice(buf)
                    .map(|lfn| DirSlot::Deleted(Deleted::LongName(lfn)))
                    .unwrap_or(DirSlot::Unknown);
            }
            DELETED_MARKER => {
                return DirEntry::from_slice(buf)
                    .map(|entry| DirSlot::Deleted(Deleted::Short(entry)))
                    .unwrap_or(DirSlot::Unknown);
            }
            _ => {}
        }

        let attr = buf[0x0B];
        if attr == ATTR_LONG_NAME {
            return LfnEntry::from_slice(buf)
                .map(DirSlot::LongName)
                .unwrap_or(DirSlot::Unknown);
        }

        let entry = match DirEntry::from_slice(buf) {
            Ok(entry) => entry,
            Err(_) => return DirSlot::Unknown,
        };

        if attr & ATTR_DIRECTORY != 0 {
            DirSlot::Short {
                entry,
                kind: EntryKind::Directory,
            }
        } else if attr & ATTR_VOLUME_ID != 0 {
            DirSlot::VolumeId(entry)
        } else {
            DirSlot::Short {
                entry,
                kind: EntryKind::File,
            }
        }
    }

    /// Whether the slot looks like something a FAT driver would have written.
    ///
    /// This is a structural heuristic used to tell directory clusters apart from file data. It never
    /// proves a slot genuine. `max_cluster` is the first cluster number past the data area.
    pub fn is_plausible(&self, max_cluster: u32) -> bool {
        match self {
            DirSlot::Free | DirSlot::Unknown => false,
            DirSlot::LongName(lfn) => lfn.is_plausible(false),
            DirSlot::Deleted(Deleted::LongName(lfn)) => lfn.is_plausible(true),
            DirSlot::Deleted(Deleted::Short(entry)) => entry.is_plausible(max_cluster),
            DirSlot::Short { entry, kind } => {
                entry.is_plausible(max_cluster)
                    && (*kind == EntryKind::File || *entry.file_size() == 0)
            }
            DirSlot::VolumeId(entry) => {
                entry.attr & 0xC0 == 0 && entry.name[0] != b' ' && entry.name_tail_is_plausible()
            }
        }
    }
}

impl DirEntry {
    /// Creates a directory entry from a byte slice of at least 32 bytes.
    pub fn from_slice(buf: &[u8]) -> Result<Self, binread::Error> {
        let mut reader = io::Cursor::new(buf);
        reader.read_le()
    }

    /// Returns the complete first cluster number for this entry.
    ///
    /// Always combines both halves: `(fst_clus_hi << 16) | fst_clus_lo`.
    pub fn cluster_number(&self) -> u32 {
        ((self.fst_clus_hi as u32) << 16) | self.fst_clus_lo as u32
    }

    pub fn is_dir(&self) -> bool {
        self.attr & ATTR_DIRECTORY != 0
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == DELETED_MARKER
    }

    /// The three extension bytes, space padded.
    pub fn extension(&self) -> &[u8] {
        &self.name[8..11]
    }

    /// Renders the 8.3 name: trailing spaces trimmed, a "." before a non-blank extension.
    ///
    /// Non-printable bytes and the overwritten first byte of a deleted entry render as
    /// [`PLACEHOLDER`].
    pub fn short_name(&self) -> String {
        let render = |(i, &b): (usize, &u8)| {
            if i == 0 && (b == DELETED_MARKER || b == 0x05) {
                PLACEHOLDER
            } else {
                printable(b as u16)
            }
        };

        let base: String = self.name[..8].iter().enumerate().map(render).collect();
        let ext: String = self.name[8..].iter().enumerate().map(|(i, b)| render((i + 8, b))).collect();
        let base = base.trim_end_matches(' ');
        let ext = ext.trim_end_matches(' ');

        if ext.is_empty() {
            base.to_string()
        } else {
            format!("{base}.{ext}")
        }
    }

    fn is_dot_entry(&self) -> bool {
        &self.name == b".          " || &self.name == b"..         "
    }

    fn is_plausible(&self, max_cluster: u32) -> bool {
        if self.attr & 0xC0 != 0 || self.attr & ATTR_VOLUME_ID != 0 {
            return false;
        }

        let first_ok = self.is_deleted()
            || self.name[0] == 0x05
            || (self.name[0] > 0x20 && !FORBIDDEN_SHORT_CHARS.contains(&self.name[0]));
        if !(self.is_dot_entry() || (first_ok && self.name_tail_is_plausible())) {
            return false;
        }

        let cluster = self.cluster_number();
        cluster == 0 || (2..max_cluster).contains(&cluster)
    }

    fn name_tail_is_plausible(&self) -> bool {
        self.name[1..]
            .iter()
            .all(|&b| b >= 0x20 && b != 0x7F && !FORBIDDEN_SHORT_CHARS.contains(&b))
    }
}

impl LfnEntry {
    pub fn from_slice(buf: &[u8]) -> Result<Self, binread::Error> {
        let mut reader = io::Cursor::new(buf);
        reader.read_le()
    }

    /// 1-based position of the fragment within the name.
    pub fn position(&self) -> u8 {
        self.ord & 0x3F
    }

    pub fn is_last(&self) -> bool {
        self.ord & LAST_LONG_ENTRY != 0
    }

    /// The 13 UTF-16 code units in storage order.
    pub fn units(&self) -> impl Iterator<Item = u16> + '_ {
        self.name1
            .iter()
            .chain(self.name2.iter())
            .chain(self.name3.iter())
            .copied()
    }

    fn is_plausible(&self, deleted: bool) -> bool {
        let position_ok = deleted || (1..=MAX_LFN_FRAGMENTS).contains(&self.position());
        position_ok && self.entry_type == 0 && self.fst_clus_lo == 0
    }
}

/// Maps a code unit to printable ASCII, anything else becomes [`PLACEHOLDER`].
pub fn printable(unit: u16) -> char {
    match unit {
        0x20..=0x7E => unit as u8 as char,
        _ => PLACEHOLDER,
    }
}

impl fmt::Display for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" {}B", self.short_name(), self.file_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_slot(name: &[u8; 11], attr: u8, cluster: u32, size: u32) -> [u8; 32] {
        let mut buf = [0u8; 32];
        buf[..11].copy_from_slice(name);
        buf[0x0B] = attr;
        buf[0x14..0x16].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
        buf[0x1A..0x1C].copy_from_slice(&(cluster as u16).to_le_bytes());
        buf[0x1C..0x20].copy_from_slice(&size.to_le_bytes());
        buf
    }

    #[test]
    fn free_and_deleted() {
        assert!(matches!(DirSlot::parse(&[0u8; 32]), DirSlot::Free));

        let slot = short_slot(b"\xE5       BMP", ATTR_ARCHIVE, 10, 512);
        match DirSlot::parse(&slot) {
            DirSlot::Deleted(Deleted::Short(entry)) => {
                assert!(entry.is_deleted());
                assert_eq!(entry.short_name(), "_.BMP");
                assert_eq!(entry.cluster_number(), 10);
            }
            other => panic!("unexpected slot {other:?}"),
        }
    }

    #[test]
    fn cluster_number_uses_both_halves() {
        let slot = short_slot(b"PIC     BMP", ATTR_ARCHIVE, 0x0003_0004, 1);
        match DirSlot::parse(&slot) {
            DirSlot::Short { entry, kind } => {
                assert_eq!(kind, EntryKind::File);
                assert_eq!(entry.cluster_number(), 0x0003_0004);
            }
            other => panic!("unexpected slot {other:?}"),
        }
    }

    #[test]
    fn attributes_select_variant() {
        let dir = short_slot(b"PHOTOS     ", ATTR_DIRECTORY, 5, 0);
        assert!(matches!(
            DirSlot::parse(&dir),
            DirSlot::Short { kind: EntryKind::Directory, .. }
        ));

        let label = short_slot(b"MYVOLUME   ", ATTR_VOLUME_ID, 0, 0);
        assert!(matches!(DirSlot::parse(&label), DirSlot::VolumeId(_)));

        let mut lfn = [0xFFu8; 32];
        lfn[0] = 0x41;
        lfn[0x0B] = ATTR_LONG_NAME;
        lfn[0x0C] = 0;
        lfn[0x1A] = 0;
        lfn[0x1B] = 0;
        match DirSlot::parse(&lfn) {
            DirSlot::LongName(entry) => {
                assert_eq!(entry.position(), 1);
                assert!(entry.is_last());
            }
            other => panic!("unexpected slot {other:?}"),
        }
    }

    #[test]
    fn short_name_rendering() {
        let slot = short_slot(b"README     ", ATTR_ARCHIVE, 3, 10);
        let entry = DirEntry::from_slice(&slot).unwrap();
        assert_eq!(entry.short_name(), "README");

        let slot = short_slot(b"A\x01      BMP", ATTR_ARCHIVE, 3, 10);
        let entry = DirEntry::from_slice(&slot).unwrap();
        assert_eq!(entry.short_name(), "A_.BMP");
    }

    #[test]
    fn plausibility() {
        let good = DirSlot::parse(&short_slot(b"A       BMP", ATTR_ARCHIVE, 10, 512));
        assert!(good.is_plausible(100));

        // First cluster past the data area.
        let bad = DirSlot::parse(&short_slot(b"A       BMP", ATTR_ARCHIVE, 500, 512));
        assert!(!bad.is_plausible(100));

        let bad = DirSlot::parse(&short_slot(b"A*?<    BMP", ATTR_ARCHIVE, 10, 512));
        assert!(!bad.is_plausible(100));

        let dot = DirSlot::parse(&short_slot(b".          ", ATTR_DIRECTORY, 10, 0));
        assert!(dot.is_plausible(100));

        assert!(!DirSlot::parse(&[0x7Fu8; 32]).is_plausible(100));
    }
}
