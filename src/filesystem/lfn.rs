//! Long filename reconstruction.
//!
//! Fragments are stored in descending sequence order right before their short entry, so callers
//! collect them while walking a directory and hand them over reversed, i.e. in ascending order.
//! A name that cannot be trusted falls back to the short name; damaged directories are expected
//! and never abort recovery.

use log::warn;

use super::dir_entry::{
    ATTR_ARCHIVE, ATTR_LONG_NAME, DIR_ENTRY_SIZE, DirEntry, LAST_LONG_ENTRY, LfnEntry, printable,
};
use super::fat_error::FATError;

/// Longest name a FAT long filename can hold.
pub const MAX_LFN_LEN: usize = 255;

/// UTF-16 code units carried by one fragment.
pub const CHARS_PER_FRAGMENT: usize = 13;

/// Byte offsets of the three name groups inside a fragment.
const NAME_GROUPS: [(usize, usize); 3] = [(1, 5), (14, 6), (28, 2)];

/// Where a reconstructed filename came from.
#[derive(Debug)]
pub enum NameOrigin {
    /// Assembled from a consistent chain of long filename fragments.
    Long,
    /// No fragment preceded the short entry.
    Short,
    /// Fragments were present but rejected.
    ShortFallback(FATError),
}

/// A filename ready to be reported.
#[derive(Debug)]
pub struct FileName {
    pub name: String,
    pub origin: NameOrigin,
}

/// Computes the checksum of an 11-byte short name, as stored in every fragment of its long name.
pub fn checksum(short_name: &[u8; 11]) -> u8 {
    short_name.iter().fold(0u8, |sum, &b| {
        ((sum & 1) << 7).wrapping_add(sum >> 1).wrapping_add(b)
    })
}

/// Whether `b` may start a short name as FAT stores it: upper case, digits and the allowed
/// punctuation.
fn is_short_name_start(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit() || b"!#$%&'()-@^_`{}~".contains(&b)
}

/// Checks a stored checksum against a deleted short name.
///
/// The first byte was overwritten with 0xE5, so each of the 52 bytes a short name can start with is
/// tried. The checksum is a bijection of the first byte, hence 52 of the 256 possible stored values
/// pass: a fragment chain belonging to another entry is still accepted about 20% of the time.
pub fn deleted_checksum_matches(short_name: &[u8; 11], stored: u8) -> bool {
    let mut candidate = *short_name;
    (0x21..=0x7E).filter(|&b| is_short_name_start(b)).any(|first| {
        candidate[0] = first;
        checksum(&candidate) == stored
    })
}

/// Assembles the long name carried by `fragments`, given in ascending sequence order.
///
/// Each fragment contributes up to 13 code units; the name ends at the first 0x0000 or 0xFFFF unit.
/// Code units outside printable ASCII render as the placeholder.
///
/// # Errors
/// - `FATError::BrokenLfnChain` if positions are not 1, 2, .., n with the last flag on n
/// - `FATError::ChecksumMismatch` if a fragment does not belong to `short_name`
pub fn long_name(
    fragments: &[LfnEntry],
    short_name: &[u8; 11],
    deleted: bool,
) -> Result<String, FATError> {
    if fragments.is_empty() {
        return Err(FATError::BrokenLfnChain(String::from("no fragment")));
    }

    // Deleted fragments lost their sequence byte along with the last-fragment flag.
    if !deleted {
        for (i, fragment) in fragments.iter().enumerate() {
            if fragment.position() as usize != i + 1 {
                return Err(FATError::BrokenLfnChain(format!(
                    "fragment {} found at position {}",
                    fragment.position(),
                    i + 1
                )));
            }
            if fragment.is_last() != (i + 1 == fragments.len()) {
                return Err(FATError::BrokenLfnChain(format!(
                    "misplaced last-fragment flag on fragment {}",
                    i + 1
                )));
            }
        }
    }

    let computed = checksum(short_name);
    for fragment in fragments {
        let stored = *fragment.chksum();
        let matches = if deleted {
            deleted_checksum_matches(short_name, stored) && stored == *fragments[0].chksum()
        } else {
            stored == computed
        };
        if !matches {
            return Err(FATError::ChecksumMismatch { stored, computed });
        }
    }

    let name: String = fragments
        .iter()
        .flat_map(|fragment| fragment.units())
        .take_while(|&unit| unit != 0x0000 && unit != 0xFFFF)
        .take(MAX_LFN_LEN)
        .map(printable)
        .collect();

    if name.is_empty() {
        return Err(FATError::BrokenLfnChain(String::from("empty name")));
    }

    Ok(name)
}

/// Picks the name of a short entry: its long name when the fragments check out, the short name
/// otherwise. A rejected chain is logged.
pub fn reconstruct(fragments: &[LfnEntry], entry: &DirEntry) -> FileName {
    if fragments.is_empty() {
        return FileName {
            name: entry.short_name(),
            origin: NameOrigin::Short,
        };
    }

    match long_name(fragments, entry.name(), entry.is_deleted()) {
        Ok(name) => FileName {
            name,
            origin: NameOrigin::Long,
        },
        Err(err) => {
            let name = entry.short_name();
            warn!("Ignoring long name of {name}: {err}");
            FileName {
                name,
                origin: NameOrigin::ShortFallback(err),
            }
        }
    }
}

/// Encodes `name` as long filename fragments owned by `short_name`, in storage order (last fragment
/// first).
///
/// # Errors
/// Returns `FATError::BrokenLfnChain` for an empty name or one longer than 255 code units.
pub fn encode(name: &str, short_name: &[u8; 11]) -> Result<Vec<[u8; DIR_ENTRY_SIZE]>, FATError> {
    let mut units: Vec<u16> = name.encode_utf16().collect();
    if units.is_empty() || units.len() > MAX_LFN_LEN {
        return Err(FATError::BrokenLfnChain(format!(
            "cannot encode a {}-unit name",
            units.len()
        )));
    }

    if units.len() % CHARS_PER_FRAGMENT != 0 {
        units.push(0x0000);
    }
    while units.len() % CHARS_PER_FRAGMENT != 0 {
        units.push(0xFFFF);
    }

    let chksum = checksum(short_name);
    let count = units.len() / CHARS_PER_FRAGMENT;
    let mut fragments = Vec::with_capacity(count);

    for (i, chunk) in units.chunks(CHARS_PER_FRAGMENT).enumerate() {
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        buf[0] = (i + 1) as u8;
        if i + 1 == count {
            buf[0] |= LAST_LONG_ENTRY;
        }
        buf[0x0B] = ATTR_LONG_NAME;
        buf[0x0D] = chksum;

        let mut chars = chunk.iter();
        for (offset, len) in NAME_GROUPS {
            for (slot, unit) in (0..len).zip(chars.by_ref()) {
                let at = offset + slot * 2;
                buf[at..at + 2].copy_from_slice(&unit.to_le_bytes());
            }
        }
        fragments.push(buf);
    }

    fragments.reverse();
    Ok(fragments)
}

/// Builds the 11-byte short name for a "BASE.EXT" string, upper-cased and space padded.
pub fn short_name_bytes(name: &str) -> [u8; 11] {
    let mut out = [b' '; 11];
    let (base, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    for (dst, src) in out[..8].iter_mut().zip(base.bytes()) {
        *dst = src.to_ascii_uppercase();
    }
    for (dst, src) in out[8..].iter_mut().zip(ext.bytes()) {
        *dst = src.to_ascii_uppercase();
    }
    out
}

/// Builds a short entry slot for a regular file.
pub fn short_entry(short_name: &[u8; 11], cluster: u32, size: u32) -> [u8; DIR_ENTRY_SIZE] {
    let mut buf = [0u8; DIR_ENTRY_SIZE];
    buf[..11].copy_from_slice(short_name);
    buf[0x0B] = ATTR_ARCHIVE;
    buf[0x14..0x16].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
    buf[0x1A..0x1C].copy_from_slice(&(cluster as u16).to_le_bytes());
    buf[0x1C..0x20].copy_from_slice(&size.to_le_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::dir_entry::{Deleted, DirSlot};
    use std::collections::HashSet;

    /// Directory slots dumped from a damaged image: two fragments and their short entry.
    const DUMP: [u8; 96] = [
        0x42, 0x50, 0x00, 0x43, 0x00, 0x70, 0x00, 0x2e, 0x00, 0x62, 0x00, 0x0f, 0x89, 0x6d, 0x00,
        0x70, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0x01, 0x30, 0x00, 0x4d, 0x00, 0x31, 0x00, 0x35, 0x00, 0x43, 0x00, 0x0f, 0x89,
        0x77, 0x00, 0x47, 0x00, 0x31, 0x00, 0x79, 0x00, 0x50, 0x00, 0x33, 0x00, 0x00, 0x00, 0x32,
        0x00, 0x55, 0x00, 0x00, 0x30, 0x4d, 0x31, 0x35, 0x43, 0x57, 0x7e, 0x31, 0x42, 0x4d, 0x50,
        0x20, 0x00, 0x64, 0x2b, 0x5a, 0xac, 0x50, 0xac, 0x50, 0x00, 0x00, 0x2b, 0x5a, 0xac, 0x50,
        0x69, 0x15, 0x36, 0x77, 0x07, 0x00,
    ];

    fn lfn(buf: &[u8]) -> LfnEntry {
        match DirSlot::parse(buf) {
            DirSlot::LongName(lfn) | DirSlot::Deleted(Deleted::LongName(lfn)) => lfn,
            other => panic!("not a fragment: {other:?}"),
        }
    }

    fn round_trip(name: &str, short: &str) -> FileName {
        let short_name = short_name_bytes(short);
        let mut fragments: Vec<LfnEntry> = encode(name, &short_name)
            .unwrap()
            .iter()
            .map(|buf| lfn(buf))
            .collect();
        fragments.reverse();
        let entry = DirEntry::from_slice(&short_entry(&short_name, 5, 100)).unwrap();
        reconstruct(&fragments, &entry)
    }

    #[test]
    fn checksum_of_dump_entry() {
        assert_eq!(checksum(b"0M15CW~1BMP"), 0x89);
    }

    #[test]
    fn checksum_is_order_sensitive() {
        let name = *b"0M15CW~1BMP";
        let mut swapped = name;
        swapped.swap(0, 1);
        assert_ne!(checksum(&name), checksum(&swapped));
        assert_eq!(checksum(&name), checksum(&name));
    }

    #[test]
    fn reconstructs_dump() {
        let mut fragments = vec![lfn(&DUMP[0..32]), lfn(&DUMP[32..64])];
        fragments.reverse();
        let entry = DirEntry::from_slice(&DUMP[64..96]).unwrap();

        let name = reconstruct(&fragments, &entry);
        assert!(matches!(name.origin, NameOrigin::Long));
        assert_eq!(name.name, "0M15CwG1yP32UPCp.bmp");
    }

    #[test]
    fn round_trips_printable_names() {
        let long = "a".repeat(MAX_LFN_LEN);
        for name in ["x.bmp", "exactly13char", "holiday-photo_2024 (copy).bmp", long.as_str()] {
            let rebuilt = round_trip(name, "NAME~1.BMP");
            assert!(matches!(rebuilt.origin, NameOrigin::Long), "{name}");
            assert_eq!(rebuilt.name, name);
        }
    }

    #[test]
    fn checksum_mismatch_falls_back_to_short_name() {
        let fragments: Vec<LfnEntry> = encode("long name.bmp", &short_name_bytes("OTHER.BMP"))
            .unwrap()
            .iter()
            .rev()
            .map(|buf| lfn(buf))
            .collect();
        let entry = DirEntry::from_slice(&short_entry(&short_name_bytes("A.BMP"), 5, 100)).unwrap();

        let name = reconstruct(&fragments, &entry);
        assert_eq!(name.name, "A.BMP");
        assert!(matches!(
            name.origin,
            NameOrigin::ShortFallback(FATError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn out_of_order_fragments_are_rejected() {
        let short_name = short_name_bytes("LONGNA~1.BMP");
        let fragments: Vec<LfnEntry> = encode("a rather long file name.bmp", &short_name)
            .unwrap()
            .iter()
            .map(|buf| lfn(buf))
            .collect();

        // Storage order, i.e. not reversed.
        assert!(matches!(
            long_name(&fragments, &short_name, false),
            Err(FATError::BrokenLfnChain(_))
        ));
    }

    #[test]
    fn deleted_chain_is_checked_against_every_first_byte() {
        let short_name = short_name_bytes("PHOTO~1.BMP");
        let mut slots = encode("Photo of a cat.bmp", &short_name).unwrap();
        for slot in slots.iter_mut() {
            slot[0] = 0xE5;
        }
        let fragments: Vec<LfnEntry> = slots.iter().rev().map(|buf| lfn(buf)).collect();

        let mut deleted = short_name;
        deleted[0] = 0xE5;
        assert_eq!(
            long_name(&fragments, &deleted, true).unwrap(),
            "Photo of a cat.bmp"
        );
    }

    #[test]
    fn deleted_checksum_only_tries_short_name_starts() {
        let mut name = short_name_bytes("PHOTO~1.BMP");
        let accepted: HashSet<u8> = (0..=255u8)
            .filter(|&stored| deleted_checksum_matches(&name, stored))
            .collect();
        assert_eq!(accepted.len(), 52);
        assert!(accepted.contains(&checksum(&name)));

        // Lower case and space never start a stored short name.
        name[0] = b'p';
        assert!(!accepted.contains(&checksum(&name)));
        name[0] = b' ';
        assert!(!accepted.contains(&checksum(&name)));
    }

    #[test]
    fn non_ascii_units_render_as_placeholder() {
        let rebuilt = round_trip("café.bmp", "CAFE~1.BMP");
        assert_eq!(rebuilt.name, "caf_.bmp");
    }

    #[test]
    fn encode_rejects_oversized_names() {
        let name = "b".repeat(MAX_LFN_LEN + 1);
        assert!(encode(&name, &short_name_bytes("B.BMP")).is_err());
    }
}
