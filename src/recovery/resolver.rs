//! Resolution of the clusters holding a file.
//!
//! Clusters are assumed contiguous. When the next cluster does not look like pixel data, a bounded
//! window after the last confirmed cluster is searched; when that fails too, the remaining clusters are
//! guessed contiguously and the result is flagged best-effort.

use log::{debug, warn};

use super::classifier::{ClusterKind, ClusterMap};
use super::recovery_error::RecoveryError;
use crate::filesystem::fat::FATVol;

/// Default size of the forward search window, in clusters.
pub const DEFAULT_LOOKAHEAD: u32 = 100;

/// Bytes and clusters of a resolved file.
#[derive(Debug)]
pub struct Resolution {
    pub sequence: Vec<u32>,
    pub data: Vec<u8>,
    pub best_effort: bool,
}

/// Resolves files against a mapped image and its cluster classification.
pub struct Resolver<'a> {
    vol: &'a FATVol,
    map: &'a ClusterMap,
    lookahead: u32,
}

impl<'a> Resolver<'a> {
    pub fn new(vol: &'a FATVol, map: &'a ClusterMap, lookahead: u32) -> Self {
        Self {
            vol,
            map,
            lookahead,
        }
    }

    /// Resolves the file of `declared` bytes starting at `start` and copies its content.
    ///
    /// # Errors
    /// - `RecoveryError::EmptyFile` if `declared` is 0
    /// - `RecoveryError::MissingHeader` if `start` is not classified as a BMP header
    /// - `RecoveryError::AllocationFailure` if the output buffer cannot be allocated
    /// - `RecoveryError::OutOfRange` if a resolved cluster lies past the image; nothing is read then
    /// - `RecoveryError::ResolutionIncomplete` if fewer than `declared` bytes were copied
    pub fn resolve(&self, start: u32, declared: u32) -> Result<Resolution, RecoveryError> {
        if declared == 0 {
            return Err(RecoveryError::EmptyFile(start));
        }
        if !self.map.is(start, ClusterKind::BmpHeader) {
            return Err(RecoveryError::MissingHeader(start));
        }

        let cluster_size = self.vol.cluster_size() as usize;
        let needed = (declared as usize).div_ceil(cluster_size);
        let (sequence, best_effort) = self.chain(start, needed)?;

        // Check every cluster before copying anything.
        let clusters = sequence
            .iter()
            .map(|&c| self.vol.read_cluster(c))
            .collect::<Result<Vec<_>, _>>()?;

        let mut data = Vec::new();
        data.try_reserve_exact(declared as usize)
            .map_err(|_| RecoveryError::AllocationFailure(declared as usize))?;

        for cluster in clusters {
            let take = cluster.len().min(declared as usize - data.len());
            data.extend_from_slice(&cluster[..take]);
        }

        if data.len() != declared as usize {
            return Err(RecoveryError::ResolutionIncomplete {
                declared,
                accounted: data.len() as u64,
            });
        }

        Ok(Resolution {
            sequence,
            data,
            best_effort,
        })
    }

    /// Picks the `needed` clusters of the file starting at `start`.
    fn chain(&self, start: u32, needed: usize) -> Result<(Vec<u32>, bool), RecoveryError> {
        let mut sequence = Vec::new();
        sequence
            .try_reserve_exact(needed)
            .map_err(|_| RecoveryError::AllocationFailure(needed * size_of::<u32>()))?;
        sequence.push(start);

        let mut last = start;
        let mut guessing = false;

        while sequence.len() < needed {
            let contiguous = last.saturating_add(1);
            let next = if guessing || self.map.is(contiguous, ClusterKind::BmpData) {
                contiguous
            } else if let Some(found) = self.search(last) {
                debug!("File at {start}: cluster {contiguous} skipped, continuing at {found}");
                found
            } else {
                warn!(
                    "File at {start}: no pixel data within {} clusters of {last}, guessing the remaining {} clusters",
                    self.lookahead,
                    needed - sequence.len()
                );
                guessing = true;
                contiguous
            };

            sequence.push(next);
            last = next;
        }

        Ok((sequence, guessing))
    }

    /// First cluster classified as pixel data within the window following `last`.
    fn search(&self, last: u32) -> Option<u32> {
        (1..=self.lookahead)
            .filter_map(|offset| last.checked_add(offset))
            .find(|&c| self.map.is(c, ClusterKind::BmpData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::lab_image::{Geometry, LabImage};
    use crate::recovery::bmp;
    use ClusterKind::*;
    use tempfile::TempDir;

    /// Image of 64 data clusters (2..66), with `data` written at cluster 10.
    fn volume(data: &[u8]) -> (TempDir, FATVol) {
        // 32 reserved sectors, two one-sector FATs, 64 data sectors.
        let mut image = LabImage::new(Geometry::small(98));
        image.write_data(10, data).unwrap();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fs.img");
        image.write_to(&path).unwrap();
        let vol = FATVol::from_file(&path, false).unwrap();
        assert_eq!(vol.clusters(), 2..66);
        (tmp, vol)
    }

    fn map(overrides: &[(u32, ClusterKind)]) -> ClusterMap {
        let mut kinds = vec![Unused; 64];
        for &(c, kind) in overrides {
            kinds[c as usize - 2] = kind;
        }
        ClusterMap::from_kinds(kinds)
    }

    #[test]
    fn single_cluster_file() {
        let image = bmp::gradient(8, 8, 0);
        let (_tmp, vol) = volume(&image);

        let map = map(&[(10, BmpHeader)]);
        let resolver = Resolver::new(&vol, &map, DEFAULT_LOOKAHEAD);

        let small = resolver.resolve(10, 100).unwrap();
        assert_eq!(small.sequence, vec![10]);
        assert_eq!(small.data, image[..100]);

        let full = resolver.resolve(10, 512).unwrap();
        assert_eq!(full.sequence, vec![10]);
        assert_eq!(full.data.len(), 512);
        assert!(!full.best_effort);
    }

    #[test]
    fn contiguous_file() {
        let image = bmp::gradient(32, 16, 1);
        let (_tmp, vol) = volume(&image);

        let map = map(&[(10, BmpHeader), (11, BmpData), (12, BmpData), (13, BmpData)]);
        let res = Resolver::new(&vol, &map, DEFAULT_LOOKAHEAD)
            .resolve(10, image.len() as u32)
            .unwrap();

        assert_eq!(res.sequence, vec![10, 11, 12, 13]);
        assert_eq!(res.data, image);
    }

    #[test]
    fn skips_foreign_clusters() {
        let (_tmp, vol) = volume(&bmp::gradient(8, 8, 0));
        let map = map(&[(10, BmpHeader), (11, Directory), (12, Unused), (13, BmpData), (14, BmpData)]);

        let res = Resolver::new(&vol, &map, DEFAULT_LOOKAHEAD).resolve(10, 1536).unwrap();
        assert_eq!(res.sequence, vec![10, 13, 14]);
        assert!(!res.best_effort);
    }

    #[test]
    fn guesses_when_window_is_empty() {
        let (_tmp, vol) = volume(&bmp::gradient(8, 8, 0));
        let map = map(&[(10, BmpHeader), (20, BmpData)]);

        let res = Resolver::new(&vol, &map, 5).resolve(10, 1536).unwrap();
        assert_eq!(res.sequence, vec![10, 11, 12]);
        assert!(res.best_effort);
    }

    #[test]
    fn rejects_out_of_range_before_reading() {
        let (_tmp, vol) = volume(&bmp::gradient(8, 8, 0));
        let map = map(&[(64, BmpHeader), (65, BmpData)]);

        let err = Resolver::new(&vol, &map, DEFAULT_LOOKAHEAD)
            .resolve(64, 512 * 3)
            .unwrap_err();
        assert!(matches!(err, RecoveryError::OutOfRange { cluster: 66, .. }));
    }

    #[test]
    fn rejects_empty_and_headerless() {
        let (_tmp, vol) = volume(&bmp::gradient(8, 8, 0));
        let map = map(&[(10, BmpHeader), (11, BmpData)]);
        let resolver = Resolver::new(&vol, &map, DEFAULT_LOOKAHEAD);

        assert!(matches!(resolver.resolve(10, 0), Err(RecoveryError::EmptyFile(10))));
        assert!(matches!(resolver.resolve(11, 10), Err(RecoveryError::MissingHeader(11))));
    }

    #[test]
    fn huge_declared_size_is_contained() {
        let (_tmp, vol) = volume(&bmp::gradient(8, 8, 0));
        let map = map(&[(10, BmpHeader)]);

        let err = Resolver::new(&vol, &map, DEFAULT_LOOKAHEAD)
            .resolve(10, u32::MAX)
            .unwrap_err();
        assert!(!err.is_fatal());
    }
}
