//! Whole-image cluster classification.
//!
//! Every data cluster is classified on its own content, without trusting the FAT. The result is an
//! owned map sized when the image is opened and handed by reference to the rest of the recovery.

use log::{debug, info};
use rayon::prelude::*;
use std::fmt;

use super::bmp;
use crate::filesystem::dir_entry::{DIR_ENTRY_SIZE, DirSlot};
use crate::filesystem::fat::FATVol;

/// What a cluster appears to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterKind {
    BmpHeader,
    Directory,
    BmpData,
    Unused,
}

/// Counts the plausible slots of a cluster read as a directory.
///
/// Returns `(plausible, examined)`; examination stops at the first free slot, which ends the directory.
pub fn directory_score(cluster: &[u8], max_cluster: u32) -> (usize, usize) {
    cluster
        .chunks_exact(DIR_ENTRY_SIZE)
        .map(DirSlot::parse)
        .take_while(|slot| !matches!(slot, DirSlot::Free))
        .fold((0, 0), |(plausible, examined), slot| {
            let ok = slot.is_plausible(max_cluster) as usize;
            (plausible + ok, examined + 1)
        })
}

/// Statistical directory test: more plausible slots than implausible ones, and at least one.
pub fn is_directory(cluster: &[u8], max_cluster: u32) -> bool {
    let (k, n) = directory_score(cluster, max_cluster);
    k > 0 && k > n - k
}

/// Classifies a single cluster. Header evidence wins over directory evidence, which wins over the
/// pixel heuristic.
pub fn classify(cluster: &[u8], max_cluster: u32, strict_header: bool) -> ClusterKind {
    if bmp::is_header(cluster, strict_header) {
        ClusterKind::BmpHeader
    } else if is_directory(cluster, max_cluster) {
        ClusterKind::Directory
    } else if bmp::looks_like_pixels(cluster) {
        ClusterKind::BmpData
    } else {
        ClusterKind::Unused
    }
}

/// Classification of every data cluster of an image.
#[derive(Debug, Clone)]
pub struct ClusterMap {
    kinds: Vec<ClusterKind>,
}

impl ClusterMap {
    /// Classifies every cluster of `vol` in parallel on the current rayon pool.
    pub fn sweep(vol: &FATVol, strict_header: bool) -> ClusterMap {
        let max_cluster = vol.clusters().end;
        let kinds: Vec<ClusterKind> = vol
            .clusters()
            .into_par_iter()
            .map(|c| match vol.read_cluster(c) {
                Ok(buf) => classify(buf, max_cluster, strict_header),
                Err(err) => {
                    debug!("Skipping cluster {c}: {err}");
                    ClusterKind::Unused
                }
            })
            .collect();

        let map = ClusterMap { kinds };
        info!("Classified {} clusters: {}", map.len(), map);
        map
    }

    pub fn from_kinds(kinds: Vec<ClusterKind>) -> ClusterMap {
        ClusterMap { kinds }
    }

    /// Number of classified clusters.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Kind of `cluster`, `None` outside the data area.
    pub fn get(&self, cluster: u32) -> Option<ClusterKind> {
        cluster
            .checked_sub(2)
            .and_then(|i| self.kinds.get(i as usize))
            .copied()
    }

    pub fn is(&self, cluster: u32, kind: ClusterKind) -> bool {
        self.get(cluster) == Some(kind)
    }

    /// Clusters of the given kind, in increasing order.
    pub fn clusters_of(&self, kind: ClusterKind) -> impl Iterator<Item = u32> + '_ {
        self.kinds
            .iter()
            .enumerate()
            .filter(move |(_, k)| **k == kind)
            .map(|(i, _)| i as u32 + 2)
    }

    fn count(&self, kind: ClusterKind) -> usize {
        self.kinds.iter().filter(|k| **k == kind).count()
    }
}

impl fmt::Display for ClusterMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} BMP headers, {} directories, {} BMP data, {} unused",
            self.count(ClusterKind::BmpHeader),
            self.count(ClusterKind::Directory),
            self.count(ClusterKind::BmpData),
            self.count(ClusterKind::Unused)
        )
    }
}
