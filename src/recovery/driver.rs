//! Recovery run: open the image, classify clusters, collect candidates, resolve them.
//!
//! Candidates come from two places. Every cluster the sweep classified as a directory is walked for
//! `.bmp` entries, live or deleted; every BMP header left unclaimed afterwards is carved under the
//! name the root directory recorded for it, or a generated one. Resolution runs on a bounded rayon
//! pool and a failing candidate never affects its siblings.

use log::{debug, info, warn};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use super::bmp::BmpHeader;
use super::candidate::{RecoveredFile, Source, generated_name};
use super::classifier::{ClusterKind, ClusterMap};
use super::recovery_error::RecoveryError;
use super::resolver::{Resolution, Resolver};
use crate::config::RecoveryConfig;
use crate::filesystem::dir_entry::{
    DIR_ENTRY_SIZE, Deleted, DirEntry, DirSlot, EntryKind, LfnEntry,
};
use crate::filesystem::fat::FATVol;
use crate::filesystem::lfn;
use crate::utils::{sanitize_file_name, sha1_hex};

/// Outcome of a recovery run, in candidate order.
#[derive(Debug)]
pub struct RecoveryReport {
    pub files: Vec<RecoveredFile>,
}

impl RecoveryReport {
    pub fn recovered(&self) -> impl Iterator<Item = &RecoveredFile> {
        self.files.iter().filter(|f| f.is_resolved())
    }

    pub fn failed(&self) -> impl Iterator<Item = &RecoveredFile> {
        self.files.iter().filter(|f| f.is_failed())
    }
}

/// A recovery over one mapped image. The mapping is released when the value is dropped.
pub struct Recovery {
    vol: FATVol,
    config: RecoveryConfig,
}

impl Recovery {
    /// Opens and checks the image.
    ///
    /// # Errors
    /// `RecoveryError::InvalidImage` for any problem with the file or its boot sector.
    pub fn open(path: &Path, config: RecoveryConfig) -> Result<Recovery, RecoveryError> {
        let vol = FATVol::from_file(path, config.validate).map_err(RecoveryError::open)?;
        Ok(Self { vol, config })
    }

    pub fn vol(&self) -> &FATVol {
        &self.vol
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Runs the whole recovery. When `output` is given, every recovered file is written into it.
    ///
    /// # Errors
    /// Only fatal errors are returned; per-candidate failures are recorded in the report.
    pub fn run(&self, output: Option<&Path>) -> Result<RecoveryReport, RecoveryError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.worker_count())
            .build()?;

        let root_names = self.root_names();
        let map = pool.install(|| ClusterMap::sweep(&self.vol, self.config.strict_bmp_header));

        let mut files = self.entry_candidates(&map);
        let carved = self.carved_candidates(&map, &files, &root_names);
        info!(
            "{} candidates from directory entries, {} carved",
            files.len(),
            carved.len()
        );
        files.extend(carved);
        assign_output_names(&mut files);

        if let Some(dir) = output {
            fs::create_dir_all(dir)?;
        }

        let resolver = Resolver::new(&self.vol, &map, self.config.lookahead);
        pool.install(|| {
            files
                .par_iter_mut()
                .for_each(|file| process(file, output, |start, size| resolver.resolve(start, size)));
        });

        let report = RecoveryReport { files };
        info!(
            "Recovered {} files, {} failed",
            report.recovered().count(),
            report.failed().count()
        );
        Ok(report)
    }

    /// Records `cluster -> short name` for the files of the first root directory cluster.
    ///
    /// Subdirectories are not visited.
    pub fn root_names(&self) -> HashMap<u32, String> {
        let root = match self.vol.root_dir_cluster() {
            Ok(root) => root,
            Err(err) => {
                warn!("Cannot read the root directory: {err}");
                return HashMap::new();
            }
        };

        root.chunks_exact(DIR_ENTRY_SIZE)
            .map(DirSlot::parse)
            .take_while(|slot| !matches!(slot, DirSlot::Free))
            .filter_map(|slot| match slot {
                DirSlot::Short {
                    entry,
                    kind: EntryKind::File,
                }
                | DirSlot::Deleted(Deleted::Short(entry))
                    if entry.cluster_number() >= 2 =>
                {
                    Some((entry.cluster_number(), entry.short_name()))
                }
                _ => None,
            })
            .collect()
    }

    /// Walks every directory cluster for `.bmp` entries whose first cluster holds a BMP header.
    ///
    /// A start cluster named by several entries is kept once, preferring a live entry.
    pub fn entry_candidates(&self, map: &ClusterMap) -> Vec<RecoveredFile> {
        let mut files: Vec<RecoveredFile> = vec![];
        let mut by_cluster: HashMap<u32, usize> = HashMap::new();

        for dir in map.clusters_of(ClusterKind::Directory) {
            let buf = match self.vol.read_cluster(dir) {
                Ok(buf) => buf,
                Err(err) => {
                    debug!("Skipping directory cluster {dir}: {err}");
                    continue;
                }
            };

            for (entry, fragments, source) in directory_files(buf) {
                let start = entry.cluster_number();
                if !is_bmp(&entry, &fragments) || *entry.file_size() == 0 {
                    continue;
                }
                if !map.is(start, ClusterKind::BmpHeader) {
                    debug!("{entry} in cluster {dir}: cluster {start} holds no BMP header");
                    continue;
                }

                let name = lfn::reconstruct(&fragments, &entry);
                let candidate = RecoveredFile::from_entry(name, source, start, *entry.file_size());

                match by_cluster.get(&start) {
                    Some(&i) if *files[i].source() != Source::Live && source == Source::Live => {
                        debug!("Cluster {start}: {} replaces {}", candidate.filename(), files[i].filename());
                        files[i] = candidate;
                    }
                    Some(_) => {}
                    None => {
                        by_cluster.insert(start, files.len());
                        files.push(candidate);
                    }
                }
            }
        }

        files
    }

    /// Synthesises candidates for headers no entry claimed, sized from the header itself.
    pub fn carved_candidates(
        &self,
        map: &ClusterMap,
        claimed: &[RecoveredFile],
        root_names: &HashMap<u32, String>,
    ) -> Vec<RecoveredFile> {
        let claimed: HashSet<u32> = claimed.iter().map(|f| *f.start_cluster()).collect();

        map.clusters_of(ClusterKind::BmpHeader)
            .filter(|c| !claimed.contains(c))
            .filter_map(|c| {
                let header = self
                    .vol
                    .read_cluster(c)
                    .ok()
                    .and_then(|buf| BmpHeader::from_slice(buf).ok());
                let size = match header {
                    Some(header) => *header.file_size(),
                    None => {
                        debug!("Cluster {c}: undecodable BMP header");
                        return None;
                    }
                };

                if size == 0 || size > self.config.max_carved_size {
                    debug!("Cluster {c}: ignoring header declaring {size} bytes");
                    return None;
                }

                Some(RecoveredFile::carved(c, size, root_names.get(&c).cloned()))
            })
            .collect()
    }
}

/// Files named in a directory cluster, with the long name fragments preceding each one in ascending
/// order. Walking stops at the first free slot.
fn directory_files(buf: &[u8]) -> Vec<(DirEntry, Vec<LfnEntry>, Source)> {
    let mut files = vec![];
    // Fragments in storage order, and whether they were deleted.
    let mut pending: Vec<LfnEntry> = vec![];
    let mut pending_deleted = false;

    for slot in buf.chunks_exact(DIR_ENTRY_SIZE).map(DirSlot::parse) {
        match slot {
            DirSlot::Free => break,
            DirSlot::LongName(fragment) => {
                if fragment.is_last() || pending_deleted {
                    pending.clear();
                }
                pending_deleted = false;
                pending.push(fragment);
            }
            DirSlot::Deleted(Deleted::LongName(fragment)) => {
                if !pending_deleted {
                    pending.clear();
                }
                pending_deleted = true;
                pending.push(fragment);
            }
            DirSlot::Short {
                entry,
                kind: EntryKind::File,
            } => {
                let fragments = take_fragments(&mut pending, pending_deleted, false);
                files.push((entry, fragments, Source::Live));
            }
            DirSlot::Deleted(Deleted::Short(entry)) => {
                let fragments = take_fragments(&mut pending, pending_deleted, true);
                if !entry.is_dir() {
                    files.push((entry, fragments, Source::Deleted));
                }
            }
            _ => pending.clear(),
        }
    }

    files
}

/// Hands over the pending fragments in ascending order when they match the deletion state of the
/// short entry that follows them.
fn take_fragments(pending: &mut Vec<LfnEntry>, pending_deleted: bool, deleted: bool) -> Vec<LfnEntry> {
    let mut fragments = std::mem::take(pending);
    if pending_deleted != deleted {
        fragments.clear();
    }
    fragments.reverse();
    fragments
}

/// `.bmp` by short extension or by long name, case-insensitive.
fn is_bmp(entry: &DirEntry, fragments: &[LfnEntry]) -> bool {
    if entry.extension().eq_ignore_ascii_case(b"BMP") {
        return true;
    }
    lfn::long_name(fragments, entry.name(), entry.is_deleted())
        .map(|name| name.to_ascii_lowercase().ends_with(".bmp"))
        .unwrap_or(false)
}

/// Gives every candidate a file-system-safe, unique output name.
fn assign_output_names(files: &mut [RecoveredFile]) {
    let mut seen = HashSet::new();
    for file in files.iter_mut() {
        let cluster = *file.start_cluster();
        let mut name = sanitize_file_name(file.filename(), &generated_name(cluster));
        if !seen.insert(name.to_ascii_lowercase()) {
            name = format!("{cluster}_{name}");
            seen.insert(name.to_ascii_lowercase());
        }
        file.set_output_name(name);
    }
}

/// Resolves one candidate with `resolve`, hashes it and writes it out. Failures, panics included,
/// stay with the candidate.
fn process<F>(file: &mut RecoveredFile, output: Option<&Path>, resolve: F)
where
    F: Fn(u32, u32) -> Result<Resolution, RecoveryError>,
{
    let start = *file.start_cluster();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| resolve(start, *file.declared_size())));

    let resolution = match outcome {
        Ok(Ok(resolution)) => resolution,
        Ok(Err(err)) => {
            warn!("{} (cluster {start}): {err}", file.filename());
            file.fail(err);
            return;
        }
        Err(_) => {
            warn!("{} (cluster {start}): worker panicked", file.filename());
            file.fail(RecoveryError::WorkerPanic(start));
            return;
        }
    };

    if let Some(dir) = output {
        if let Err(err) = fs::write(dir.join(file.output_name()), &resolution.data) {
            warn!("{}: {err}", file.output_name());
            file.fail(err.into());
            return;
        }
    }

    let checksum = sha1_hex(&resolution.data);
    debug!(
        "{}: clusters {:?}{}",
        file.filename(),
        resolution.sequence,
        if resolution.best_effort { " (best effort)" } else { "" }
    );
    file.resolve(resolution.sequence, resolution.best_effort, checksum);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::lfn::short_entry;
    use crate::recovery::candidate::Status;

    fn slots(slots: &[[u8; 32]]) -> Vec<u8> {
        let mut buf = vec![0u8; 512];
        for (i, slot) in slots.iter().enumerate() {
            buf[i * 32..(i + 1) * 32].copy_from_slice(slot);
        }
        buf
    }

    #[test]
    fn pairs_fragments_with_their_entry() {
        let short = lfn::short_name_bytes("HOLIDA~1.BMP");
        let mut all = lfn::encode("holiday.bmp", &short).unwrap();
        all.push(short_entry(&short, 10, 600));
        all.push(short_entry(&lfn::short_name_bytes("B.TXT"), 20, 10));

        let files = directory_files(&slots(&all));
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].1.len(), 1);
        assert_eq!(files[0].2, Source::Live);
        assert!(files[1].1.is_empty());
        assert!(is_bmp(&files[0].0, &files[0].1));
        assert!(!is_bmp(&files[1].0, &files[1].1));
    }

    #[test]
    fn long_name_decides_extension() {
        let short = lfn::short_name_bytes("PICTUR~1.IMG");
        let mut all = lfn::encode("picture.BMP", &short).unwrap();
        all.push(short_entry(&short, 10, 600));

        let files = directory_files(&slots(&all));
        assert!(is_bmp(&files[0].0, &files[0].1));
    }

    #[test]
    fn deleted_fragments_follow_deleted_entry() {
        let short = lfn::short_name_bytes("HOLIDA~1.BMP");
        let mut all = lfn::encode("holiday.bmp", &short).unwrap();
        all.push(short_entry(&short, 10, 600));
        for slot in all.iter_mut() {
            slot[0] = 0xE5;
        }

        let files = directory_files(&slots(&all));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].2, Source::Deleted);
        assert_eq!(lfn::reconstruct(&files[0].1, &files[0].0).name, "holiday.bmp");
    }

    #[test]
    fn walk_stops_at_free_slot() {
        let a = short_entry(&lfn::short_name_bytes("A.BMP"), 10, 600);
        let mut buf = slots(&[a]);
        buf[64..96].copy_from_slice(&short_entry(&lfn::short_name_bytes("B.BMP"), 11, 600));
        assert_eq!(directory_files(&buf).len(), 1);
    }

    #[test]
    fn output_names_are_unique_and_safe() {
        let mut files = vec![
            RecoveredFile::carved(5, 10, Some(String::from("_.BMP"))),
            RecoveredFile::carved(9, 10, Some(String::from("_.BMP"))),
            RecoveredFile::carved(12, 10, Some(String::from("../x.bmp"))),
        ];
        assign_output_names(&mut files);
        assert_eq!(files[0].output_name(), "_.BMP");
        assert_eq!(files[1].output_name(), "9__.BMP");
        assert_eq!(files[2].output_name(), ".._x.bmp");
    }

    #[test]
    fn panicking_resolution_fails_only_its_file() {
        let mut files = vec![
            RecoveredFile::carved(5, 10, None),
            RecoveredFile::carved(9, 10, None),
        ];

        files.par_iter_mut().for_each(|file| {
            process(file, None, |start, size| {
                if start == 5 {
                    panic!("corrupt cluster {start}");
                }
                Ok(Resolution {
                    sequence: vec![start],
                    data: vec![0xAB; size as usize],
                    best_effort: false,
                })
            })
        });

        assert!(matches!(
            files[0].status(),
            Status::Failed(RecoveryError::WorkerPanic(5))
        ));
        assert!(files[1].is_resolved());
        assert_eq!(files[1].sequence(), &vec![9]);
        assert_eq!(
            files[1].checksum().as_deref(),
            Some(sha1_hex(&[0xAB; 10]).as_str())
        );
    }
}
