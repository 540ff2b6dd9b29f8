//! Files the recovery tries to rebuild, and the state each one ends up in.

use getset::Getters;
use std::fmt;

use super::recovery_error::RecoveryError;
use crate::filesystem::lfn::{FileName, NameOrigin};

/// Where a candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A live short entry.
    Live,
    /// A short entry carrying the 0xE5 marker.
    Deleted,
    /// A BMP header no directory entry points to.
    Carved,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Source::Live => "live",
            Source::Deleted => "deleted",
            Source::Carved => "carved",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
pub enum Status {
    Unresolved,
    Resolved,
    Failed(RecoveryError),
}

/// A BMP file to recover.
#[derive(Debug, Getters)]
pub struct RecoveredFile {
    #[get = "pub"]
    filename: String,
    #[get = "pub"]
    origin: NameOrigin,
    #[get = "pub"]
    source: Source,
    #[get = "pub"]
    start_cluster: u32,
    /// Size taken from the directory entry, or from the BMP header for carved files
    #[get = "pub"]
    declared_size: u32,
    /// Clusters holding the data, in file order
    #[get = "pub"]
    sequence: Vec<u32>,
    #[get = "pub"]
    status: Status,
    /// Part of the sequence was guessed rather than confirmed by the classifier
    #[get = "pub"]
    best_effort: bool,
    /// Lower-case hex SHA-1 of the recovered bytes
    #[get = "pub"]
    checksum: Option<String>,
    /// Name used when writing the file to an output directory
    #[get = "pub"]
    output_name: String,
}

impl RecoveredFile {
    /// Creates a candidate from a directory entry.
    pub fn from_entry(name: FileName, source: Source, start_cluster: u32, declared_size: u32) -> Self {
        Self {
            output_name: name.name.clone(),
            filename: name.name,
            origin: name.origin,
            source,
            start_cluster,
            declared_size,
            sequence: vec![],
            status: Status::Unresolved,
            best_effort: false,
            checksum: None,
        }
    }

    /// Creates a candidate for a header found by the sweep. `name` is the root directory name
    /// recorded for the cluster, if any.
    pub fn carved(start_cluster: u32, declared_size: u32, name: Option<String>) -> Self {
        let (filename, origin) = match name {
            Some(name) => (name, NameOrigin::Short),
            None => (generated_name(start_cluster), NameOrigin::Short),
        };

        Self {
            output_name: filename.clone(),
            filename,
            origin,
            source: Source::Carved,
            start_cluster,
            declared_size,
            sequence: vec![],
            status: Status::Unresolved,
            best_effort: false,
            checksum: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.status, Status::Resolved)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, Status::Failed(_))
    }

    pub fn set_output_name(&mut self, name: String) {
        self.output_name = name;
    }

    /// Records a successful resolution.
    pub fn resolve(&mut self, sequence: Vec<u32>, best_effort: bool, checksum: String) {
        self.sequence = sequence;
        self.best_effort = best_effort;
        self.checksum = Some(checksum);
        self.status = Status::Resolved;
    }

    /// Marks the candidate failed. Nothing of it is reported.
    pub fn fail(&mut self, err: RecoveryError) {
        self.sequence.clear();
        self.checksum = None;
        self.status = Status::Failed(err);
    }
}

/// Name given to a carved file without a recorded name.
pub fn generated_name(cluster: u32) -> String {
    format!("recovered_bmp_{cluster}.bmp")
}

/// Report line: `<sha1>  <filename>`, the format `sha1sum` prints.
impl fmt::Display for RecoveredFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.checksum) {
            (Status::Resolved, Some(checksum)) => write!(f, "{}  {}", checksum, self.filename),
            (Status::Failed(err), _) => write!(f, "{}: {}", self.filename, err),
            _ => write!(f, "{}: unresolved", self.filename),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> RecoveredFile {
        RecoveredFile::from_entry(
            FileName {
                name: String::from("A.BMP"),
                origin: NameOrigin::Short,
            },
            Source::Live,
            10,
            512,
        )
    }

    #[test]
    fn report_line_uses_two_spaces() {
        let mut file = candidate();
        file.resolve(vec![10], false, "a".repeat(40));
        assert_eq!(file.to_string(), format!("{}  A.BMP", "a".repeat(40)));
        assert!(file.is_resolved());
    }

    #[test]
    fn failure_drops_the_checksum() {
        let mut file = candidate();
        file.resolve(vec![10], false, "a".repeat(40));
        file.fail(RecoveryError::EmptyFile(10));
        assert!(file.is_failed());
        assert!(file.checksum().is_none());
        assert!(file.sequence().is_empty());
    }

    #[test]
    fn carved_names() {
        assert_eq!(RecoveredFile::carved(42, 100, None).filename(), "recovered_bmp_42.bmp");
        assert_eq!(
            RecoveredFile::carved(42, 100, Some(String::from("PIC.BMP"))).filename(),
            "PIC.BMP"
        );
        assert_eq!(*RecoveredFile::carved(42, 100, None).source(), Source::Carved);
    }
}
