//! File-based report store.
//!
//! Layout: `<root>/<protocol>/<checkpoint:08>_<participant>_<protocol>.json`.
//! The zero-padded checkpoint prefix makes file-name order equal interval
//! order; fragments sharing a checkpoint are merged into one report on read.

use std::fs;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::vec::IntoIter;

use tracing::{debug, info};
use vizpub_core::Report;

use crate::error::IngestError;
use crate::types::{ParticipantId, ReportFragment};

/// A report file found in a protocol directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentFile {
    pub path: PathBuf,
    pub checkpoint: u64,
    pub participant: ParticipantId,
}

/// Report files on disk, one directory per protocol.
#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn protocol_dir(&self, protocol: &str) -> PathBuf {
        self.root.join(protocol)
    }

    /// Path of one participant's fragment at one checkpoint.
    pub fn fragment_path(&self, protocol: &str, participant: &ParticipantId, checkpoint: u64) -> PathBuf {
        self.protocol_dir(protocol)
            .join(format!("{:08}_{}_{}.json", checkpoint, participant, protocol))
    }

    /// Writes a fragment (write to temp, then rename).
    pub fn write_fragment(&self, fragment: &ReportFragment, checkpoint: u64) -> Result<PathBuf, IngestError> {
        let protocol = fragment.protocol_name()?;
        let path = self.fragment_path(protocol, &fragment.participant, checkpoint);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| IngestError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(&fragment.report).map_err(|e| IngestError::parse(&path, e))?;
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, json).map_err(|e| IngestError::io(&temp_path, e))?;
        fs::rename(&temp_path, &path).map_err(|e| IngestError::io(&path, e))?;

        debug!("Stored {}", path.display());
        Ok(path)
    }

    /// Lists a protocol's report files in checkpoint order.
    ///
    /// Files not following the naming scheme are skipped. A missing or empty
    /// directory is an error.
    pub fn list(&self, protocol: &str) -> Result<Vec<FragmentFile>, IngestError> {
        let dir = self.protocol_dir(protocol);
        let empty = || IngestError::EmptyStore {
            protocol: protocol.to_string(),
            root: self.root.display().to_string(),
        };
        if !dir.is_dir() {
            return Err(empty());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| IngestError::io(&dir, e))? {
            let path = entry.map_err(|e| IngestError::io(&dir, e))?.path();
            match parse_file_name(&path, protocol) {
                Some((checkpoint, participant)) => files.push(FragmentFile {
                    path,
                    checkpoint,
                    participant,
                }),
                None => debug!("Ignoring {}", path.display()),
            }
        }

        if files.is_empty() {
            return Err(empty());
        }
        files.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
        Ok(files)
    }

    /// Opens a lazy stream of merged interval reports for a protocol.
    pub fn reports(&self, protocol: &str) -> Result<ReportStream, IngestError> {
        let files = self.list(protocol)?;
        info!(
            "Reading {} report files for {} from {}",
            files.len(),
            protocol,
            self.protocol_dir(protocol).display()
        );
        Ok(ReportStream::new(files))
    }
}

/// Splits `<checkpoint>_<participant>_<protocol>.json`.
fn parse_file_name(path: &Path, protocol: &str) -> Option<(u64, ParticipantId)> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(&format!("_{}.json", protocol))?;
    let (checkpoint, participant) = stem.split_once('_')?;
    if checkpoint.len() != 8 || participant.is_empty() {
        return None;
    }
    Some((checkpoint.parse().ok()?, ParticipantId::new(participant)))
}

fn read_report(path: &Path) -> Result<Report, IngestError> {
    let json = fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;
    serde_json::from_str(&json).map_err(|e| IngestError::parse(path, e))
}

/// Lazily reads report files, merging all fragments of one checkpoint.
///
/// The merged report's interval index is its checkpoint. Checkpoints must
/// run 0, 1, 2, ... without gaps. The first error ends the stream.
pub struct ReportStream {
    files: Peekable<IntoIter<FragmentFile>>,
    expected: u64,
    failed: bool,
}

impl ReportStream {
    fn new(files: Vec<FragmentFile>) -> Self {
        Self {
            files: files.into_iter().peekable(),
            expected: 0,
            failed: false,
        }
    }

    fn next_report(&mut self, first: FragmentFile) -> Result<Report, IngestError> {
        if first.checkpoint != self.expected {
            return Err(IngestError::MissingCheckpoint {
                expected: self.expected,
                found: first.checkpoint,
            });
        }
        self.expected += 1;

        let mut report = read_report(&first.path)?;
        let mut fragments = 1;

        while let Some(next) = self.files.next_if(|f| f.checkpoint == first.checkpoint) {
            report.merge(read_report(&next.path)?);
            fragments += 1;
        }

        report.interval_index = first.checkpoint;
        debug!(
            "Checkpoint {}: merged {} fragments, {} nodes",
            first.checkpoint,
            fragments,
            report.nodes.len()
        );
        Ok(report)
    }
}

impl Iterator for ReportStream {
    type Item = Result<Report, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let first = self.files.next()?;
        let result = self.next_report(first);
        self.failed = result.is_err();
        Some(result)
    }
}
