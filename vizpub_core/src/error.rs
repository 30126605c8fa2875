//! Error types for overlay reconstruction.

use thiserror::Error;

/// Errors that abort (or reject part of) an overlay build.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// A report carried no protocol name, so the output cannot be named
    #[error("Report at interval {interval} has no protocol name")]
    MissingProtocolName { interval: u64 },

    /// An edge was derived from a node that no processed report contained
    #[error("Edge {edge} references unknown endpoint {endpoint}")]
    DanglingEndpoint { edge: String, endpoint: String },

    /// Bounded attribute write with `start >= end`
    #[error("Invalid validity for attribute '{key}': start {start} >= end {end}")]
    InvalidValidity { key: String, start: u64, end: u64 },

    /// Bounded attribute write positioned before the last recorded entry
    #[error("Out-of-order write for attribute '{key}': start {start} precedes {last_start}")]
    OutOfOrderAttribute { key: String, start: u64, last_start: u64 },

    /// A spell would break the strictly-increasing, non-overlapping order
    #[error("Spell starting at {start} overlaps previous spell of {id}")]
    SpellOverlap { id: String, start: u64 },

    /// `finalize` was called twice, or `observe` after `finalize`
    #[error("Lifecycle for {0} already finalized")]
    AlreadyFinalized(String),

    /// An interval index was skipped, so spells across it would be wrong
    #[error("Missing report for interval {expected} (next report is {found})")]
    IntervalGap { expected: u64, found: u64 },

    /// The snapshot sequence was empty
    #[error("No reports to build an overlay from")]
    EmptySequence,

    /// A snapshot was missing, unreadable or unparseable
    #[error("Report error: {0}")]
    Report(String),
}

impl OverlayError {
    /// Creates a report error.
    pub fn report(msg: impl Into<String>) -> Self {
        Self::Report(msg.into())
    }

    /// Creates a dangling endpoint error.
    pub fn dangling(edge: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::DanglingEndpoint {
            edge: edge.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl From<serde_json::Error> for OverlayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Report(format!("Unparseable report: {}", err))
    }
}
