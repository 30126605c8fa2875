//! Common types for report ingestion.

use serde::{Deserialize, Serialize};
use vizpub_core::Report;

use crate::error::IngestError;

/// Identifier of a reporting participant (one simulation process or host).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One participant's share of an interval report.
///
/// Fragments of the same checkpoint are merged into one [`Report`] on read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportFragment {
    pub participant: ParticipantId,
    pub report: Report,
}

impl ReportFragment {
    pub fn new(participant: ParticipantId, report: Report) -> Self {
        Self {
            participant,
            report,
        }
    }

    /// Protocol name of the carried report; fragments without one are rejected.
    pub fn protocol_name(&self) -> Result<&str, IngestError> {
        self.report
            .require_protocol_name()
            .map_err(|_| IngestError::MissingProtocolName(self.participant.to_string()))
    }
}
