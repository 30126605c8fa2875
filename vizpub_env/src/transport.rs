//! Fragment transport between reporting participants and the collector.

use async_trait::async_trait;
use tokio::sync::mpsc;
use vizpub_core::Report;

use crate::error::IngestError;
use crate::types::{ParticipantId, ReportFragment};

/// Abstraction for delivering interval reports to a collector.
///
/// # Fragment Flow
///
/// ```text
/// Participant A                 Queue (bounded)              Collector
///   |                              |                            |
///   |-- send(report) ------------->|                            |
///   |   (waits while queue full)   |-- fragment --------------->|
///   |                              |                            |-- checkpoint, store
/// ```
#[async_trait]
pub trait ReportTransport: Send + Sync + 'static {
    /// Sends this participant's report for the current interval.
    ///
    /// Waits while the queue is full. Fails once the collector has stopped.
    async fn send(&self, report: Report) -> Result<(), IngestError>;

    /// Returns this participant's id.
    fn local_id(&self) -> &ParticipantId;
}

/// Queue-backed transport handed out by a [`Collector`](crate::Collector).
#[derive(Debug, Clone)]
pub struct FragmentSender {
    participant: ParticipantId,
    tx: mpsc::Sender<ReportFragment>,
}

impl FragmentSender {
    pub(crate) fn new(participant: ParticipantId, tx: mpsc::Sender<ReportFragment>) -> Self {
        Self { participant, tx }
    }
}

#[async_trait]
impl ReportTransport for FragmentSender {
    async fn send(&self, report: Report) -> Result<(), IngestError> {
        let fragment = ReportFragment::new(self.participant.clone(), report);
        self.tx
            .send(fragment)
            .await
            .map_err(|_| IngestError::transport("Collector queue closed"))
    }

    fn local_id(&self) -> &ParticipantId {
        &self.participant
    }
}
