//! Fragment collector - single consumer of a bounded queue.
//!
//! Participants send their per-interval fragments through [`FragmentSender`]
//! handles. The collector assigns each accepted fragment the next checkpoint
//! of its (protocol, participant) pair and writes it to the [`ReportStore`].
//! It finishes once every sender is dropped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::checkpoint::CheckpointCounter;
use crate::error::IngestError;
use crate::store::ReportStore;
use crate::transport::FragmentSender;
use crate::types::{ParticipantId, ReportFragment};

/// Collector configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Report store root directory
    pub root: PathBuf,

    /// Fragments buffered before senders wait
    pub queue_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("reports"),
            queue_capacity: 100,
        }
    }
}

impl CollectorConfig {
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

/// Outcome of a collector run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectorSummary {
    /// Fragments written to the store
    pub written: usize,
    /// Fragments dropped for lacking a protocol name
    pub rejected: usize,
    /// Protocols seen
    pub protocols: BTreeSet<String>,
}

pub struct Collector {
    store: ReportStore,
    tx: mpsc::Sender<ReportFragment>,
    rx: mpsc::Receiver<ReportFragment>,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            store: ReportStore::new(config.root),
            tx,
            rx,
        }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Creates a transport handle for one participant.
    pub fn sender(&self, participant: impl Into<ParticipantId>) -> FragmentSender {
        FragmentSender::new(participant.into(), self.tx.clone())
    }

    /// Drains the queue until every sender is dropped.
    ///
    /// Fragments without a protocol name are rejected and counted; a store
    /// failure stops the run.
    pub async fn run(self) -> Result<CollectorSummary, IngestError> {
        let Collector { store, tx, mut rx } = self;
        // Only participants keep the queue open
        drop(tx);

        let mut counter = CheckpointCounter::new();
        let mut summary = CollectorSummary::default();

        while let Some(fragment) = rx.recv().await {
            let protocol = match fragment.protocol_name() {
                Ok(name) => name.to_string(),
                Err(e) => {
                    warn!("Rejecting fragment: {}", e);
                    summary.rejected += 1;
                    continue;
                }
            };

            let checkpoint = counter.next(&protocol, &fragment.participant);
            store.write_fragment(&fragment, checkpoint)?;
            debug!(
                "Fragment {} from {} for {}",
                checkpoint, fragment.participant, protocol
            );

            summary.written += 1;
            summary.protocols.insert(protocol);
        }

        info!(
            "Collector finished: {} fragments written, {} rejected",
            summary.written, summary.rejected
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ReportTransport;
    use tempfile::TempDir;
    use vizpub_core::{NodeSnapshot, Report};

    #[tokio::test]
    async fn test_participants_merge_per_interval() {
        let dir = TempDir::new().unwrap();
        let collector = Collector::new(
            CollectorConfig::default()
                .with_root(dir.path())
                .with_queue_capacity(2),
        );
        let store = collector.store().clone();

        let mut handles = Vec::new();
        for p in 0..3 {
            let sender = collector.sender(ParticipantId::new(format!("p{}", p)));
            handles.push(tokio::spawn(async move {
                for r in 0..4u64 {
                    let report = Report::new(1, "cyclon", r)
                        .with_node(NodeSnapshot::new(&format!("{}", p * 10 + r)));
                    sender.send(report).await.unwrap();
                }
            }));
        }

        let run = tokio::spawn(collector.run());
        for handle in handles {
            handle.await.unwrap();
        }
        let summary = run.await.unwrap().unwrap();

        assert_eq!(summary.written, 12);
        assert_eq!(summary.rejected, 0);
        assert!(summary.protocols.contains("cyclon"));

        let reports: Vec<Report> = store
            .reports("cyclon")
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(reports.len(), 4);
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.interval_index, i as u64);
            assert_eq!(report.nodes.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_nameless_fragment_rejected() {
        let dir = TempDir::new().unwrap();
        let collector = Collector::new(CollectorConfig::default().with_root(dir.path()));
        let sender = collector.sender("p0");

        sender.send(Report::default()).await.unwrap();
        sender.send(Report::new(1, "cyclon", 0)).await.unwrap();
        drop(sender);

        let summary = collector.run().await.unwrap();
        assert_eq!(summary.written, 1);
        assert_eq!(summary.rejected, 1);
    }

    #[tokio::test]
    async fn test_send_after_collector_stops_fails() {
        let dir = TempDir::new().unwrap();
        let collector = Collector::new(CollectorConfig::default().with_root(dir.path()));
        let sender = collector.sender("p0");
        drop(collector);

        let result = sender.send(Report::new(1, "cyclon", 0)).await;
        assert!(matches!(result, Err(IngestError::TransportError(_))));
        assert_eq!(sender.local_id().as_str(), "p0");
    }
}
