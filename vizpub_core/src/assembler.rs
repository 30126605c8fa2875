//! Overlay assembler - folds an ordered report sequence into a temporal graph.
//!
//! # Modes
//!
//! - **Structural**: every interval, edges are derived from the neighbour
//!   lists of present nodes. The derived set replaces the previous one, so an
//!   edge missing from this round's derivation dies.
//! - **Dissemination**: traces a single message. Only nodes subscribed to
//!   the message's topic take part in presence tracking; edges are scheduled
//!   by the [`DisseminationAnimator`] and, once materialized, never die.
//!
//! The timeline coordinate is the ordinal position of a report in the
//! processed sequence. Reports are expected in increasing interval order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};

use crate::animator::DisseminationAnimator;
use crate::error::OverlayError;
use crate::graph::{EdgeHandle, Interval, NodeHandle, TemporalGraph};
use crate::lifecycle::{LifecycleTracker, Observed, Transition};
use crate::metrics::IntervalScalars;
use crate::report::{edge_id, EdgeSnapshot, NodeSnapshot, Report};
use crate::timeline::{EdgeAttributeProfile, NodeAttributeProfile, TimelineWriter};

// =============================================================================
// MODE AND CONFIGURATION
// =============================================================================

/// Overlay construction mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayMode {
    /// Topology over time, edges derived from neighbour lists
    Structural,
    /// Hop-ordered replay of one message
    Dissemination { message_id: String },
}

impl OverlayMode {
    pub fn dissemination(message_id: impl Into<String>) -> Self {
        OverlayMode::Dissemination {
            message_id: message_id.into(),
        }
    }

    /// Traced message id, if any.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            OverlayMode::Structural => None,
            OverlayMode::Dissemination { message_id } => Some(message_id),
        }
    }

    /// Human-readable overlay description.
    pub fn description(&self) -> String {
        match self {
            OverlayMode::Structural => "Structural overlay".to_string(),
            OverlayMode::Dissemination { message_id } => {
                format!("Dissemination overlay for publication message {}", message_id)
            }
        }
    }
}

impl fmt::Display for OverlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayMode::Structural => write!(f, "structural"),
            OverlayMode::Dissemination { message_id } => write!(f, "dissemination:{}", message_id),
        }
    }
}

impl std::str::FromStr for OverlayMode {
    type Err = String;

    /// Accepts `structural` or `dissemination:<message id>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, message) = match s.split_once(':') {
            Some((kind, message)) => (kind, Some(message)),
            None => (s, None),
        };
        match (kind.to_lowercase().as_str(), message) {
            ("structural" | "structure", None) => Ok(OverlayMode::Structural),
            ("dissemination" | "dissem", Some(id)) if !id.is_empty() => {
                Ok(OverlayMode::dissemination(id))
            }
            ("dissemination" | "dissem", _) => {
                Err("Dissemination mode needs a message id (dissemination:<id>)".to_string())
            }
            _ => Err(format!("Unknown overlay mode: {}", s)),
        }
    }
}

/// Attribute profiles used for one build. Immutable once the build starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub node_profile: NodeAttributeProfile,
    pub edge_profile: EdgeAttributeProfile,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self::structural()
    }
}

impl OverlayConfig {
    pub fn structural() -> Self {
        Self {
            node_profile: NodeAttributeProfile::structural(),
            edge_profile: EdgeAttributeProfile::structural(),
        }
    }

    pub fn dissemination() -> Self {
        Self {
            node_profile: NodeAttributeProfile::dissemination(),
            edge_profile: EdgeAttributeProfile::dissemination(),
        }
    }

    /// Preset matching a mode.
    pub fn for_mode(mode: &OverlayMode) -> Self {
        match mode {
            OverlayMode::Structural => Self::structural(),
            OverlayMode::Dissemination { .. } => Self::dissemination(),
        }
    }

    pub fn with_node_profile(mut self, profile: NodeAttributeProfile) -> Self {
        self.node_profile = profile;
        self
    }

    pub fn with_edge_profile(mut self, profile: EdgeAttributeProfile) -> Self {
        self.edge_profile = profile;
        self
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

/// A finished overlay: the finalized temporal graph plus build metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Overlay {
    pub protocol_id: i32,
    pub protocol_name: String,
    pub mode: OverlayMode,
    pub description: String,
    /// Number of reports folded into the graph
    pub intervals: Interval,
    /// Largest animation step (dissemination only)
    pub animation_length: Option<Interval>,
    /// Boundary every open spell was closed at
    pub boundary: Interval,
    pub scalars: Vec<IntervalScalars>,
    pub graph: TemporalGraph,
}

/// Consumer of finished overlays (graph-file writers, exporters).
pub trait GraphSink {
    type Error;

    fn write_overlay(&mut self, overlay: &Overlay) -> Result<(), Self::Error>;
}

// =============================================================================
// ASSEMBLER
// =============================================================================

/// Node label: numeric ids are zero-padded to the digit count of the
/// describing report's node count.
pub fn node_label(id: &str, node_count: usize) -> String {
    let width = node_count.to_string().len();
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        format!("{:0>width$}", id, width = width)
    } else {
        id.to_string()
    }
}

/// Derives directed edges between present nodes from their neighbour lists.
///
/// Only nodes accepted by `eligible` take part, on both ends. The edge topic
/// set is the intersection of both endpoints' topics. Counters and traversed
/// publications are taken from the report's explicit edge of the same id.
pub fn derive_edges<F>(report: &Report, eligible: F) -> BTreeMap<String, EdgeSnapshot>
where
    F: Fn(&NodeSnapshot) -> bool,
{
    let mut derived = BTreeMap::new();

    for node in report.nodes.values().filter(|n| eligible(n)) {
        for neighbor_id in &node.neighbors {
            let Some(neighbor) = report.node(neighbor_id) else {
                continue;
            };
            if !eligible(neighbor) {
                continue;
            }

            let shared: BTreeSet<String> = node
                .topics
                .intersection(&neighbor.topics)
                .cloned()
                .collect();
            let mut edge = EdgeSnapshot::between(&node.id, neighbor_id).with_topics(shared);
            if let Some(explicit) = report.edge(&edge_id(&node.id, neighbor_id)) {
                edge.control_msg_count = explicit.control_msg_count;
                edge.publications = explicit.publications.clone();
            }
            derived.insert(edge.id.clone(), edge);
        }
    }

    derived
}

/// Incremental overlay builder. Feed reports with [`ingest`](Self::ingest),
/// then call [`finish`](Self::finish) once.
pub struct OverlayAssembler {
    mode: OverlayMode,
    writer: TimelineWriter,
    graph: TemporalGraph,
    nodes: LifecycleTracker<NodeHandle>,
    edges: LifecycleTracker<EdgeHandle>,
    animator: Option<DisseminationAnimator>,

    /// Reports processed so far (= next timeline coordinate)
    clock: Interval,

    /// Interval index of the last report seen, skipped ones included
    last_index: Option<u64>,

    protocol: Option<(i32, String)>,

    /// Node count of the last processed report, for labels
    label_nodes: usize,

    scalars: Vec<IntervalScalars>,
}

impl OverlayAssembler {
    pub fn new(mode: OverlayMode, config: OverlayConfig) -> Self {
        let animator = mode.message_id().map(DisseminationAnimator::new);
        Self {
            mode,
            writer: TimelineWriter::new(config.node_profile, config.edge_profile),
            graph: TemporalGraph::new(),
            nodes: LifecycleTracker::new("node"),
            edges: LifecycleTracker::new("edge"),
            animator,
            clock: 0,
            last_index: None,
            protocol: None,
            label_nodes: 0,
            scalars: Vec::new(),
        }
    }

    /// Builds an overlay from a whole report sequence.
    ///
    /// The first read or parse error aborts the build.
    pub fn build<I, E>(mode: OverlayMode, config: OverlayConfig, reports: I) -> Result<Overlay, OverlayError>
    where
        I: IntoIterator<Item = Result<Report, E>>,
        E: Into<OverlayError>,
    {
        info!("Building {} overlay", mode);
        let mut assembler = Self::new(mode, config);
        for report in reports {
            let report = report.map_err(Into::into)?;
            assembler.ingest(&report)?;
        }
        assembler.finish()
    }

    /// Reports folded into the graph so far.
    pub fn intervals(&self) -> Interval {
        self.clock
    }

    pub fn graph(&self) -> &TemporalGraph {
        &self.graph
    }

    /// Folds the next report of the sequence.
    pub fn ingest(&mut self, report: &Report) -> Result<(), OverlayError> {
        let name = report.require_protocol_name()?;
        if let Some((_, current)) = &self.protocol {
            if current != name {
                warn!("Protocol name changed from {} to {} mid-stream", current, name);
            }
        } else {
            self.protocol = Some((report.protocol_id, name.to_string()));
        }

        if let Some(last) = self.last_index {
            if report.interval_index <= last {
                warn!(
                    "Interval index {} does not increase (previous {})",
                    report.interval_index, last
                );
            } else if report.interval_index > last + 1 {
                return Err(OverlayError::IntervalGap {
                    expected: last + 1,
                    found: report.interval_index,
                });
            }
        }
        self.last_index = Some(report.interval_index);

        let traced_topic = match &self.mode {
            OverlayMode::Structural => None,
            OverlayMode::Dissemination { message_id } => match report.publication(message_id) {
                Some(publication) => Some(publication.topic_id.clone()),
                None => {
                    debug!(
                        "Report {} does not carry message {}, skipping",
                        report.interval_index, message_id
                    );
                    return Ok(());
                }
            },
        };

        let interval = self.clock;
        self.label_nodes = report.nodes.len();

        match traced_topic {
            None => self.ingest_structural(report, interval)?,
            Some(topic) => self.ingest_dissemination(report, interval, &topic)?,
        }

        self.clock += 1;

        debug!(
            "Interval {}: {} nodes alive, {} edges alive",
            interval,
            self.nodes.alive_count(),
            self.edges.alive_count()
        );
        Ok(())
    }

    fn ingest_structural(&mut self, report: &Report, interval: Interval) -> Result<(), OverlayError> {
        let label_nodes = self.label_nodes;
        let observed_nodes = self.nodes.observe(
            &mut self.graph,
            report.nodes.keys(),
            interval,
            |graph, id| Ok(graph.create_node(id, node_label(id, label_nodes))),
        )?;

        let derived = derive_edges(report, |_| true);
        let node_tracker = &self.nodes;
        let observed_edges = self.edges.observe(
            &mut self.graph,
            derived.keys(),
            interval,
            |graph, id| {
                let edge = derived
                    .get(id)
                    .ok_or_else(|| OverlayError::report(format!("Edge {} was not derived", id)))?;
                let source = node_tracker
                    .handle(&edge.source_id)
                    .ok_or_else(|| OverlayError::dangling(id, &edge.source_id))?;
                let target = node_tracker
                    .handle(&edge.target_id)
                    .ok_or_else(|| OverlayError::dangling(id, &edge.target_id))?;
                Ok(graph.create_edge(id, source, target))
            },
        )?;

        for observed in observed_edges
            .iter()
            .filter(|o| o.transition == Transition::Created)
        {
            if let Some(edge) = derived.get(&observed.id) {
                self.writer
                    .write_edge(&mut self.graph, observed.handle, edge, interval)?;
            }
        }

        let scalars = IntervalScalars::compute(report, interval);
        self.write_nodes(report, &observed_nodes, &scalars, interval)?;
        self.scalars.push(scalars);
        Ok(())
    }

    fn ingest_dissemination(
        &mut self,
        report: &Report,
        interval: Interval,
        topic: &str,
    ) -> Result<(), OverlayError> {
        // Only subscribers enter the graph, but an alive node that drops the
        // topic stays alive until it leaves the report
        let present: Vec<&str> = report
            .nodes
            .values()
            .filter(|n| n.subscribes_to(topic) || self.nodes.is_alive(&n.id))
            .map(|n| n.id.as_str())
            .collect();

        let label_nodes = self.label_nodes;
        let observed_nodes = self.nodes.observe(
            &mut self.graph,
            present,
            interval,
            |graph, id| Ok(graph.create_node(id, node_label(id, label_nodes))),
        )?;
        let subscribed: Vec<Observed<NodeHandle>> = observed_nodes
            .into_iter()
            .filter(|o| report.node(&o.id).is_some_and(|n| n.subscribes_to(topic)))
            .collect();

        let scalars = IntervalScalars::compute(report, interval);
        self.write_nodes(report, &subscribed, &scalars, interval)?;
        self.scalars.push(scalars);

        if let Some(animator) = self.animator.as_mut() {
            animator.schedule(report, interval);
        }
        self.materialize(interval)
    }

    fn write_nodes(
        &mut self,
        report: &Report,
        observed: &[Observed<NodeHandle>],
        scalars: &IntervalScalars,
        interval: Interval,
    ) -> Result<(), OverlayError> {
        let wants_scalars = self.writer.node_profile().wants_scalars();
        for node in observed {
            let Some(snapshot) = report.node(&node.id) else {
                continue;
            };
            self.writer
                .write_node(&mut self.graph, node.handle, snapshot, interval)?;
            if wants_scalars {
                self.writer.write_scalars(
                    &mut self.graph,
                    node.handle,
                    scalars.hit_ratio,
                    scalars.max_path_length,
                    interval,
                )?;
            }
        }
        Ok(())
    }

    /// Creates every edge scheduled at `step` that is not alive yet,
    /// creating or reviving its endpoints on demand.
    fn materialize(&mut self, step: Interval) -> Result<(), OverlayError> {
        let Some(animator) = self.animator.as_mut() else {
            return Ok(());
        };
        let due = animator.take_due(step);

        let label_nodes = self.label_nodes;
        for edge in due {
            if self.edges.is_alive(&edge.id) {
                continue;
            }

            let create_node = move |graph: &mut TemporalGraph, id: &str| -> Result<NodeHandle, OverlayError> {
                Ok(graph.create_node(id, node_label(id, label_nodes)))
            };
            let source = self
                .nodes
                .ensure_alive(&mut self.graph, &edge.source_id, step, create_node)?
                .handle;
            let target = self
                .nodes
                .ensure_alive(&mut self.graph, &edge.target_id, step, create_node)?
                .handle;

            let observed = self.edges.ensure_alive(&mut self.graph, &edge.id, step, |graph, id| {
                Ok(graph.create_edge(id, source, target))
            })?;
            if observed.transition == Transition::Created {
                self.writer
                    .write_edge(&mut self.graph, observed.handle, &edge, step)?;
            }
            debug!("Materialized {} at step {}", edge.id, step);
        }
        Ok(())
    }

    /// Drains pending animation steps, closes every open spell and returns
    /// the finished overlay.
    pub fn finish(mut self) -> Result<Overlay, OverlayError> {
        let Some((protocol_id, protocol_name)) = self.protocol.take() else {
            return Err(OverlayError::EmptySequence);
        };
        if self.clock == 0 {
            warn!("No report carried the traced message for {}", self.mode);
            return Err(OverlayError::EmptySequence);
        }

        let animation_length = self.animator.as_ref().and_then(|a| a.animation_length());
        let boundary = match animation_length {
            Some(length) => {
                for step in self.clock..=length {
                    self.materialize(step)?;
                }
                (length + 1).max(self.clock)
            }
            None => self.clock,
        };

        self.nodes.finalize(&mut self.graph, boundary)?;
        self.edges.finalize(&mut self.graph, boundary)?;

        info!(
            "Built {} overlay for {}: {} nodes, {} edges over {} intervals (boundary {})",
            self.mode,
            protocol_name,
            self.graph.node_count(),
            self.graph.edge_count(),
            self.clock,
            boundary
        );

        Ok(Overlay {
            protocol_id,
            protocol_name,
            description: self.mode.description(),
            mode: self.mode,
            intervals: self.clock,
            animation_length,
            boundary,
            scalars: self.scalars,
            graph: self.graph,
        })
    }
}
