//! Snapshot model - one immutable report per reporting interval.
//!
//! A [`Report`] describes the observed state of every live participant at a
//! single interval: per-node data, optionally per-edge data, and the set of
//! publications injected during that interval. Reports arrive as JSON from
//! the reporting transport; field names follow the reporter's camelCase
//! convention and older names are accepted as aliases.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::OverlayError;

/// A publication message, keyed by its message id.
///
/// Derived copies (relay, undo) are produced by [`Publication::incremented`],
/// [`Publication::decremented`] and [`Publication::forwarded`]; a publication
/// is never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    /// Message id (identity key)
    pub msg_id: String,

    /// Topic the message was published on
    pub topic_id: String,

    /// Node that originally published the message
    pub original_sender_id: String,

    /// Last-hop source of this copy
    #[serde(default)]
    pub source_id: String,

    /// Destinations this copy was forwarded to
    #[serde(default)]
    pub destination_ids: Vec<String>,

    /// Number of relays so far
    #[serde(default)]
    pub hop_count: u32,
}

impl Publication {
    /// Creates a fresh publication at hop count 0.
    pub fn new(msg_id: &str, topic_id: &str, original_sender_id: &str) -> Self {
        Self {
            msg_id: msg_id.to_string(),
            topic_id: topic_id.to_string(),
            original_sender_id: original_sender_id.to_string(),
            source_id: original_sender_id.to_string(),
            destination_ids: Vec::new(),
            hop_count: 0,
        }
    }

    /// Sets the hop count.
    pub fn with_hop_count(mut self, hop_count: u32) -> Self {
        self.hop_count = hop_count;
        self
    }

    /// Sets the last-hop source.
    pub fn with_source(mut self, source_id: &str) -> Self {
        self.source_id = source_id.to_string();
        self
    }

    /// Returns a copy one relay further along.
    pub fn incremented(&self) -> Self {
        Self {
            hop_count: self.hop_count + 1,
            ..self.clone()
        }
    }

    /// Returns a copy one relay back. Saturates at 0.
    pub fn decremented(&self) -> Self {
        Self {
            hop_count: self.hop_count.saturating_sub(1),
            ..self.clone()
        }
    }

    /// Returns an incremented copy addressed to new destinations.
    pub fn forwarded(&self, destinations: Vec<String>) -> Self {
        Self {
            destination_ids: destinations,
            hop_count: self.hop_count + 1,
            ..self.clone()
        }
    }
}

/// Observed state of one node during one interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeSnapshot {
    pub id: String,
    pub neighbors: BTreeSet<String>,
    pub topics: BTreeSet<String>,
    pub subscription_size: u32,
    pub control_msgs_sent: u64,
    pub control_msgs_received: u64,
    #[serde(alias = "bitsSent")]
    pub bytes_sent: u64,
    #[serde(alias = "bitsReceived")]
    pub bytes_received: u64,
    #[serde(alias = "publicationMsgsSent")]
    pub publications_sent: BTreeMap<String, Publication>,
    #[serde(alias = "publicationMsgsReceived")]
    pub publications_received: BTreeMap<String, Publication>,
    pub duplicate_count: u32,
}

impl NodeSnapshot {
    /// Creates an empty snapshot for the given node id.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_neighbors<'a>(mut self, neighbors: impl IntoIterator<Item = &'a str>) -> Self {
        self.neighbors = neighbors.into_iter().map(str::to_string).collect();
        self
    }

    pub fn with_topics<'a>(mut self, topics: impl IntoIterator<Item = &'a str>) -> Self {
        self.topics = topics.into_iter().map(str::to_string).collect();
        self.subscription_size = self.topics.len() as u32;
        self
    }

    pub fn with_received(mut self, publication: Publication) -> Self {
        self.publications_received
            .insert(publication.msg_id.clone(), publication);
        self
    }

    pub fn with_sent(mut self, publication: Publication) -> Self {
        self.publications_sent
            .insert(publication.msg_id.clone(), publication);
        self
    }

    /// True if this node subscribes to `topic`.
    pub fn subscribes_to(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    /// True if this node received the publication `msg_id` this interval.
    pub fn received_publication(&self, msg_id: &str) -> bool {
        self.publications_received.contains_key(msg_id)
    }
}

/// Observed state of one directed edge during one interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeSnapshot {
    /// Edge id, by convention `source->target`
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub topics: BTreeSet<String>,
    #[serde(alias = "gossipCount")]
    pub control_msg_count: u64,
    /// Publications that traversed this edge during the interval
    #[serde(alias = "publicationsMessages")]
    pub publications: BTreeMap<String, Publication>,
}

impl EdgeSnapshot {
    /// Creates an edge with the conventional `source->target` id.
    pub fn between(source_id: &str, target_id: &str) -> Self {
        Self {
            id: edge_id(source_id, target_id),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_topics(mut self, topics: BTreeSet<String>) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_publication(mut self, publication: Publication) -> Self {
        self.publications
            .insert(publication.msg_id.clone(), publication);
        self
    }
}

/// Builds the conventional edge id for a directed pair.
pub fn edge_id(source_id: &str, target_id: &str) -> String {
    format!("{}->{}", source_id, target_id)
}

/// The full observed system state at one reporting interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Report {
    pub protocol_id: i32,
    pub protocol_name: Option<String>,
    #[serde(alias = "intervalCount")]
    pub interval_index: u64,
    pub nodes: BTreeMap<String, NodeSnapshot>,
    pub edges: BTreeMap<String, EdgeSnapshot>,
    pub publications: BTreeMap<String, Publication>,
}

impl Report {
    /// Creates an empty report.
    pub fn new(protocol_id: i32, protocol_name: &str, interval_index: u64) -> Self {
        Self {
            protocol_id,
            protocol_name: Some(protocol_name.to_string()),
            interval_index,
            ..Default::default()
        }
    }

    /// Parses a report from JSON.
    pub fn from_json(json: &str) -> Result<Self, OverlayError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_node(mut self, node: NodeSnapshot) -> Self {
        self.nodes.insert(node.id.clone(), node);
        self
    }

    pub fn with_edge(mut self, edge: EdgeSnapshot) -> Self {
        self.edges.insert(edge.id.clone(), edge);
        self
    }

    pub fn with_publication(mut self, publication: Publication) -> Self {
        self.publications
            .insert(publication.msg_id.clone(), publication);
        self
    }

    /// Returns the protocol name, rejecting reports that lack one.
    pub fn require_protocol_name(&self) -> Result<&str, OverlayError> {
        match self.protocol_name.as_deref() {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(OverlayError::MissingProtocolName {
                interval: self.interval_index,
            }),
        }
    }

    pub fn node(&self, id: &str) -> Option<&NodeSnapshot> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &str) -> Option<&EdgeSnapshot> {
        self.edges.get(id)
    }

    pub fn publication(&self, msg_id: &str) -> Option<&Publication> {
        self.publications.get(msg_id)
    }

    /// Union of all topics any node subscribes to.
    pub fn topics(&self) -> BTreeSet<String> {
        self.nodes
            .values()
            .flat_map(|n| n.topics.iter().cloned())
            .collect()
    }

    /// Appends another participant's fragment of the same interval.
    ///
    /// Protocol id and name are kept from `self` unless `self` has none yet.
    pub fn merge(&mut self, fragment: Report) {
        if self.protocol_name.is_none() {
            self.protocol_id = fragment.protocol_id;
            self.protocol_name = fragment.protocol_name;
        }
        self.nodes.extend(fragment.nodes);
        self.edges.extend(fragment.edges);
        self.publications.extend(fragment.publications);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publication_copies() {
        let p = Publication::new("7", "t1", "3").with_hop_count(2);

        assert_eq!(p.incremented().hop_count, 3);
        assert_eq!(p.decremented().hop_count, 1);
        assert_eq!(Publication::new("7", "t1", "3").decremented().hop_count, 0);

        let fwd = p.forwarded(vec!["4".into(), "5".into()]);
        assert_eq!(fwd.hop_count, 3);
        assert_eq!(fwd.destination_ids, vec!["4", "5"]);
        // Original untouched
        assert_eq!(p.hop_count, 2);
        assert!(p.destination_ids.is_empty());
    }

    #[test]
    fn test_node_queries() {
        let node = NodeSnapshot::new("1")
            .with_topics(["a", "b"])
            .with_received(Publication::new("m", "a", "2"));

        assert!(node.subscribes_to("a"));
        assert!(!node.subscribes_to("c"));
        assert!(node.received_publication("m"));
        assert!(!node.received_publication("x"));
        assert_eq!(node.subscription_size, 2);
    }

    #[test]
    fn test_parse_legacy_field_names() {
        let json = r#"{
            "protocolId": 2,
            "protocolName": "polder",
            "intervalCount": 4,
            "nodes": {
                "1": {
                    "id": "1",
                    "neighbors": ["2"],
                    "topics": ["t"],
                    "bitsSent": 4000,
                    "publicationMsgsReceived": {
                        "m": {"msgId": "m", "topicId": "t", "originalSenderId": "2", "hopCount": 1}
                    }
                }
            }
        }"#;

        let report = Report::from_json(json).unwrap();
        assert_eq!(report.interval_index, 4);
        assert_eq!(report.require_protocol_name().unwrap(), "polder");
        let node = report.node("1").unwrap();
        assert_eq!(node.bytes_sent, 4000);
        assert_eq!(node.publications_received["m"].hop_count, 1);
        assert!(report.edges.is_empty());
    }

    #[test]
    fn test_missing_protocol_name_rejected() {
        let report = Report::from_json(r#"{"intervalIndex": 3}"#).unwrap();
        assert!(matches!(
            report.require_protocol_name(),
            Err(OverlayError::MissingProtocolName { interval: 3 })
        ));
    }

    #[test]
    fn test_merge_fragments() {
        let mut a = Report::new(1, "cyclon", 0).with_node(NodeSnapshot::new("1"));
        let b = Report::new(1, "cyclon", 0)
            .with_node(NodeSnapshot::new("2"))
            .with_publication(Publication::new("m", "t", "2"));

        a.merge(b);
        assert_eq!(a.nodes.len(), 2);
        assert!(a.publication("m").is_some());

        let mut empty = Report::default();
        empty.merge(a.clone());
        assert_eq!(empty.protocol_name.as_deref(), Some("cyclon"));
    }

    #[test]
    fn test_topics_union() {
        let report = Report::new(1, "polder", 0)
            .with_node(NodeSnapshot::new("1").with_topics(["a", "b"]))
            .with_node(NodeSnapshot::new("2").with_topics(["b", "c"]))
            .with_node(NodeSnapshot::new("3"));

        let topics: Vec<String> = report.topics().into_iter().collect();
        assert_eq!(topics, vec!["a", "b", "c"]);
        assert!(Report::default().topics().is_empty());
    }
}
