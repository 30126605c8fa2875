//! Attribute timelines and the profile-driven timeline writer.
//!
//! Two validity disciplines are used by convention:
//! - **rate/count** attributes (control messages, kb, publications, duplicates,
//!   global scalars) are valid for exactly one interval, `[r, r + 1)`;
//! - **descriptive** attributes (topics, subscription size) are open-ended and
//!   hold until overwritten.
//!
//! Hop counts are keyed per traced message and positioned at `r + hops`,
//! so they line up with the dissemination animation rather than the
//! reporting interval.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::error::OverlayError;
use crate::graph::{EdgeHandle, Interval, NodeHandle, TemporalGraph};
use crate::report::{EdgeSnapshot, NodeSnapshot, Publication};

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl AttributeValue {
    /// List value from any string collection.
    pub fn list<'a>(items: impl IntoIterator<Item = &'a String>) -> Self {
        Self::List(items.into_iter().cloned().collect())
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Text(v) => write!(f, "{}", v),
            AttributeValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

/// One timestamped value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub value: AttributeValue,
    pub start: Interval,
    pub end: Option<Interval>,
}

/// Ordered values of one attribute on one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// Records a value, keeping entries ordered by start.
    ///
    /// Bounded writes with `start >= end` are rejected. A write at the start
    /// of the last entry replaces it; an open last entry is closed at the new
    /// start; repeating the current open value is a no-op.
    pub fn record(
        &mut self,
        key: &str,
        value: AttributeValue,
        start: Interval,
        end: Option<Interval>,
    ) -> Result<(), OverlayError> {
        if let Some(end) = end {
            if start >= end {
                return Err(OverlayError::InvalidValidity {
                    key: key.to_string(),
                    start,
                    end,
                });
            }
        }

        if let Some(last) = self.entries.last_mut() {
            if start < last.start {
                if end.is_none() {
                    debug!("Dropping stale write to '{}' at {} (last at {})", key, start, last.start);
                    return Ok(());
                }
                return Err(OverlayError::OutOfOrderAttribute {
                    key: key.to_string(),
                    start,
                    last_start: last.start,
                });
            }

            if start == last.start {
                last.value = value;
                last.end = end;
                return Ok(());
            }

            match last.end {
                None if end.is_none() && last.value == value => return Ok(()),
                None => last.end = Some(start),
                Some(last_end) if last_end > start => last.end = Some(start),
                Some(_) => {}
            }
        }

        self.entries.push(TimelineEntry { value, start, end });
        Ok(())
    }

    /// Value valid at `t`, if any.
    pub fn value_at(&self, t: Interval) -> Option<&AttributeValue> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.start <= t && e.end.map_or(true, |end| t < end))
            .map(|e| &e.value)
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// ATTRIBUTE KEYS
// =============================================================================

pub const TOPICS: &str = "Topics";
pub const SUBSCRIPTION_SIZE: &str = "Subscription Size";
pub const CONTROL_MSGS_SENT: &str = "Control Messages Sent";
pub const CONTROL_MSGS_RECEIVED: &str = "Control Messages Received";
pub const KB_SENT: &str = "Kb Sent";
pub const KB_RECEIVED: &str = "Kb Received";
pub const PUBLICATIONS_SENT: &str = "Publications Sent";
pub const PUBLICATIONS_RECEIVED: &str = "Publications Received";
pub const DUPLICATE_MESSAGES: &str = "Duplicate Messages";
pub const HIT_RATIO: &str = "Hit Ratio";
pub const PATH_LENGTH: &str = "Path Length";
pub const CONTROL_MSG_COUNT: &str = "Control Message Count";
pub const PUBLICATIONS: &str = "Publications";

/// Attribute key for the hop count of one traced message.
pub fn hop_count_key(publication: &Publication) -> String {
    format!("Hop Count P{} T{}", publication.msg_id, publication.topic_id)
}

// =============================================================================
// PROFILES
// =============================================================================

/// Which node attributes to record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeAttributeProfile {
    pub topics: bool,
    pub subscription_size: bool,
    pub control_msgs_sent: bool,
    pub control_msgs_received: bool,
    pub kb_sent: bool,
    pub kb_received: bool,
    pub publications_sent: bool,
    pub publications_received: bool,
    pub hop_count: bool,
    pub duplicate_count: bool,
    pub hit_ratio: bool,
    pub path_length: bool,
}

impl NodeAttributeProfile {
    /// Records nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Topology and traffic view, plus the global scalars.
    pub fn structural() -> Self {
        Self {
            topics: true,
            subscription_size: true,
            control_msgs_sent: true,
            control_msgs_received: true,
            kb_sent: true,
            kb_received: true,
            duplicate_count: true,
            hit_ratio: true,
            path_length: true,
            ..Self::none()
        }
    }

    /// Single-message trace view.
    pub fn dissemination() -> Self {
        Self {
            topics: true,
            hop_count: true,
            duplicate_count: true,
            ..Self::none()
        }
    }

    /// True if any per-interval global scalar is recorded.
    pub fn wants_scalars(&self) -> bool {
        self.hit_ratio || self.path_length
    }
}

/// Which edge attributes to record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeAttributeProfile {
    pub topics: bool,
    pub control_msg_count: bool,
    pub publications: bool,
}

impl EdgeAttributeProfile {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn structural() -> Self {
        Self {
            topics: true,
            ..Self::none()
        }
    }

    pub fn dissemination() -> Self {
        Self {
            topics: true,
            publications: true,
            ..Self::none()
        }
    }
}

// =============================================================================
// WRITER
// =============================================================================

/// Writes snapshot data into entity timelines according to fixed profiles.
///
/// Unselected attributes are no-ops, so callers never branch on the profile.
#[derive(Debug, Clone)]
pub struct TimelineWriter {
    nodes: NodeAttributeProfile,
    edges: EdgeAttributeProfile,
    /// Traced message ids seen so far (one hop-count slot each)
    hop_slots: BTreeSet<String>,
}

impl TimelineWriter {
    pub fn new(nodes: NodeAttributeProfile, edges: EdgeAttributeProfile) -> Self {
        Self {
            nodes,
            edges,
            hop_slots: BTreeSet::new(),
        }
    }

    pub fn node_profile(&self) -> &NodeAttributeProfile {
        &self.nodes
    }

    pub fn edge_profile(&self) -> &EdgeAttributeProfile {
        &self.edges
    }

    /// Hop-count attribute keys created so far, one per traced message.
    pub fn hop_slots(&self) -> impl Iterator<Item = &String> {
        self.hop_slots.iter()
    }

    /// Writes one interval's node data at `[interval, interval + 1)`.
    pub fn write_node(
        &mut self,
        graph: &mut TemporalGraph,
        handle: NodeHandle,
        snapshot: &NodeSnapshot,
        interval: Interval,
    ) -> Result<(), OverlayError> {
        let p = self.nodes;
        let next = Some(interval + 1);
        let node = graph.node_mut(handle);

        if p.topics && !snapshot.topics.is_empty() {
            node.set_attribute(TOPICS, AttributeValue::list(&snapshot.topics), interval, None)?;
        }
        if p.subscription_size {
            let size = AttributeValue::Int(snapshot.subscription_size as i64);
            node.set_attribute(SUBSCRIPTION_SIZE, size, interval, None)?;
        }
        if p.control_msgs_sent {
            let sent = AttributeValue::Int(snapshot.control_msgs_sent as i64);
            node.set_attribute(CONTROL_MSGS_SENT, sent, interval, next)?;
        }
        if p.control_msgs_received {
            let received = AttributeValue::Int(snapshot.control_msgs_received as i64);
            node.set_attribute(CONTROL_MSGS_RECEIVED, received, interval, next)?;
        }
        if p.kb_sent {
            let kb = AttributeValue::Int((snapshot.bytes_sent / 1000) as i64);
            node.set_attribute(KB_SENT, kb, interval, next)?;
        }
        if p.kb_received {
            let kb = AttributeValue::Int((snapshot.bytes_received / 1000) as i64);
            node.set_attribute(KB_RECEIVED, kb, interval, next)?;
        }
        if p.publications_sent && !snapshot.publications_sent.is_empty() {
            let ids = AttributeValue::list(snapshot.publications_sent.keys());
            node.set_attribute(PUBLICATIONS_SENT, ids, interval, next)?;
        }
        if p.publications_received && !snapshot.publications_received.is_empty() {
            let ids = AttributeValue::list(snapshot.publications_received.keys());
            node.set_attribute(PUBLICATIONS_RECEIVED, ids, interval, next)?;
        }
        if p.duplicate_count {
            let dups = AttributeValue::Int(snapshot.duplicate_count as i64);
            node.set_attribute(DUPLICATE_MESSAGES, dups, interval, next)?;
        }
        if p.hop_count {
            for publication in snapshot.publications_received.values() {
                let key = hop_count_key(publication);
                if !self.hop_slots.contains(&key) {
                    debug!("New hop count slot: {}", key);
                    self.hop_slots.insert(key.clone());
                }
                let hops = AttributeValue::Int(publication.hop_count as i64);
                let start = interval + publication.hop_count as u64;
                node.set_attribute(&key, hops, start, None)?;
            }
        }
        Ok(())
    }

    /// Writes the interval's broadcast scalars onto a node.
    pub fn write_scalars(
        &self,
        graph: &mut TemporalGraph,
        handle: NodeHandle,
        hit_ratio: f64,
        max_path_length: u32,
        interval: Interval,
    ) -> Result<(), OverlayError> {
        let next = Some(interval + 1);
        let node = graph.node_mut(handle);
        if self.nodes.hit_ratio {
            node.set_attribute(HIT_RATIO, AttributeValue::Float(hit_ratio), interval, next)?;
        }
        if self.nodes.path_length {
            let len = AttributeValue::Int(max_path_length as i64);
            node.set_attribute(PATH_LENGTH, len, interval, next)?;
        }
        Ok(())
    }

    /// Writes edge data; called once, when the edge is created.
    pub fn write_edge(
        &self,
        graph: &mut TemporalGraph,
        handle: EdgeHandle,
        snapshot: &EdgeSnapshot,
        interval: Interval,
    ) -> Result<(), OverlayError> {
        let p = self.edges;
        let next = Some(interval + 1);
        let edge = &mut graph.edge_mut(handle).entity;

        if p.topics && !snapshot.topics.is_empty() {
            edge.set_attribute(TOPICS, AttributeValue::list(&snapshot.topics), interval, None)?;
        }
        if p.control_msg_count {
            let count = AttributeValue::Int(snapshot.control_msg_count as i64);
            edge.set_attribute(CONTROL_MSG_COUNT, count, interval, next)?;
        }
        if p.publications && !snapshot.publications.is_empty() {
            let ids = AttributeValue::list(snapshot.publications.keys());
            edge.set_attribute(PUBLICATIONS, ids, interval, next)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_write_rejects_empty_range() {
        let mut timeline = Timeline::default();
        let err = timeline
            .record("k", AttributeValue::Int(1), 3, Some(3))
            .unwrap_err();
        assert!(matches!(err, OverlayError::InvalidValidity { start: 3, end: 3, .. }));

        assert!(timeline.record("k", AttributeValue::Int(1), 4, Some(2)).is_err());
        assert!(timeline.is_empty());
    }

    #[test]
    fn test_open_value_held_until_overwritten() {
        let mut timeline = Timeline::default();
        let a = AttributeValue::Text("a".into());
        let b = AttributeValue::Text("b".into());

        timeline.record("k", a.clone(), 0, None).unwrap();
        timeline.record("k", a.clone(), 1, None).unwrap();
        timeline.record("k", a.clone(), 2, None).unwrap();
        assert_eq!(timeline.len(), 1);

        timeline.record("k", b.clone(), 4, None).unwrap();
        assert_eq!(
            timeline.entries(),
            &[
                TimelineEntry { value: a.clone(), start: 0, end: Some(4) },
                TimelineEntry { value: b.clone(), start: 4, end: None },
            ]
        );
        assert_eq!(timeline.value_at(3), Some(&a));
        assert_eq!(timeline.value_at(100), Some(&b));
    }

    #[test]
    fn test_rate_values_per_interval() {
        let mut timeline = Timeline::default();
        for r in 0..3u64 {
            timeline
                .record("k", AttributeValue::Int(r as i64 * 10), r, Some(r + 1))
                .unwrap();
        }
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline.value_at(1), Some(&AttributeValue::Int(10)));
        assert_eq!(timeline.value_at(3), None);

        // Same start replaces
        timeline.record("k", AttributeValue::Int(99), 2, Some(3)).unwrap();
        assert_eq!(timeline.value_at(2), Some(&AttributeValue::Int(99)));

        // Going backwards is a caller bug
        assert!(timeline.record("k", AttributeValue::Int(1), 0, Some(1)).is_err());
    }

    #[test]
    fn test_writer_respects_profile() {
        let mut graph = TemporalGraph::new();
        let h = graph.create_node("1", "1");
        let snapshot = NodeSnapshot {
            control_msgs_sent: 5,
            bytes_sent: 4200,
            ..NodeSnapshot::new("1").with_topics(["t"])
        };

        let profile = NodeAttributeProfile {
            kb_sent: true,
            ..NodeAttributeProfile::none()
        };
        let mut writer = TimelineWriter::new(profile, EdgeAttributeProfile::none());
        writer.write_node(&mut graph, h, &snapshot, 2).unwrap();

        let node = graph.node(h);
        assert_eq!(node.attributes.len(), 1);
        assert_eq!(node.attribute_at(KB_SENT, 2), Some(&AttributeValue::Int(4)));
        assert_eq!(node.attribute_at(KB_SENT, 3), None);
    }

    #[test]
    fn test_hop_count_positioned_by_hops() {
        let mut graph = TemporalGraph::new();
        let h = graph.create_node("1", "1");
        let publication = Publication::new("9", "t", "0").with_hop_count(3);
        let snapshot = NodeSnapshot::new("1").with_received(publication.clone());

        let mut writer = TimelineWriter::new(
            NodeAttributeProfile::dissemination(),
            EdgeAttributeProfile::none(),
        );
        writer.write_node(&mut graph, h, &snapshot, 1).unwrap();

        let key = hop_count_key(&publication);
        assert_eq!(key, "Hop Count P9 Tt");
        let timeline = &graph.node(h).attributes[&key];
        assert_eq!(timeline.entries()[0].start, 4);
        assert_eq!(timeline.entries()[0].end, None);
        assert_eq!(writer.hop_slots().count(), 1);
    }

    #[test]
    fn test_profile_from_json() {
        let profile: NodeAttributeProfile =
            serde_json::from_str(r#"{"topics": true, "hop_count": true}"#).unwrap();
        assert!(profile.topics);
        assert!(profile.hop_count);
        assert!(!profile.kb_sent);
    }
}
