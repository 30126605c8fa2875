//! In-memory temporal graph handed to the output sink.
//!
//! Nodes and edges own an ordered list of [`Spell`]s (validity intervals) and
//! a set of attribute timelines. Spells on one entity are always strictly
//! increasing and non-overlapping; every mutation that could break this is
//! checked here.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::OverlayError;
use crate::timeline::{AttributeValue, Timeline};

/// Discrete timeline coordinate (reporting interval or animation step).
pub type Interval = u64;

/// Half-open validity range `[start, end)`; `end == None` means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Spell {
    pub start: Interval,
    pub end: Option<Interval>,
}

impl Spell {
    pub fn open(start: Interval) -> Self {
        Self { start, end: None }
    }

    pub fn closed(start: Interval, end: Interval) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// True if `t` falls inside this spell.
    pub fn contains(&self, t: Interval) -> bool {
        t >= self.start && self.end.map_or(true, |end| t < end)
    }
}

/// Handle to a node in a [`TemporalGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeHandle(pub usize);

/// Handle to an edge in a [`TemporalGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EdgeHandle(pub usize);

/// Shared spell/attribute state of a node or an edge.
#[derive(Debug, Clone, Serialize)]
pub struct TemporalEntity {
    pub id: String,
    pub label: String,
    pub spells: Vec<Spell>,
    pub attributes: BTreeMap<String, Timeline>,
}

impl TemporalEntity {
    fn new(id: &str, label: String) -> Self {
        Self {
            id: id.to_string(),
            label,
            spells: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Appends a spell, keeping the list strictly increasing and non-overlapping.
    pub fn add_spell(&mut self, start: Interval, end: Option<Interval>) -> Result<(), OverlayError> {
        if let Some(end) = end {
            if start >= end {
                return Err(OverlayError::SpellOverlap {
                    id: self.id.clone(),
                    start,
                });
            }
        }
        if let Some(last) = self.spells.last() {
            match last.end {
                Some(last_end) if last_end <= start => {}
                _ => {
                    return Err(OverlayError::SpellOverlap {
                        id: self.id.clone(),
                        start,
                    })
                }
            }
        }
        self.spells.push(Spell { start, end });
        Ok(())
    }

    /// Moves the end of the last spell forward to `end` (never backwards).
    pub fn extend_last_spell(&mut self, end: Interval) {
        if let Some(last) = self.spells.last_mut() {
            if end > last.start && last.end.map_or(true, |e| e < end) {
                last.end = Some(end);
            }
        }
    }

    /// Sets the end of the last spell to exactly `end`.
    pub fn close_last_spell(&mut self, end: Interval) -> Result<(), OverlayError> {
        match self.spells.last_mut() {
            Some(last) if end > last.start => {
                last.end = Some(end);
                Ok(())
            }
            Some(last) => Err(OverlayError::SpellOverlap {
                id: self.id.clone(),
                start: last.start,
            }),
            None => Ok(()),
        }
    }

    /// Re-opens the last spell if it ended exactly at `at`.
    ///
    /// Returns false (and changes nothing) otherwise.
    pub fn reopen_last_spell(&mut self, at: Interval) -> bool {
        match self.spells.last_mut() {
            Some(last) if last.end == Some(at) => {
                last.end = None;
                true
            }
            _ => false,
        }
    }

    /// Last spell, if any.
    pub fn current_spell(&self) -> Option<&Spell> {
        self.spells.last()
    }

    /// True if any spell contains `t`.
    pub fn alive_at(&self, t: Interval) -> bool {
        self.spells.iter().any(|s| s.contains(t))
    }

    /// Records an attribute value. `end == None` writes an open-ended value.
    pub fn set_attribute(
        &mut self,
        key: &str,
        value: AttributeValue,
        start: Interval,
        end: Option<Interval>,
    ) -> Result<(), OverlayError> {
        self.attributes
            .entry(key.to_string())
            .or_default()
            .record(key, value, start, end)
    }

    /// Attribute value valid at `t`, if any.
    pub fn attribute_at(&self, key: &str, t: Interval) -> Option<&AttributeValue> {
        self.attributes.get(key)?.value_at(t)
    }
}

/// A directed temporal edge.
#[derive(Debug, Clone, Serialize)]
pub struct TemporalEdge {
    #[serde(flatten)]
    pub entity: TemporalEntity,
    pub source: NodeHandle,
    pub target: NodeHandle,
}

/// The reconstructed temporal graph.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemporalGraph {
    nodes: Vec<TemporalEntity>,
    edges: Vec<TemporalEdge>,
    #[serde(skip)]
    node_index: BTreeMap<String, NodeHandle>,
    #[serde(skip)]
    edge_index: BTreeMap<String, EdgeHandle>,
}

impl TemporalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a node. Ids are unique; creating an existing id returns its handle.
    pub fn create_node(&mut self, id: &str, label: impl Into<String>) -> NodeHandle {
        if let Some(handle) = self.node_index.get(id) {
            return *handle;
        }
        let handle = NodeHandle(self.nodes.len());
        self.nodes.push(TemporalEntity::new(id, label.into()));
        self.node_index.insert(id.to_string(), handle);
        handle
    }

    /// Creates a directed edge between two existing nodes.
    pub fn create_edge(&mut self, id: &str, source: NodeHandle, target: NodeHandle) -> EdgeHandle {
        if let Some(handle) = self.edge_index.get(id) {
            return *handle;
        }
        let handle = EdgeHandle(self.edges.len());
        self.edges.push(TemporalEdge {
            entity: TemporalEntity::new(id, id.to_string()),
            source,
            target,
        });
        self.edge_index.insert(id.to_string(), handle);
        handle
    }

    pub fn node(&self, handle: NodeHandle) -> &TemporalEntity {
        &self.nodes[handle.0]
    }

    pub fn node_mut(&mut self, handle: NodeHandle) -> &mut TemporalEntity {
        &mut self.nodes[handle.0]
    }

    pub fn edge(&self, handle: EdgeHandle) -> &TemporalEdge {
        &self.edges[handle.0]
    }

    pub fn edge_mut(&mut self, handle: EdgeHandle) -> &mut TemporalEdge {
        &mut self.edges[handle.0]
    }

    pub fn find_node(&self, id: &str) -> Option<&TemporalEntity> {
        self.node_index.get(id).map(|h| self.node(*h))
    }

    pub fn find_edge(&self, id: &str) -> Option<&TemporalEdge> {
        self.edge_index.get(id).map(|h| self.edge(*h))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TemporalEntity> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &TemporalEdge> {
        self.edges.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Uniform access to the spell-carrying part of nodes and edges.
///
/// Lets one lifecycle tracker drive both entity kinds.
pub trait EntityHandle: Copy {
    fn entity(self, graph: &TemporalGraph) -> &TemporalEntity;
    fn entity_mut(self, graph: &mut TemporalGraph) -> &mut TemporalEntity;
}

impl EntityHandle for NodeHandle {
    fn entity(self, graph: &TemporalGraph) -> &TemporalEntity {
        graph.node(self)
    }

    fn entity_mut(self, graph: &mut TemporalGraph) -> &mut TemporalEntity {
        graph.node_mut(self)
    }
}

impl EntityHandle for EdgeHandle {
    fn entity(self, graph: &TemporalGraph) -> &TemporalEntity {
        &graph.edge(self).entity
    }

    fn entity_mut(self, graph: &mut TemporalGraph) -> &mut TemporalEntity {
        &mut graph.edge_mut(self).entity
    }
}
