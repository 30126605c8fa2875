//! Entity lifecycle tracking - alive/dead bookkeeping with spells.
//!
//! One tracker is used per entity kind (nodes, edges). Each interval the
//! tracker is told the full set of ids present; it opens, extends and closes
//! spells accordingly:
//!
//! ```text
//! Unseen ──present──► Alive ──absent──► Dead ──present──► Alive ... ──finalize──► Finalized
//! ```
//!
//! Dead entities are retained so a reappearance links to the same entity
//! instead of creating a new one. Entities materialized by the dissemination
//! animator are *pinned*: they never die again.

use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::error::OverlayError;
use crate::graph::{EntityHandle, Interval, TemporalGraph};

/// Registry state of a seen entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState<H> {
    /// Owns exactly one open (or provisionally extended) spell
    Alive { handle: H, pinned: bool },
    /// Last spell closed; kept for reappearance
    Dead { handle: H },
}

impl<H: Copy> EntityState<H> {
    pub fn handle(&self) -> H {
        match self {
            EntityState::Alive { handle, .. } | EntityState::Dead { handle } => *handle,
        }
    }
}

/// Externally visible lifecycle phase of an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unseen,
    Alive,
    Dead,
    Finalized,
}

/// What happened to a present id during one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First sighting; new entity and spell
    Created,
    /// Was dead; new spell opened
    Revived,
    /// Was alive; spell extended
    Extended,
}

/// One present id and what the tracker did with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed<H> {
    pub id: String,
    pub handle: H,
    pub transition: Transition,
}

/// Alive/dead registry for one entity kind.
#[derive(Debug)]
pub struct LifecycleTracker<H> {
    /// Entity kind, for logs and errors
    kind: &'static str,

    /// Every entity ever seen, keyed by id
    registry: HashMap<String, EntityState<H>>,

    /// Ids currently alive (absence detection walks only these)
    alive: BTreeSet<String>,

    finalized: bool,
}

impl<H: EntityHandle> LifecycleTracker<H> {
    /// Creates an empty tracker for the named entity kind.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            registry: HashMap::new(),
            alive: BTreeSet::new(),
            finalized: false,
        }
    }

    /// Folds one interval's full presence set into the registry.
    ///
    /// Present ids are processed in iteration order; `create` is called for
    /// ids never seen before and must return the new entity's handle. Every
    /// alive, unpinned id missing from `present` has its spell closed at
    /// `interval` and moves to the dead registry.
    pub fn observe<I, S, F>(
        &mut self,
        graph: &mut TemporalGraph,
        present: I,
        interval: Interval,
        mut create: F,
    ) -> Result<Vec<Observed<H>>, OverlayError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnMut(&mut TemporalGraph, &str) -> Result<H, OverlayError>,
    {
        self.check_open()?;

        let mut observed = Vec::new();
        let mut present_ids = HashSet::new();

        for id in present {
            let id = id.as_ref();
            if !present_ids.insert(id.to_string()) {
                continue;
            }

            let (handle, transition) = match self.registry.get(id).copied() {
                Some(EntityState::Dead { handle }) => {
                    handle.entity_mut(graph).add_spell(interval, None)?;
                    (handle, Transition::Revived)
                }
                Some(EntityState::Alive { handle, pinned }) => {
                    handle.entity_mut(graph).extend_last_spell(interval + 1);
                    self.registry
                        .insert(id.to_string(), EntityState::Alive { handle, pinned });
                    observed.push(Observed {
                        id: id.to_string(),
                        handle,
                        transition: Transition::Extended,
                    });
                    continue;
                }
                None => {
                    let handle = create(graph, id)?;
                    handle.entity_mut(graph).add_spell(interval, None)?;
                    (handle, Transition::Created)
                }
            };

            self.registry.insert(
                id.to_string(),
                EntityState::Alive {
                    handle,
                    pinned: false,
                },
            );
            self.alive.insert(id.to_string());
            observed.push(Observed {
                id: id.to_string(),
                handle,
                transition,
            });
        }

        let gone: Vec<String> = self
            .alive
            .iter()
            .filter(|id| !present_ids.contains(id.as_str()))
            .filter(|id| {
                !matches!(
                    self.registry.get(id.as_str()),
                    Some(EntityState::Alive { pinned: true, .. })
                )
            })
            .cloned()
            .collect();

        for id in gone {
            if let Some(state) = self.registry.get_mut(&id) {
                let handle = state.handle();
                handle.entity_mut(graph).close_last_spell(interval)?;
                *state = EntityState::Dead { handle };
            }
            self.alive.remove(&id);
            debug!("{} {} died at {}", self.kind, id, interval);
        }

        Ok(observed)
    }

    /// Makes `id` alive at `at` and pins it so it never dies again.
    ///
    /// Used by dissemination materialization, which only ever grows the graph.
    /// An entity whose spell was closed exactly at `at` has that spell
    /// re-opened instead of getting an adjacent one.
    pub fn ensure_alive<F>(
        &mut self,
        graph: &mut TemporalGraph,
        id: &str,
        at: Interval,
        create: F,
    ) -> Result<Observed<H>, OverlayError>
    where
        F: FnOnce(&mut TemporalGraph, &str) -> Result<H, OverlayError>,
    {
        self.check_open()?;

        let (handle, transition) = match self.registry.get(id).copied() {
            Some(EntityState::Alive { handle, .. }) => {
                handle.entity_mut(graph).extend_last_spell(at + 1);
                (handle, Transition::Extended)
            }
            Some(EntityState::Dead { handle }) => {
                // Died at this very step: continue the same spell
                let entity = handle.entity_mut(graph);
                if !entity.reopen_last_spell(at) {
                    entity.add_spell(at, None)?;
                }
                (handle, Transition::Revived)
            }
            None => {
                let handle = create(graph, id)?;
                handle.entity_mut(graph).add_spell(at, None)?;
                (handle, Transition::Created)
            }
        };

        self.registry
            .insert(id.to_string(), EntityState::Alive { handle, pinned: true });
        self.alive.insert(id.to_string());

        Ok(Observed {
            id: id.to_string(),
            handle,
            transition,
        })
    }

    /// Closes every still-alive spell at `boundary`. Callable exactly once.
    pub fn finalize(&mut self, graph: &mut TemporalGraph, boundary: Interval) -> Result<(), OverlayError> {
        self.check_open()?;

        for id in &self.alive {
            if let Some(state) = self.registry.get(id) {
                state.handle().entity_mut(graph).close_last_spell(boundary)?;
            }
        }
        self.finalized = true;

        debug!(
            "Finalized {} {}s ({} alive) at {}",
            self.registry.len(),
            self.kind,
            self.alive.len(),
            boundary
        );
        Ok(())
    }

    fn check_open(&self) -> Result<(), OverlayError> {
        if self.finalized {
            Err(OverlayError::AlreadyFinalized(self.kind.to_string()))
        } else {
            Ok(())
        }
    }

    /// Handle of a seen entity, alive or dead.
    pub fn handle(&self, id: &str) -> Option<H> {
        self.registry.get(id).map(|s| s.handle())
    }

    pub fn state(&self, id: &str) -> Option<&EntityState<H>> {
        self.registry.get(id)
    }

    pub fn lifecycle(&self, id: &str) -> Lifecycle {
        match self.registry.get(id) {
            None => Lifecycle::Unseen,
            Some(_) if self.finalized => Lifecycle::Finalized,
            Some(EntityState::Alive { .. }) => Lifecycle::Alive,
            Some(EntityState::Dead { .. }) => Lifecycle::Dead,
        }
    }

    pub fn is_alive(&self, id: &str) -> bool {
        self.alive.contains(id)
    }

    pub fn alive_ids(&self) -> impl Iterator<Item = &String> {
        self.alive.iter()
    }

    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    pub fn dead_count(&self) -> usize {
        self.registry.len() - self.alive.len()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}
