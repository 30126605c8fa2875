//! Dissemination animator - hop-ordered replay of one traced message.
//!
//! An edge carrying the traced message with hop count `h` in reporting
//! interval `r` is scheduled for animation step `r + h`. The assembler pops
//! due steps as the clock advances, and drains every remaining step once the
//! reports run out, so playback follows causal hop order instead of the
//! interval in which the reporter happened to observe the relay.

use std::collections::BTreeMap;
use tracing::debug;

use crate::graph::Interval;
use crate::report::{EdgeSnapshot, Report};

#[derive(Debug, Clone)]
pub struct DisseminationAnimator {
    message_id: String,

    /// Animation step -> edges to materialize, deduplicated by edge id
    schedule: BTreeMap<Interval, BTreeMap<String, EdgeSnapshot>>,

    /// Largest step scheduled so far
    animation_length: Option<Interval>,
}

impl DisseminationAnimator {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            schedule: BTreeMap::new(),
            animation_length: None,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Schedules every edge of `report` that carried the traced message.
    ///
    /// Returns the number of edges scheduled.
    pub fn schedule(&mut self, report: &Report, interval: Interval) -> usize {
        let mut scheduled = 0;
        for edge in report.edges.values() {
            let Some(publication) = edge.publications.get(&self.message_id) else {
                continue;
            };
            let step = interval + publication.hop_count as Interval;
            self.schedule
                .entry(step)
                .or_default()
                .entry(edge.id.clone())
                .or_insert_with(|| edge.clone());
            self.animation_length = Some(self.animation_length.map_or(step, |len| len.max(step)));
            scheduled += 1;
        }

        if scheduled > 0 {
            debug!(
                "Scheduled {} edges for message {} at interval {}",
                scheduled, self.message_id, interval
            );
        }
        scheduled
    }

    /// Removes and returns the edges due at `step`, in edge-id order.
    pub fn take_due(&mut self, step: Interval) -> Vec<EdgeSnapshot> {
        self.schedule
            .remove(&step)
            .map(|edges| edges.into_values().collect())
            .unwrap_or_default()
    }

    /// Largest animation step scheduled so far, if any.
    pub fn animation_length(&self) -> Option<Interval> {
        self.animation_length
    }

    /// Number of edges still waiting for their step.
    pub fn pending(&self) -> usize {
        self.schedule.values().map(BTreeMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Publication;

    fn relay(src: &str, dst: &str, hops: u32) -> EdgeSnapshot {
        EdgeSnapshot::between(src, dst).with_publication(Publication::new("m", "t", "a").with_hop_count(hops))
    }

    #[test]
    fn test_step_is_interval_plus_hops() {
        let mut animator = DisseminationAnimator::new("m");
        let report = Report::new(0, "test", 0)
            .with_edge(relay("a", "b", 1))
            .with_edge(relay("b", "c", 3))
            .with_edge(EdgeSnapshot::between("x", "y"));

        assert_eq!(animator.schedule(&report, 2), 2);
        assert_eq!(animator.animation_length(), Some(5));

        // Never earlier than r + h
        assert!(animator.take_due(2).is_empty());
        let due = animator.take_due(3);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "a->b");
        assert_eq!(animator.pending(), 1);
        assert_eq!(animator.take_due(5)[0].id, "b->c");
        assert_eq!(animator.pending(), 0);
    }

    #[test]
    fn test_same_edge_same_step_deduplicated() {
        let mut animator = DisseminationAnimator::new("m");
        let report = Report::new(0, "test", 0).with_edge(relay("a", "b", 1));

        animator.schedule(&report, 0);
        // Reported again one interval later with hop 0: same step
        let later = Report::new(0, "test", 1).with_edge(relay("a", "b", 0));
        animator.schedule(&later, 1);

        assert_eq!(animator.take_due(1).len(), 1);
    }

    #[test]
    fn test_untraced_message_schedules_nothing() {
        let mut animator = DisseminationAnimator::new("other");
        let report = Report::new(0, "test", 0).with_edge(relay("a", "b", 0));
        assert_eq!(animator.schedule(&report, 0), 0);
        assert_eq!(animator.animation_length(), None);
    }
}
