//! Per-interval global scalars
//! ===========================
//!
//! Computed from the raw report, not from the temporal graph:
//! - **Hit ratio**: fraction of a topic's subscribers that received a
//!   publication, with the publisher counted as an implicit recipient,
//!   averaged over all publications of the interval.
//! - **Path length**: hop counts over all received-publication records.
//!
//! Every derivation is guarded: an interval with no publications or no
//! received records yields `0`, never a division by zero.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::graph::Interval;
use crate::report::{Publication, Report};

/// Scalars derived for one interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalScalars {
    /// Timeline coordinate the scalars belong to
    pub interval: Interval,
    /// Mean per-publication hit ratio [0, 1]
    pub hit_ratio: f64,
    /// Mean hit ratio per topic
    pub hit_ratio_by_topic: BTreeMap<String, f64>,
    pub max_path_length: u32,
    pub min_path_length: u32,
    /// Mean over messages of each message's longest hop count
    pub average_path_length: f64,
    /// Number of publications injected this interval
    pub publications: usize,
}

impl IntervalScalars {
    pub fn compute(report: &Report, interval: Interval) -> Self {
        Self {
            interval,
            hit_ratio: hit_ratio(report),
            hit_ratio_by_topic: hit_ratio_by_topic(report),
            max_path_length: max_path_length(report),
            min_path_length: min_path_length(report),
            average_path_length: average_path_length(report),
            publications: report.publications.len(),
        }
    }
}

// =============================================================================
// HIT RATIO
// =============================================================================

/// Hit ratio of a single publication.
///
/// Counts subscribers of the publication's topic that received it, plus one
/// for the original sender when it subscribes but did not record its own
/// message. Returns `0` when the topic has no subscribers.
pub fn publication_hit_ratio(report: &Report, publication: &Publication) -> f64 {
    let subscribers: Vec<_> = report
        .nodes
        .values()
        .filter(|n| n.subscribes_to(&publication.topic_id))
        .collect();

    if subscribers.is_empty() {
        return 0.0;
    }

    let mut hits = subscribers
        .iter()
        .filter(|n| n.received_publication(&publication.msg_id))
        .count();

    let publisher_credit = match report.node(&publication.original_sender_id) {
        Some(sender) => {
            sender.subscribes_to(&publication.topic_id)
                && !sender.received_publication(&publication.msg_id)
        }
        None => false,
    };
    if publisher_credit {
        hits += 1;
    }

    hits as f64 / subscribers.len() as f64
}

/// Mean hit ratio over all publications of the interval; `0` if none.
pub fn hit_ratio(report: &Report) -> f64 {
    mean(
        report
            .publications
            .values()
            .map(|p| publication_hit_ratio(report, p)),
    )
}

/// Mean hit ratio per topic, over the publications on that topic.
pub fn hit_ratio_by_topic(report: &Report) -> BTreeMap<String, f64> {
    let mut per_topic: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for publication in report.publications.values() {
        per_topic
            .entry(publication.topic_id.clone())
            .or_default()
            .push(publication_hit_ratio(report, publication));
    }

    per_topic
        .into_iter()
        .map(|(topic, ratios)| (topic, mean(ratios)))
        .collect()
}

// =============================================================================
// PATH LENGTH
// =============================================================================

fn received_hops(report: &Report) -> impl Iterator<Item = &Publication> {
    report
        .nodes
        .values()
        .flat_map(|n| n.publications_received.values())
}

/// Longest hop count across all received records; `0` if none.
pub fn max_path_length(report: &Report) -> u32 {
    received_hops(report).map(|p| p.hop_count).max().unwrap_or(0)
}

/// Shortest hop count across all received records; `0` if none.
pub fn min_path_length(report: &Report) -> u32 {
    received_hops(report).map(|p| p.hop_count).min().unwrap_or(0)
}

/// Mean over messages of each message's longest hop count; `0` if none.
pub fn average_path_length(report: &Report) -> f64 {
    let mut longest: BTreeMap<&str, u32> = BTreeMap::new();
    for publication in received_hops(report) {
        let entry = longest.entry(publication.msg_id.as_str()).or_insert(0);
        *entry = (*entry).max(publication.hop_count);
    }
    mean(longest.values().map(|h| *h as f64))
}

/// Topics that saw at least one publication this interval.
pub fn published_topics(report: &Report) -> BTreeSet<&str> {
    report
        .publications
        .values()
        .map(|p| p.topic_id.as_str())
        .collect()
}

fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::NodeSnapshot;
    use approx::assert_relative_eq;

    fn scenario_b() -> Report {
        let p = Publication::new("P", "T", "A");
        Report::new(0, "test", 0)
            .with_node(NodeSnapshot::new("A").with_topics(["T"]).with_sent(p.clone()))
            .with_node(NodeSnapshot::new("B").with_topics(["T"]).with_received(p.incremented()))
            .with_node(
                NodeSnapshot::new("C")
                    .with_topics(["T"])
                    .with_received(p.incremented().incremented()),
            )
            .with_node(NodeSnapshot::new("D").with_topics(["other"]))
            .with_publication(p)
    }

    #[test]
    fn test_publisher_counts_as_recipient() {
        let report = scenario_b();
        assert_relative_eq!(hit_ratio(&report), 1.0);
    }

    #[test]
    fn test_publisher_not_counted_twice() {
        let p = Publication::new("P", "T", "A");
        let report = Report::new(0, "test", 0)
            .with_node(NodeSnapshot::new("A").with_topics(["T"]).with_received(p.clone()))
            .with_node(NodeSnapshot::new("B").with_topics(["T"]))
            .with_publication(p);

        assert_relative_eq!(hit_ratio(&report), 0.5);
    }

    #[test]
    fn test_no_publications_is_zero() {
        let report = Report::new(0, "test", 0).with_node(NodeSnapshot::new("A").with_topics(["T"]));
        assert_relative_eq!(hit_ratio(&report), 0.0);
        assert!(hit_ratio_by_topic(&report).is_empty());
        assert_eq!(max_path_length(&report), 0);
        assert_eq!(min_path_length(&report), 0);
        assert_relative_eq!(average_path_length(&report), 0.0);
    }

    #[test]
    fn test_topic_without_subscribers_is_zero() {
        let report = Report::new(0, "test", 0)
            .with_node(NodeSnapshot::new("A"))
            .with_publication(Publication::new("P", "nobody", "A"));
        assert_relative_eq!(hit_ratio(&report), 0.0);
    }

    #[test]
    fn test_mean_over_publications_and_topics() {
        let p = Publication::new("P", "T", "X");
        let q = Publication::new("Q", "U", "X");
        let report = Report::new(0, "test", 0)
            .with_node(NodeSnapshot::new("A").with_topics(["T", "U"]).with_received(p.clone()))
            .with_node(NodeSnapshot::new("B").with_topics(["T", "U"]))
            .with_publication(p)
            .with_publication(q);

        // P: 1/2, Q: 0/2
        assert_relative_eq!(hit_ratio(&report), 0.25);
        let by_topic = hit_ratio_by_topic(&report);
        assert_relative_eq!(by_topic["T"], 0.5);
        assert_relative_eq!(by_topic["U"], 0.0);
        assert_eq!(published_topics(&report).len(), 2);
    }

    #[test]
    fn test_path_lengths() {
        let report = scenario_b();
        assert_eq!(max_path_length(&report), 2);
        assert_eq!(min_path_length(&report), 1);
        // Single message, longest path 2
        assert_relative_eq!(average_path_length(&report), 2.0);

        let scalars = IntervalScalars::compute(&report, 7);
        assert_eq!(scalars.interval, 7);
        assert_eq!(scalars.publications, 1);
        assert_relative_eq!(scalars.hit_ratio_by_topic["T"], 1.0);
    }
}
