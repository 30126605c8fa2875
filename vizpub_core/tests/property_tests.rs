//! Property-based tests for overlay reconstruction.
//!
//! These tests verify invariants that hold for any report sequence:
//! - Spells are strictly increasing, non-overlapping and closed after a build
//! - One spell per maximal run of presence (closure happens exactly once)
//! - Dissemination edges appear at their earliest `interval + hops` step

use proptest::prelude::*;
use std::collections::BTreeMap;
use vizpub_core::{
    EdgeSnapshot, NodeSnapshot, OverlayAssembler, OverlayConfig, OverlayError, OverlayMode,
    Publication, Report, Spell,
};

const NODES: usize = 5;

fn node_id(i: usize) -> String {
    format!("n{}", i)
}

/// Every present node lists every other node as neighbour.
fn mesh_report(interval: u64, presence: &[bool]) -> Report {
    let present: Vec<String> = (0..NODES).filter(|i| presence[*i]).map(node_id).collect();
    let mut report = Report::new(0, "mesh", interval);
    for id in &present {
        let others = present.iter().filter(|o| *o != id).map(String::as_str);
        report = report.with_node(NodeSnapshot::new(id).with_topics(["t"]).with_neighbors(others));
    }
    report
}

fn assert_well_formed(spells: &[Spell], boundary: u64) -> Result<(), TestCaseError> {
    for spell in spells {
        let end = spell.end;
        prop_assert!(end.is_some(), "open spell after build: {:?}", spell);
        prop_assert!(spell.start < end.unwrap_or(0));
        prop_assert!(end.unwrap_or(0) <= boundary);
    }
    for pair in spells.windows(2) {
        prop_assert!(pair[0].end.unwrap_or(u64::MAX) <= pair[1].start, "overlap: {:?}", pair);
    }
    Ok(())
}

/// Number of maximal runs of `true`.
fn runs(flags: impl Iterator<Item = bool>) -> usize {
    let mut count = 0;
    let mut previous = false;
    for flag in flags {
        if flag && !previous {
            count += 1;
        }
        previous = flag;
    }
    count
}

mod structural_props {
    use super::*;

    fn arb_presence() -> impl Strategy<Value = Vec<Vec<bool>>> {
        prop::collection::vec(prop::collection::vec(any::<bool>(), NODES), 1..12)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn spells_follow_presence(presence in arb_presence()) {
            let reports: Vec<Result<Report, OverlayError>> = presence
                .iter()
                .enumerate()
                .map(|(r, p)| Ok(mesh_report(r as u64, p)))
                .collect();

            let overlay = OverlayAssembler::build(
                OverlayMode::Structural,
                OverlayConfig::structural(),
                reports,
            ).unwrap();
            prop_assert_eq!(overlay.boundary, presence.len() as u64);

            for i in 0..NODES {
                let Some(node) = overlay.graph.find_node(&node_id(i)) else {
                    prop_assert!(presence.iter().all(|p| !p[i]));
                    continue;
                };
                assert_well_formed(&node.spells, overlay.boundary)?;
                prop_assert_eq!(node.spells.len(), runs(presence.iter().map(|p| p[i])));
                for (r, p) in presence.iter().enumerate() {
                    prop_assert_eq!(node.alive_at(r as u64), p[i], "node {} at {}", i, r);
                }
            }

            for edge in overlay.graph.edges() {
                assert_well_formed(&edge.entity.spells, overlay.boundary)?;
                let source = overlay.graph.node(edge.source);
                let target = overlay.graph.node(edge.target);
                for r in 0..presence.len() as u64 {
                    let both = source.alive_at(r) && target.alive_at(r);
                    prop_assert_eq!(edge.entity.alive_at(r), both, "edge {} at {}", edge.entity.id, r);
                }
            }
        }
    }
}

mod dissemination_props {
    use super::*;

    /// Per interval: relays (source, target, hops) carrying the traced message.
    fn arb_relays() -> impl Strategy<Value = Vec<Vec<(usize, usize, u32)>>> {
        let relay = (0..NODES, 0..NODES, 0u32..5).prop_filter("no self loops", |(s, t, _)| s != t);
        prop::collection::vec(prop::collection::vec(relay, 0..4), 1..8)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn edges_appear_at_earliest_step(relays in arb_relays()) {
            let traced = Publication::new("m", "t", "n0");
            let mut earliest: BTreeMap<String, u64> = BTreeMap::new();
            let mut reports = Vec::new();

            for (r, interval_relays) in relays.iter().enumerate() {
                let mut report = Report::new(0, "gossip", r as u64).with_publication(traced.clone());
                for (s, t, hops) in interval_relays {
                    let edge = EdgeSnapshot::between(&node_id(*s), &node_id(*t))
                        .with_publication(traced.clone().with_hop_count(*hops));
                    report = report.with_edge(edge);
                }
                // A repeated relay keeps its last hop count
                for edge in report.edges.values() {
                    let step = r as u64 + edge.publications["m"].hop_count as u64;
                    let slot = earliest.entry(edge.id.clone()).or_insert(step);
                    *slot = (*slot).min(step);
                }
                reports.push(Ok::<_, OverlayError>(report));
            }

            let overlay = OverlayAssembler::build(
                OverlayMode::dissemination("m"),
                OverlayConfig::dissemination(),
                reports,
            ).unwrap();

            prop_assert_eq!(overlay.graph.edge_count(), earliest.len());
            for edge in overlay.graph.edges() {
                // Never dies once materialized
                prop_assert_eq!(edge.entity.spells.len(), 1);
                assert_well_formed(&edge.entity.spells, overlay.boundary)?;
                let spell = edge.entity.spells[0];
                prop_assert_eq!(spell.start, earliest[&edge.entity.id]);
                prop_assert_eq!(spell.end, Some(overlay.boundary));
            }
            for node in overlay.graph.nodes() {
                assert_well_formed(&node.spells, overlay.boundary)?;
            }
        }
    }
}
