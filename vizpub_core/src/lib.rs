//! VizPub Core - Temporal Overlay Reconstruction
//!
//! Rebuilds one time-evolving graph of a publish/subscribe overlay from an
//! ordered sequence of per-interval reports:
//! 1. **Lifecycle**: nodes and edges get non-overlapping validity spells that
//!    follow churn (death, reappearance) across intervals
//! 2. **Timelines**: attribute values are timestamped per a fixed profile
//! 3. **Dissemination**: a single message's propagation is replayed in hop
//!    order, independent of the interval the relay was reported in
//!
//! Everything here is synchronous and single-threaded; ingestion and
//! transport live in `vizpub_env`.

pub mod animator;
pub mod assembler;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod metrics;
pub mod report;
pub mod timeline;

// Re-export key types for convenience
pub use animator::DisseminationAnimator;
pub use assembler::{GraphSink, Overlay, OverlayAssembler, OverlayConfig, OverlayMode};
pub use error::OverlayError;
pub use graph::{EdgeHandle, Interval, NodeHandle, Spell, TemporalEdge, TemporalEntity, TemporalGraph};
pub use lifecycle::{Lifecycle, LifecycleTracker, Transition};
pub use metrics::IntervalScalars;
pub use report::{EdgeSnapshot, NodeSnapshot, Publication, Report};
pub use timeline::{AttributeValue, EdgeAttributeProfile, NodeAttributeProfile, Timeline, TimelineWriter};
