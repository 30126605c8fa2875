//! VizPub command-line harness
//!
//! Builds overlays from a report store and exports them as JSON, and can
//! generate a synthetic churning gossip run to feed them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  fragments  ┌───────────┐  files  ┌─────────────┐
//! │ Participants │────────────►│ Collector │────────►│ ReportStore │
//! │ (synthetic)  │  (bounded)  └───────────┘         └──────┬──────┘
//! └──────────────┘                                          │ merged reports
//!                                                    ┌──────▼──────────┐
//!                                                    │ OverlayAssembler │
//!                                                    └──────┬──────────┘
//!                                                           │ Overlay
//!                                                    ┌──────▼──────┐
//!                                                    │ JsonExporter │
//!                                                    └─────────────┘
//! ```

pub mod commands;
mod exporter;
mod synthetic;

pub use exporter::{BuildSummary, JsonExporter, OverlayExport};
pub use synthetic::{fragment_of, publish_run, GossipConfig, GossipSimulator};
