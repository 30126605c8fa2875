//! VizPub Environment - Report Ingestion Layer
//!
//! Everything between the reporting participants and the overlay assembler:
//! - Participants push per-interval [`ReportFragment`]s through a
//!   [`ReportTransport`] into a bounded queue
//! - A single [`Collector`] numbers them per (protocol, participant) with a
//!   [`CheckpointCounter`] and writes them to a [`ReportStore`]
//! - The store reads them back as a lazy stream of merged interval reports
//!
//! # Example
//!
//! ```ignore
//! use vizpub_core::{OverlayAssembler, OverlayConfig, OverlayMode};
//! use vizpub_env::ReportStore;
//!
//! let store = ReportStore::new("reports");
//! let overlay = OverlayAssembler::build(
//!     OverlayMode::Structural,
//!     OverlayConfig::structural(),
//!     store.reports("cyclon")?,
//! )?;
//! ```

mod checkpoint;
mod collector;
mod error;
mod store;
mod transport;
mod types;

pub use checkpoint::CheckpointCounter;
pub use collector::{Collector, CollectorConfig, CollectorSummary};
pub use error::IngestError;
pub use store::{FragmentFile, ReportStore, ReportStream};
pub use transport::{FragmentSender, ReportTransport};
pub use types::{ParticipantId, ReportFragment};
