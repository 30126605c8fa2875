//! JSON exporter for finished overlays.
//!
//! Writes the temporal graph (nodes, edges, spells, attribute timelines)
//! together with build metadata and per-interval scalars as pretty JSON.

use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use vizpub_core::{GraphSink, Overlay};

/// Complete overlay export.
#[derive(Debug, Serialize)]
pub struct OverlayExport<'a> {
    pub creator: &'static str,
    pub node_count: usize,
    pub edge_count: usize,
    #[serde(flatten)]
    pub overlay: &'a Overlay,
}

impl<'a> OverlayExport<'a> {
    pub fn new(overlay: &'a Overlay) -> Self {
        Self {
            creator: "VizPub",
            node_count: overlay.graph.node_count(),
            edge_count: overlay.graph.edge_count(),
            overlay,
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

/// Sink writing each overlay to one JSON file.
#[derive(Debug, Clone)]
pub struct JsonExporter {
    path: PathBuf,
}

impl JsonExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GraphSink for JsonExporter {
    type Error = std::io::Error;

    fn write_overlay(&mut self, overlay: &Overlay) -> Result<(), Self::Error> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        OverlayExport::new(overlay).write_to_file(&self.path)?;
        info!(
            "Exported {} ({} nodes, {} edges) to {}",
            overlay.description,
            overlay.graph.node_count(),
            overlay.graph.edge_count(),
            self.path.display()
        );
        Ok(())
    }
}

/// Machine-readable summary of one build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub protocol: String,
    pub mode: String,
    pub intervals: u64,
    pub boundary: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation_length: Option<u64>,
    pub nodes: usize,
    pub edges: usize,
    /// Mean of the per-interval hit ratios
    pub mean_hit_ratio: f64,
    pub output: String,
}

impl BuildSummary {
    pub fn new(overlay: &Overlay, output: &Path) -> Self {
        let mean_hit_ratio = if overlay.scalars.is_empty() {
            0.0
        } else {
            overlay.scalars.iter().map(|s| s.hit_ratio).sum::<f64>() / overlay.scalars.len() as f64
        };
        Self {
            protocol: overlay.protocol_name.clone(),
            mode: overlay.mode.to_string(),
            intervals: overlay.intervals,
            boundary: overlay.boundary,
            animation_length: overlay.animation_length,
            nodes: overlay.graph.node_count(),
            edges: overlay.graph.edge_count(),
            mean_hit_ratio,
            output: output.display().to_string(),
        }
    }
}
