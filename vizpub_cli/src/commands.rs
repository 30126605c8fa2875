//! Subcommand implementations behind the `vizpub` binary.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use vizpub_core::{GraphSink, OverlayAssembler, OverlayConfig, OverlayMode};
use vizpub_env::{CollectorSummary, ReportStore};

use crate::exporter::{BuildSummary, JsonExporter};
use crate::synthetic::{self, GossipConfig};

/// Options of `vizpub build`.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub reports: PathBuf,
    pub protocol: String,
    pub mode: String,
    pub message: Option<String>,
    pub profile: Option<PathBuf>,
    pub output: PathBuf,
}

/// Resolves `--mode` and `--message` into an overlay mode.
///
/// `--mode` also accepts the `dissemination:<id>` form, which cannot be
/// combined with `--message`.
pub fn overlay_mode(mode: &str, message: Option<&str>) -> Result<OverlayMode> {
    match (mode.to_lowercase().as_str(), message) {
        ("dissemination", Some(id)) => Ok(OverlayMode::dissemination(id)),
        (_, Some(_)) => bail!(
            "--message is only valid with bare --mode dissemination, got --mode {}",
            mode
        ),
        _ => mode.parse::<OverlayMode>().map_err(|e| anyhow::anyhow!(e)),
    }
}

/// Loads an attribute profile file, or the preset for `mode`.
pub fn overlay_config(profile: Option<&Path>, mode: &OverlayMode) -> Result<OverlayConfig> {
    let Some(path) = profile else {
        return Ok(OverlayConfig::for_mode(mode));
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid profile {}", path.display()))
}

/// Builds one overlay from a report store and exports it.
///
/// Nothing is written when any report fails to load.
pub fn build(options: &BuildOptions) -> Result<BuildSummary> {
    let mode = overlay_mode(&options.mode, options.message.as_deref())?;
    let config = overlay_config(options.profile.as_deref(), &mode)?;

    let store = ReportStore::new(&options.reports);
    let reports = store
        .reports(&options.protocol)
        .with_context(|| format!("Cannot open reports for {}", options.protocol))?;

    let overlay = OverlayAssembler::build(mode, config, reports)
        .with_context(|| format!("Failed to build overlay for {}", options.protocol))?;

    let mut exporter = JsonExporter::new(&options.output);
    exporter
        .write_overlay(&overlay)
        .with_context(|| format!("Failed to write {}", options.output.display()))?;

    Ok(BuildSummary::new(&overlay, &options.output))
}

/// Generates a synthetic run into a report store.
pub async fn generate(config: &GossipConfig, out: &Path) -> Result<CollectorSummary> {
    info!(
        "Generating {} intervals of {} with seed {}",
        config.intervals, config.protocol, config.seed
    );
    let summary = synthetic::publish_run(config, out)
        .await
        .with_context(|| format!("Failed to generate reports into {}", out.display()))?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mode_resolution() {
        assert_eq!(overlay_mode("structural", None).unwrap(), OverlayMode::Structural);
        assert_eq!(
            overlay_mode("dissemination", Some("3")).unwrap(),
            OverlayMode::dissemination("3")
        );
        assert_eq!(
            overlay_mode("dissemination:3", None).unwrap(),
            OverlayMode::dissemination("3")
        );
        assert!(overlay_mode("dissemination", None).is_err());
        assert!(overlay_mode("structural", Some("3")).is_err());
        assert!(overlay_mode("dissemination:3", Some("4")).is_err());
        assert!(overlay_mode("dissemination:3", Some("3")).is_err());
    }

    #[test]
    fn test_profile_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, r#"{"node_profile": {"kb_sent": true}}"#).unwrap();

        let config = overlay_config(Some(&path), &OverlayMode::Structural).unwrap();
        assert!(config.node_profile.kb_sent);
        assert!(!config.node_profile.topics);

        assert!(overlay_config(Some(&dir.path().join("missing.json")), &OverlayMode::Structural).is_err());
    }

    #[tokio::test]
    async fn test_generate_then_build() {
        let dir = TempDir::new().unwrap();
        let config = GossipConfig {
            nodes: 10,
            intervals: 5,
            ..Default::default()
        };
        generate(&config, &dir.path().join("reports")).await.unwrap();

        let structural = BuildOptions {
            reports: dir.path().join("reports"),
            protocol: config.protocol.clone(),
            mode: "structural".to_string(),
            message: None,
            profile: None,
            output: dir.path().join("structural.json"),
        };
        let summary = build(&structural).unwrap();
        assert_eq!(summary.intervals, 5);
        assert_eq!(summary.boundary, 5);
        assert!(summary.nodes > 0);
        assert!(structural.output.exists());

        // Message "0" is published in the first interval
        let dissemination = BuildOptions {
            mode: "dissemination".to_string(),
            message: Some("0".to_string()),
            output: dir.path().join("dissemination.json"),
            ..structural.clone()
        };
        let summary = build(&dissemination).unwrap();
        assert_eq!(summary.intervals, 1);
        assert!(dissemination.output.exists());
    }

    #[test]
    fn test_build_fails_without_reports() {
        let dir = TempDir::new().unwrap();
        let options = BuildOptions {
            reports: dir.path().to_path_buf(),
            protocol: "none".to_string(),
            mode: "structural".to_string(),
            message: None,
            profile: None,
            output: dir.path().join("out.json"),
        };
        assert!(build(&options).is_err());
        assert!(!options.output.exists());
    }
}
