//! VizPub CLI
//!
//! Build temporal overlays from collected reports, or generate a synthetic run.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use vizpub_cli::commands::{self, BuildOptions};
use vizpub_cli::GossipConfig;

/// VizPub temporal overlay builder
#[derive(Parser, Debug)]
#[command(name = "vizpub")]
#[command(about = "Reconstruct temporal pub/sub overlays from interval reports", long_about = None)]
struct Args {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an overlay from a report directory
    Build {
        /// Report store root
        #[arg(short, long)]
        reports: PathBuf,

        /// Protocol whose reports to read
        #[arg(short, long)]
        protocol: String,

        /// Overlay mode (structural, dissemination)
        #[arg(short, long, default_value = "structural")]
        mode: String,

        /// Message id to trace (dissemination mode)
        #[arg(long)]
        message: Option<String>,

        /// JSON attribute profile file
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// JSON summary for scripting
        #[arg(long)]
        json: bool,
    },

    /// Generate a synthetic churning gossip run
    Generate {
        /// Report store root to write into
        #[arg(long)]
        out: PathBuf,

        /// Master seed for determinism
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Number of nodes
        #[arg(short, long, default_value = "20")]
        nodes: usize,

        /// Number of reporting intervals
        #[arg(short, long, default_value = "10")]
        intervals: u64,

        /// Participants the nodes are split across
        #[arg(long, default_value = "3")]
        participants: usize,

        /// Protocol name
        #[arg(short, long, default_value = "gossip")]
        protocol: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match args.command {
        Command::Build {
            reports,
            protocol,
            mode,
            message,
            profile,
            output,
            json,
        } => {
            let options = BuildOptions {
                reports,
                protocol,
                mode,
                message,
                profile,
                output,
            };
            let summary = commands::build(&options)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                info!(
                    "✓ {} overlay for {}: {} nodes, {} edges, {} intervals",
                    summary.mode, summary.protocol, summary.nodes, summary.edges, summary.intervals
                );
                info!("Mean hit ratio: {:.3}", summary.mean_hit_ratio);
            }
        }
        Command::Generate {
            out,
            seed,
            nodes,
            intervals,
            participants,
            protocol,
        } => {
            let config = GossipConfig {
                seed,
                nodes,
                intervals,
                participants,
                protocol,
                ..Default::default()
            };
            let summary = commands::generate(&config, &out).await?;
            info!(
                "✓ Wrote {} fragments to {}",
                summary.written,
                out.display()
            );
        }
    }

    Ok(())
}
