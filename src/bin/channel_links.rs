#![forbid(unsafe_code)]

//! Command-line entry point: harvests the links of a channel's video
//! descriptions and publishes them to a spreadsheet.
//!
//! Stages can be run on their own; each one leaves a JSON snapshot in the
//! snapshot directory so the next can pick up where it stopped.

use anyhow::Result;
use channel_links::config::{SettingsOverrides, resolve_settings};
use channel_links::pipeline::{self, LiveServices, RunSummary, Stage};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Harvest the outbound links of a YouTube channel into a spreadsheet.
#[derive(Debug, Parser)]
#[command(name = "channel_links", version)]
struct Args {
    /// Stages to run; all of them when omitted. They always run in the
    /// order videos, links, domains, publish.
    #[arg(value_enum)]
    stages: Vec<Stage>,

    /// Path of the `.env` file holding keys and tokens.
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Path of the TOML settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the JSON snapshots written between stages.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let settings = resolve_settings(SettingsOverrides {
        env_path: args.env_file,
        config_path: args.config,
        snapshot_dir: args.snapshot_dir,
    })?;

    let stages = pipeline::plan(&args.stages);
    println!("===================================");
    println!("Channel link harvest");
    println!("===================================");
    println!(
        "Stages: {}",
        stages
            .iter()
            .map(|stage| stage.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Snapshots: {}", settings.snapshot_dir.display());
    println!();

    let services = LiveServices::new();
    let summary = pipeline::run(&stages, &settings, &services, report_progress)?;

    println!();
    print_summary(&summary);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report_progress(stage: Stage, done: usize, total: usize) {
    let noun = match stage {
        Stage::Videos => "videos fetched",
        Stage::Domains => "links resolved",
        Stage::Links | Stage::Publish => "done",
    };
    println!("[{done}/{total}] {noun}");
}

fn print_summary(summary: &RunSummary) {
    println!("===================================");
    println!("Run complete!");
    println!("===================================");
    if let Some(videos) = summary.videos {
        println!("Videos: {videos}");
    }
    if let Some(links) = summary.links {
        println!("Links: {links}");
    }
    if let Some(domains) = summary.domains {
        println!("Resolved: {domains}");
    }
    if let Some(rows) = summary.rows_written {
        println!("Rows written: {rows}");
    }
}
