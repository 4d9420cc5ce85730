mod scenario;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use compass::config::{ConfigError, Layout, Settings};
use serde::Serialize;
use serde_json::json;

use crate::scenario::{Scenario, ScenarioError};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error("failed to render JSON: {0}")]
    Render(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "compass", about = "Replay and validate ROS Compass page-coordinator scenarios")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scripted scenario and print the final snapshot, scrolls and effects.
    Replay {
        scenario: PathBuf,
        /// Time to wait after the last step for pending scroll timers.
        #[arg(long, env = "COMPASS_REPLAY_SETTLE_MS", default_value_t = 1000)]
        settle_ms: u64,
    },
    /// Validate a layout file and summarize it.
    Check { layout: PathBuf },
    /// Print the settings resolved from the environment.
    Settings,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Replay { scenario, settle_ms } => run_replay(&scenario, settle_ms).await,
        Command::Check { layout } => run_check(&layout),
        Command::Settings => print_json(&Settings::from_env()),
    }
}

async fn run_replay(path: &Path, settle_ms: u64) -> Result<(), CliError> {
    let scenario = Scenario::from_json(&read(path)?)?;
    let report = scenario::replay(scenario, Settings::from_env(), Duration::from_millis(settle_ms)).await?;
    print_json(&report)
}

fn run_check(path: &Path) -> Result<(), CliError> {
    let layout = Layout::from_json(&read(path)?)?;
    let groups: Vec<_> = layout
        .groups
        .iter()
        .map(|group| {
            let items = layout.items.iter().filter(|item| item.group_id == group.id).count();
            json!({
                "id": group.id,
                "items": items,
                "dismiss_region": group.dismiss_region,
                "reconcile_scroll": group.reconcile_scroll,
                "close_on_navigate": group.close_on_navigate,
            })
        })
        .collect();
    print_json(&json!({
        "ok": true,
        "sections": layout.sections.len(),
        "groups": groups,
    }))
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read { path: path.to_path_buf(), source })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
