//! Command handlers
//!
//! One subcommand per load scenario. Each handler builds the scenario's
//! configuration, runs it and prints the summary.

mod contest;
mod download;
mod gateway;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use volley_runner::summary::RunSummary;

use crate::config::RunOptions;
pub use contest::ContestArgs;
pub use download::DownloadArgs;
pub use gateway::GatewayArgs;

#[derive(Subcommand)]
pub enum Commands {
    /// Resume-file download service: submit save-files tasks and poll them
    Download(DownloadArgs),

    /// Auth gateway: signup, login, expired-token refresh and cache behaviour
    Gateway(GatewayArgs),

    /// Contest-listing API: repeated listing requests with think time
    Contest(ContestArgs),
}

/// Handle top-level commands
///
/// Routes commands to their respective handlers.
///
/// # Arguments
/// * `command` - The command to execute
/// * `options` - Run options shared by every scenario
pub async fn handle_command(command: Commands, options: &RunOptions) -> Result<()> {
    match command {
        Commands::Download(args) => download::handle_download_command(args, options).await,
        Commands::Gateway(args) => gateway::handle_gateway_command(args, options).await,
        Commands::Contest(args) => contest::handle_contest_command(args, options).await,
    }
}

/// Prints the summary, exports it and fails when a threshold was crossed
pub(crate) fn finish(summary: &RunSummary, options: &RunOptions) -> Result<()> {
    println!();
    println!("{}", "─".repeat(80).dimmed());
    print!("{}", summary.render());
    println!("{}", "─".repeat(80).dimmed());

    if let Some(path) = &options.summary_json {
        let json = summary.to_json().context("Failed to serialize summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        println!("Summary written to {}", path.display().to_string().cyan());
    }

    if summary.passed() {
        println!("{} {}", "✓".green(), "All thresholds passed".green());
        return Ok(());
    }

    for threshold in summary.failed_thresholds() {
        println!(
            "{} {} {} (actual: {})",
            "✗".red(),
            threshold.metric.bold(),
            threshold.expression,
            threshold
                .actual
                .map_or_else(|| "-".to_string(), |v| format!("{:.4}", v))
        );
    }

    anyhow::bail!(
        "{} threshold(s) failed",
        summary.failed_thresholds().count()
    )
}
