//! Contest command handler
//!
//! Drives the contest-listing scenario and prints the performance report
//! alongside the summary.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::sync::Arc;
use volley_runner::config::ContestConfig;
use volley_runner::metrics::MetricsRegistry;
use volley_runner::run_scenario;
use volley_runner::scenario::{ContestReport, ContestScenario, Grade};

use crate::commands::finish;
use crate::config::RunOptions;

#[derive(Args, Debug)]
pub struct ContestArgs {
    /// Contest API base URL
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:9040")]
    pub base_url: String,

    #[arg(long, env = "SPACE_ID", default_value = "1")]
    pub space_id: String,
}

impl ContestArgs {
    pub fn to_config(&self) -> ContestConfig {
        ContestConfig {
            base_url: self.base_url.clone(),
            space_id: self.space_id.clone(),
            ..ContestConfig::default()
        }
    }
}

/// Handle the contest command
///
/// # Arguments
/// * `args` - Contest scenario arguments
/// * `options` - Shared run options
pub async fn handle_contest_command(args: ContestArgs, options: &RunOptions) -> Result<()> {
    let config = args.to_config();
    config.validate().context("Invalid contest configuration")?;

    let executor = options.executor(ContestConfig::default_stages())?;
    let thresholds = options.thresholds(config.thresholds())?;

    println!(
        "{} Contest list API at {} (space {})",
        "▸".cyan(),
        config.base_url,
        config.space_id
    );

    let registry = Arc::new(MetricsRegistry::new());
    let scenario = Arc::new(ContestScenario::new(config, Arc::clone(&registry)));
    let report = run_scenario(scenario, executor, Arc::clone(&registry), &thresholds).await?;

    print_contest_report(&ContestReport::from_run(&registry, &report.stats));
    finish(&report.summary, options)
}

fn print_contest_report(report: &ContestReport) {
    println!();
    println!("{}", "Performance Report".bold());
    println!("  {}", report.headline());
    println!();
    println!("  Total requests:   {}", report.total_requests);
    println!("  Success rate:     {:.2}%", report.success_pct);
    println!("  Throughput:       {:.2} req/s", report.requests_per_sec);
    println!("  HTTP failures:    {:.2}%", report.http_fail_pct);
    println!();
    println!("  Avg response:     {}", colorize_grade(report.response_avg_grade));
    println!("  P95 response:     {}", colorize_grade(report.response_p95_grade));
    println!("  Stability:        {}", colorize_grade(report.stability_grade));
    println!("  Throughput:       {}", colorize_grade(report.throughput_grade));

    if !report.recommendations.is_empty() {
        println!();
        println!("{}", "Recommendations:".bold());
        for line in &report.recommendations {
            println!("  {} {}", "•".cyan(), line);
        }
    }
}

/// Colorize a grade for display
fn colorize_grade(grade: Grade) -> ColoredString {
    let label = format!("{:?}", grade);
    match grade {
        Grade::Excellent => label.green().bold(),
        Grade::Good => label.green(),
        Grade::Fair => label.yellow(),
        Grade::Poor => label.red(),
    }
}
