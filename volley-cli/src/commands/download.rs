//! Download command handler
//!
//! Drives the save-files task scenario against the resume download service.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use volley_core::domain::task::SaveMode;
use volley_core::schedule::{Stage, parse_duration};
use volley_runner::config::{DownloadConfig, DownloadLimits, parse_file_list};
use volley_runner::metrics::MetricsRegistry;
use volley_runner::run_scenario;
use volley_runner::scenario::DownloadScenario;

use crate::commands::finish;
use crate::config::RunOptions;

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Download service base URL
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:8080")]
    pub base_url: String,

    #[arg(long, env = "SPACE_ID", default_value = "1")]
    pub space_id: String,

    #[arg(long, env = "USER_ID", default_value = "1")]
    pub user_id: String,

    /// Repository to save files from, as owner/name
    #[arg(long, env = "REPOSITORY", default_value = "test-user/test-repo-100")]
    pub repository: String,

    #[arg(long, env = "BRANCH", default_value = "main")]
    pub branch: String,

    /// Save mode: async, serial or zip
    #[arg(long = "mode", env = "TEST", default_value = "async")]
    pub mode: SaveMode,

    #[arg(long, env = "MIN_FILES", default_value_t = 1)]
    pub min_files: usize,

    #[arg(long, env = "MAX_FILES", default_value_t = 100)]
    pub max_files: usize,

    /// File with one repository path per line; defaults to the generated dummy set
    #[arg(long)]
    pub files_from: Option<PathBuf>,

    /// Seconds between status polls
    #[arg(long, env = "POLL_INTERVAL", default_value_t = 5)]
    pub poll_interval: u64,

    #[arg(long, env = "MAX_POLLS", default_value_t = 60)]
    pub max_polls: u32,

    #[arg(long, env = "STATUS_CHECK_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub status_timeout: Duration,

    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub request_timeout: Duration,

    /// Failed/requested ratio above which a completion counts as partial
    #[arg(long, default_value_t = 0.1)]
    pub failure_threshold: f64,

    #[arg(long, env = "WARMUP_DURATION", default_value = "1m", value_parser = parse_duration)]
    pub warmup_duration: Duration,
    #[arg(long, env = "WARMUP_TARGET", default_value_t = 1)]
    pub warmup_target: usize,

    #[arg(long, env = "SMALL_LOAD_DURATION", default_value = "2m", value_parser = parse_duration)]
    pub small_load_duration: Duration,
    #[arg(long, env = "SMALL_LOAD_TARGET", default_value_t = 10)]
    pub small_load_target: usize,

    #[arg(long, env = "MEDIUM_LOAD_DURATION", default_value = "2m", value_parser = parse_duration)]
    pub medium_load_duration: Duration,
    #[arg(long, env = "MEDIUM_LOAD_TARGET", default_value_t = 50)]
    pub medium_load_target: usize,

    #[arg(long, env = "HEAVY_LOAD_DURATION", default_value = "3m", value_parser = parse_duration)]
    pub heavy_load_duration: Duration,
    #[arg(long, env = "HEAVY_LOAD_TARGET", default_value_t = 100)]
    pub heavy_load_target: usize,

    #[arg(long, env = "STRESS_LOAD_DURATION", default_value = "2m", value_parser = parse_duration)]
    pub stress_load_duration: Duration,
    #[arg(long, env = "STRESS_LOAD_TARGET", default_value_t = 200)]
    pub stress_load_target: usize,

    #[arg(long, env = "COOLDOWN_DURATION", default_value = "1m", value_parser = parse_duration)]
    pub cooldown_duration: Duration,

    /// p(95) response time limit in milliseconds
    #[arg(long, env = "MAX_RESPONSE_TIME", default_value_t = 10_000)]
    pub max_response_time: u64,

    #[arg(long, env = "MAX_ERROR_RATE", default_value_t = 0.05)]
    pub max_error_rate: f64,

    /// p(90) task completion limit in milliseconds
    #[arg(long, env = "MAX_TASK_COMPLETION_TIME", default_value_t = 300_000)]
    pub max_task_completion_time: u64,
}

impl DownloadArgs {
    /// Warmup, five load legs and the cooldown back to zero
    pub fn stages(&self) -> Vec<Stage> {
        vec![
            Stage::new(self.warmup_duration, self.warmup_target),
            Stage::new(self.small_load_duration, self.small_load_target),
            Stage::new(self.medium_load_duration, self.medium_load_target),
            Stage::new(self.heavy_load_duration, self.heavy_load_target),
            Stage::new(self.stress_load_duration, self.stress_load_target),
            Stage::new(self.cooldown_duration, 0),
        ]
    }

    pub fn to_config(&self) -> Result<DownloadConfig> {
        let defaults = DownloadConfig::default();
        let files = match &self.files_from {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read file list {}", path.display()))?;
                parse_file_list(&contents)
            }
            None => defaults.files,
        };

        Ok(DownloadConfig {
            base_url: self.base_url.clone(),
            space_id: self.space_id.clone(),
            user_id: self.user_id.clone(),
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            mode: self.mode,
            min_files: self.min_files,
            max_files: self.max_files,
            files,
            poll_interval: Duration::from_secs(self.poll_interval),
            max_polls: self.max_polls,
            status_timeout: self.status_timeout,
            request_timeout: self.request_timeout,
            failure_threshold: self.failure_threshold,
            limits: DownloadLimits {
                max_response_time: Duration::from_millis(self.max_response_time),
                max_error_rate: self.max_error_rate,
                max_task_completion_time: Duration::from_millis(self.max_task_completion_time),
            },
        })
    }
}

/// Handle the download command
///
/// # Arguments
/// * `args` - Download scenario arguments
/// * `options` - Shared run options
pub async fn handle_download_command(args: DownloadArgs, options: &RunOptions) -> Result<()> {
    let config = args.to_config()?;
    config.validate().context("Invalid download configuration")?;

    let executor = options.executor(args.stages())?;
    let thresholds = options.thresholds(config.thresholds())?;

    println!(
        "{} {} against {}",
        "▸".cyan(),
        config.mode.test_name().bold(),
        config.base_url
    );

    let registry = Arc::new(MetricsRegistry::new());
    let scenario = Arc::new(DownloadScenario::new(config, Arc::clone(&registry)));
    let report = run_scenario(scenario, executor, registry, &thresholds).await?;

    finish(&report.summary, options)
}
