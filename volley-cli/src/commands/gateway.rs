//! Gateway command handler
//!
//! Drives the auth gateway scenario for one of the three gateway variants.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::sync::Arc;
use volley_runner::config::{GatewayConfig, GatewayVariant};
use volley_runner::metrics::MetricsRegistry;
use volley_runner::run_scenario;
use volley_runner::scenario::GatewayScenario;

use crate::commands::finish;
use crate::config::RunOptions;

#[derive(Args, Debug)]
pub struct GatewayArgs {
    /// Gateway base URL
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:9000")]
    pub base_url: String,

    /// Gateway variant under test: complex, redis or simple
    #[arg(long, env = "TEST_TYPE", default_value = "complex")]
    pub variant: GatewayVariant,

    /// Number of accounts registered during setup
    #[arg(long, env = "ACCOUNTS", default_value_t = 100)]
    pub accounts: usize,

    #[arg(long, env = "PASSWORD", default_value = "1234")]
    pub password: String,
}

impl GatewayArgs {
    pub fn to_config(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.base_url.clone(),
            variant: self.variant,
            accounts: self.accounts,
            password: self.password.clone(),
            ..GatewayConfig::default()
        }
    }
}

/// Handle the gateway command
///
/// # Arguments
/// * `args` - Gateway scenario arguments
/// * `options` - Shared run options
pub async fn handle_gateway_command(args: GatewayArgs, options: &RunOptions) -> Result<()> {
    let config = args.to_config();
    config.validate().context("Invalid gateway configuration")?;

    let executor = options.executor(GatewayConfig::default_stages())?;
    let thresholds = options.thresholds(config.thresholds())?;

    println!(
        "{} Gateway variant {}: {}",
        "▸".cyan(),
        config.variant.as_str().bold(),
        config.variant.description()
    );

    let registry = Arc::new(MetricsRegistry::new());
    let scenario = Arc::new(GatewayScenario::new(config, Arc::clone(&registry)));
    let report = run_scenario(scenario, executor, registry, &thresholds).await?;

    finish(&report.summary, options)
}
