//! Running a scenario end to end

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use volley_core::schedule::format_duration;
use volley_core::threshold::ThresholdSet;

use crate::config::ExecutorConfig;
use crate::metrics::MetricsRegistry;
use crate::scenario::Scenario;
use crate::scheduler::{ExecutionStats, RampingExecutor};
use crate::summary::RunSummary;

/// A finished run: executor totals plus the evaluated summary
pub struct RunReport {
    pub stats: ExecutionStats,
    pub summary: RunSummary,
}

/// Runs setup, the ramp schedule and teardown, then summarises
///
/// A failing setup aborts the run before any VU starts.
///
/// # Arguments
/// * `scenario` - What every VU does
/// * `executor` - Ramp schedule and stop behaviour
/// * `registry` - Registry the scenario records into
/// * `thresholds` - Pass/fail criteria evaluated at the end
pub async fn run_scenario<S: Scenario>(
    scenario: Arc<S>,
    executor: ExecutorConfig,
    registry: Arc<MetricsRegistry>,
    thresholds: &ThresholdSet,
) -> Result<RunReport> {
    executor.validate().context("Invalid executor configuration")?;

    let name = scenario.name();
    let started_at = Utc::now();
    info!("Running {}", name);
    for (i, stage) in executor.stages.iter().enumerate() {
        info!("  Stage {}: {}", i + 1, stage);
    }
    info!(
        "  Total: {}, peak {} VUs",
        format_duration(executor.total_duration()),
        executor.peak_vus()
    );

    scenario
        .setup()
        .await
        .with_context(|| format!("{} setup failed", name))?;

    let stats = RampingExecutor::new(executor, &registry)
        .run(Arc::clone(&scenario))
        .await;

    scenario.teardown().await;

    let summary = RunSummary::collect(name, &registry, &stats, started_at, thresholds);
    Ok(RunReport { stats, summary })
}
