//! End-of-run summary
//!
//! Snapshots every metric, evaluates the thresholds and renders the result
//! for the terminal or as JSON.

use chrono::{DateTime, Utc};
use colored::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use uuid::Uuid;
use volley_core::schedule::format_duration;
use volley_core::threshold::ThresholdSet;

use crate::metrics::{MetricsRegistry, TrendStats};
use crate::scheduler::ExecutionStats;

/// Outcome of one threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdStatus {
    Passed,
    Failed,
    /// The metric never received a sample; reported, but not a failure
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub actual: Option<f64>,
    pub status: ThresholdStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterSummary {
    pub count: u64,
    /// Per second over the whole run
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateSummary {
    pub rate: Option<f64>,
    pub hits: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

/// Everything a run measured
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub scenario: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub iterations: u64,
    pub vus_max: usize,
    pub aborted_vus: usize,
    pub counters: BTreeMap<String, CounterSummary>,
    pub rates: BTreeMap<String, RateSummary>,
    pub trends: BTreeMap<String, TrendStats>,
    pub checks: Vec<CheckSummary>,
    pub checks_rate: Option<f64>,
    pub thresholds: Vec<ThresholdResult>,
}

/// Evaluates every threshold against the registry's current values
pub fn evaluate_thresholds(
    registry: &MetricsRegistry,
    thresholds: &ThresholdSet,
    elapsed: std::time::Duration,
) -> Vec<ThresholdResult> {
    thresholds
        .iter()
        .map(|(metric, threshold)| {
            let actual = registry.aggregate(metric, threshold.aggregate, elapsed);
            let status = match actual {
                None => ThresholdStatus::NoData,
                Some(value) if threshold.passes(value) => ThresholdStatus::Passed,
                Some(_) => ThresholdStatus::Failed,
            };
            ThresholdResult {
                metric: metric.to_string(),
                expression: threshold.to_string(),
                actual,
                status,
            }
        })
        .collect()
}

impl RunSummary {
    /// Collects the summary of a finished run
    ///
    /// # Arguments
    /// * `scenario` - Scenario name
    /// * `registry` - Metrics recorded during the run
    /// * `stats` - Executor totals
    /// * `started_at` - Wall-clock start of the run
    /// * `thresholds` - Thresholds to evaluate
    pub fn collect(
        scenario: impl Into<String>,
        registry: &MetricsRegistry,
        stats: &ExecutionStats,
        started_at: DateTime<Utc>,
        thresholds: &ThresholdSet,
    ) -> Self {
        let elapsed = stats.elapsed;
        let per_sec = |count: u64| {
            if elapsed.is_zero() {
                0.0
            } else {
                count as f64 / elapsed.as_secs_f64()
            }
        };

        let counters = registry
            .counters()
            .into_iter()
            .map(|(name, counter)| {
                let count = counter.get();
                (
                    name,
                    CounterSummary {
                        count,
                        rate: per_sec(count),
                    },
                )
            })
            .collect();

        let rates = registry
            .rates()
            .into_iter()
            .map(|(name, rate)| {
                (
                    name,
                    RateSummary {
                        rate: rate.rate(),
                        hits: rate.hits(),
                        total: rate.total(),
                    },
                )
            })
            .collect();

        let trends = registry
            .trends()
            .into_iter()
            .filter_map(|(name, trend)| Some((name, trend.stats()?)))
            .collect();

        let checks = registry
            .checks()
            .tallies()
            .into_iter()
            .map(|(name, tally)| CheckSummary {
                name,
                passes: tally.passes,
                fails: tally.fails,
            })
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            scenario: scenario.into(),
            started_at,
            finished_at: Utc::now(),
            duration_secs: elapsed.as_secs_f64(),
            iterations: stats.iterations,
            vus_max: stats.peak_vus,
            aborted_vus: stats.aborted,
            counters,
            rates,
            trends,
            checks,
            checks_rate: registry.checks().overall().rate(),
            thresholds: evaluate_thresholds(registry, thresholds, elapsed),
        }
    }

    /// True when no threshold failed
    pub fn passed(&self) -> bool {
        !self
            .thresholds
            .iter()
            .any(|t| t.status == ThresholdStatus::Failed)
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.thresholds
            .iter()
            .filter(|t| t.status == ThresholdStatus::Failed)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Renders the summary for the terminal
    pub fn render(&self) -> String {
        let mut out = String::new();
        let duration = std::time::Duration::from_secs_f64(self.duration_secs);

        let _ = writeln!(out, "{}", format!("{} summary", self.scenario).bold());
        let _ = writeln!(out, "  Run ID:      {}", self.run_id.to_string().dimmed());
        let _ = writeln!(
            out,
            "  Started:     {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out, "  Duration:    {}", format_duration(duration));
        let _ = writeln!(out, "  Iterations:  {}", self.iterations);
        let _ = writeln!(out, "  VUs max:     {}", self.vus_max);
        if self.aborted_vus > 0 {
            let _ = writeln!(
                out,
                "  Aborted:     {}",
                self.aborted_vus.to_string().yellow()
            );
        }

        if !self.checks.is_empty() {
            let _ = writeln!(out, "\n{}", "Checks:".bold());
            for check in &self.checks {
                let mark = if check.fails == 0 {
                    "✓".green()
                } else {
                    "✗".red()
                };
                let _ = writeln!(
                    out,
                    "  {} {} ({} passed, {} failed)",
                    mark, check.name, check.passes, check.fails
                );
            }
            if let Some(rate) = self.checks_rate {
                let _ = writeln!(out, "  checks: {:.2}%", rate * 100.0);
            }
        }

        let _ = writeln!(out, "\n{}", "Metrics:".bold());
        for (name, counter) in &self.counters {
            let _ = writeln!(
                out,
                "  {:<28} {} ({:.2}/s)",
                name.cyan(),
                counter.count,
                counter.rate
            );
        }
        for (name, rate) in &self.rates {
            let value = rate
                .rate
                .map_or_else(|| "-".to_string(), |r| format!("{:.2}%", r * 100.0));
            let _ = writeln!(
                out,
                "  {:<28} {} ({} / {})",
                name.cyan(),
                value,
                rate.hits,
                rate.total
            );
        }
        for (name, stats) in &self.trends {
            let _ = writeln!(
                out,
                "  {:<28} avg={:.2}ms min={:.2}ms med={:.2}ms max={:.2}ms p(90)={:.2}ms p(95)={:.2}ms",
                name.cyan(),
                stats.avg,
                stats.min,
                stats.med,
                stats.max,
                stats.p90,
                stats.p95
            );
        }

        if !self.thresholds.is_empty() {
            let _ = writeln!(out, "\n{}", "Thresholds:".bold());
            for threshold in &self.thresholds {
                let (mark, actual) = match (threshold.status, threshold.actual) {
                    (ThresholdStatus::Passed, Some(v)) => ("✓".green(), format!("{:.4}", v)),
                    (ThresholdStatus::Failed, Some(v)) => ("✗".red(), format!("{:.4}", v)),
                    _ => ("-".dimmed(), "no data".to_string()),
                };
                let _ = writeln!(
                    out,
                    "  {} {} {} (actual: {})",
                    mark, threshold.metric, threshold.expression, actual
                );
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stats() -> ExecutionStats {
        ExecutionStats {
            iterations: 4,
            peak_vus: 2,
            elapsed: Duration::from_secs(2),
            aborted: 0,
        }
    }

    #[test]
    fn test_threshold_evaluation() {
        let registry = MetricsRegistry::new();
        let errors = registry.rate("errors");
        errors.add(false);
        errors.add(false);
        errors.add(true);
        registry.trend("http_req_duration").add_millis(120.0);

        let mut set = ThresholdSet::new();
        set.add_entry("errors=rate<0.05").unwrap();
        set.add_entry("http_req_duration=p(95)<500").unwrap();
        set.add_entry("task_completion_time=p(90)<300000").unwrap();

        let results = evaluate_thresholds(&registry, &set, Duration::from_secs(1));
        let statuses: Vec<ThresholdStatus> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                ThresholdStatus::Failed,
                ThresholdStatus::Passed,
                ThresholdStatus::NoData
            ]
        );
    }

    #[test]
    fn test_no_data_does_not_fail_run() {
        let registry = MetricsRegistry::new();
        let mut set = ThresholdSet::new();
        set.add_entry("task_completion_time=p(90)<300000").unwrap();

        let summary = RunSummary::collect("download", &registry, &stats(), Utc::now(), &set);
        assert!(summary.passed());
        assert_eq!(summary.failed_thresholds().count(), 0);
    }

    #[test]
    fn test_collect_and_serialize() {
        let registry = MetricsRegistry::new();
        registry.counter("iterations").add(4);
        registry.check("status is 200", true);
        registry.check("status is 200", false);
        registry.rate("http_req_failed").add(true);

        let mut set = ThresholdSet::new();
        set.add_entry("http_req_failed=rate<0.05").unwrap();

        let summary = RunSummary::collect("contest", &registry, &stats(), Utc::now(), &set);
        assert!(!summary.passed());
        assert_eq!(summary.counters["iterations"].rate, 2.0);
        assert_eq!(summary.checks_rate, Some(0.5));

        let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(json["scenario"], "contest");
        assert_eq!(json["thresholds"][0]["status"], "failed");
        assert_eq!(json["checks"][0]["fails"], 1);

        let text = summary.render();
        assert!(text.contains("status is 200"));
        assert!(text.contains("http_req_failed"));
    }
}
