//! Configuration module
//!
//! Run settings shared by every scenario subcommand: the ramp schedule,
//! threshold overrides, graceful stop and summary export.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use volley_core::schedule::{Stage, parse_duration, parse_stages};
use volley_core::threshold::ThresholdSet;
use volley_runner::config::ExecutorConfig;

/// Options accepted by every scenario
#[derive(Args, Debug, Clone, Default)]
pub struct RunOptions {
    /// Replace the scenario's ramp schedule, e.g. "30s:10,1m:10,10s:0"
    #[arg(long, global = true, env = "STAGES")]
    pub stages: Option<String>,

    /// Threshold as <metric>=<expression>, e.g. "errors=rate<0.01".
    /// Replaces the scenario's thresholds for that metric. Repeatable.
    #[arg(long = "threshold", global = true)]
    pub thresholds: Vec<String>,

    /// How long in-flight iterations may run after the schedule ends
    #[arg(long, global = true, default_value = "30s", value_parser = parse_duration)]
    pub graceful_stop: Option<Duration>,

    /// Write the run summary as JSON to this file
    #[arg(long, global = true)]
    pub summary_json: Option<PathBuf>,
}

impl RunOptions {
    /// Builds the executor configuration
    ///
    /// # Arguments
    /// * `default_stages` - Schedule used when `--stages` is not given
    pub fn executor(&self, default_stages: Vec<Stage>) -> Result<ExecutorConfig> {
        let stages = match &self.stages {
            Some(raw) => parse_stages(raw).with_context(|| format!("Invalid --stages '{}'", raw))?,
            None => default_stages,
        };

        let mut config = ExecutorConfig::new(stages);
        if let Some(graceful_stop) = self.graceful_stop {
            config.graceful_stop = graceful_stop;
        }
        Ok(config)
    }

    /// Applies `--threshold` overrides on top of the scenario's thresholds
    pub fn thresholds(&self, defaults: ThresholdSet) -> Result<ThresholdSet> {
        let mut overrides = ThresholdSet::new();
        for entry in &self.thresholds {
            overrides
                .add_entry(entry)
                .with_context(|| format!("Invalid --threshold '{}'", entry))?;
        }

        let mut set = defaults;
        for (metric, _) in overrides.iter() {
            set.clear_metric(metric);
        }
        for (metric, threshold) in overrides.iter() {
            set.push(metric, threshold.clone());
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volley_core::threshold::{Aggregate, Comparison, Threshold};

    #[test]
    fn test_default_schedule_is_kept() {
        let options = RunOptions::default();
        let stages = vec![Stage::new(Duration::from_secs(10), 2)];

        let config = options.executor(stages.clone()).unwrap();
        assert_eq!(config.stages, stages);
        assert_eq!(config.graceful_stop, Duration::from_secs(30));
    }

    #[test]
    fn test_stage_override() {
        let options = RunOptions {
            stages: Some("5s:3,5s:0".to_string()),
            graceful_stop: Some(Duration::from_secs(2)),
            ..Default::default()
        };

        let config = options.executor(Vec::new()).unwrap();
        assert_eq!(
            config.stages,
            vec![
                Stage::new(Duration::from_secs(5), 3),
                Stage::new(Duration::from_secs(5), 0)
            ]
        );
        assert_eq!(config.graceful_stop, Duration::from_secs(2));

        let bad = RunOptions {
            stages: Some("five:3".to_string()),
            ..Default::default()
        };
        assert!(bad.executor(Vec::new()).is_err());
    }

    #[test]
    fn test_threshold_override_replaces_metric() {
        let defaults = ThresholdSet::new()
            .with("errors", Threshold::new(Aggregate::Rate, Comparison::Less, 0.05))
            .with(
                "http_req_duration",
                Threshold::new(Aggregate::Percentile(95.0), Comparison::Less, 500.0),
            );
        let options = RunOptions {
            thresholds: vec!["errors=rate<0.01".to_string()],
            ..Default::default()
        };

        let set = options.thresholds(defaults).unwrap();
        let entries: Vec<(String, String)> = set
            .iter()
            .map(|(metric, t)| (metric.to_string(), t.to_string()))
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "http_req_duration");
        assert_eq!(entries[1].0, "errors");

        let bad = RunOptions {
            thresholds: vec!["errors".to_string()],
            ..Default::default()
        };
        assert!(bad.thresholds(ThresholdSet::new()).is_err());
    }
}
