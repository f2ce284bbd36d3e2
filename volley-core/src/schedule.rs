//! Ramping virtual-user schedules
//!
//! A schedule is a starting VU count followed by stages. Within a stage the
//! target moves linearly from the previous stage's target to the stage's own
//! target over the stage's duration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while parsing durations and stages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Duration string cannot be empty")]
    EmptyDuration,

    #[error("Invalid duration '{0}': expected forms like 500ms, 10s, 2m, 1h or 1m30s")]
    InvalidDuration(String),

    #[error("Invalid stage '{0}': expected <duration>:<target>, e.g. 30s:10")]
    InvalidStage(String),
}

/// Parses a duration such as `500ms`, `10s`, `2m`, `1h` or `1m30s`
///
/// A bare number is read as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, ScheduleError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(ScheduleError::EmptyDuration);
    }

    let invalid = || ScheduleError::InvalidDuration(input.to_string());

    if let Ok(secs) = s.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).map_err(|_| invalid());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_secs = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];

        let part = Duration::try_from_secs_f64(value * unit_secs).map_err(|_| invalid())?;
        total = total.checked_add(part).ok_or_else(invalid)?;
    }

    Ok(total)
}

/// Formats a duration the way stages are written (`1m30s`, `500ms`)
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }

    let mut secs = millis / 1000;
    let mut out = String::new();
    for (unit, size) in [("h", 3600), ("m", 60), ("s", 1)] {
        if secs >= size {
            out.push_str(&format!("{}{}", secs / size, unit));
            secs %= size;
        }
    }
    out
}

/// One leg of a ramping schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {} VUs", format_duration(self.duration), self.target)
    }
}

impl FromStr for Stage {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (duration, target) = s
            .split_once(':')
            .ok_or_else(|| ScheduleError::InvalidStage(s.to_string()))?;
        let duration =
            parse_duration(duration).map_err(|_| ScheduleError::InvalidStage(s.to_string()))?;
        let target = target
            .trim()
            .parse()
            .map_err(|_| ScheduleError::InvalidStage(s.to_string()))?;
        Ok(Self { duration, target })
    }
}

/// Parses a comma-separated stage list such as `30s:10,1m:10,10s:0`
pub fn parse_stages(s: &str) -> Result<Vec<Stage>, ScheduleError> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(Stage::from_str)
        .collect()
}

/// Total length of a schedule
pub fn total_duration(stages: &[Stage]) -> Duration {
    stages.iter().map(|stage| stage.duration).sum()
}

/// Highest VU count a schedule ever asks for
pub fn peak_target(start_vus: usize, stages: &[Stage]) -> usize {
    stages
        .iter()
        .map(|stage| stage.target)
        .fold(start_vus, usize::max)
}

/// Target VU count at `elapsed` into the schedule
///
/// Returns `None` once the schedule is over.
pub fn target_at(start_vus: usize, stages: &[Stage], elapsed: Duration) -> Option<usize> {
    let mut from = start_vus;
    let mut stage_start = Duration::ZERO;

    for stage in stages {
        let stage_end = stage_start + stage.duration;
        if elapsed < stage_end {
            let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
            let delta = stage.target as f64 - from as f64;
            return Some((from as f64 + delta * progress).max(0.0) as usize);
        }
        from = stage.target;
        stage_start = stage_end;
    }

    None
}
