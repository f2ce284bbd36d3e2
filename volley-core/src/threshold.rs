//! Threshold expressions
//!
//! A threshold is a pass/fail criterion over one aggregate of a metric,
//! written as `<aggregate><op><value>`: `p(95)<2000`, `rate<0.05`,
//! `rate>0.95`, `avg<=300`, `count>0`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThresholdError {
    #[error("Invalid threshold '{0}': missing comparison operator")]
    MissingOperator(String),

    #[error("Invalid threshold '{expr}': unknown aggregate '{aggregate}'")]
    UnknownAggregate { expr: String, aggregate: String },

    #[error("Invalid threshold '{0}': value is not a number")]
    InvalidValue(String),

    #[error("Invalid threshold entry '{0}': expected <metric>=<expression>")]
    InvalidEntry(String),
}

/// Aggregated statistic a threshold looks at
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Count,
    Rate,
    Avg,
    Min,
    Max,
    Med,
    Percentile(f64),
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Count => f.write_str("count"),
            Aggregate::Rate => f.write_str("rate"),
            Aggregate::Avg => f.write_str("avg"),
            Aggregate::Min => f.write_str("min"),
            Aggregate::Max => f.write_str("max"),
            Aggregate::Med => f.write_str("med"),
            Aggregate::Percentile(p) => write!(f, "p({})", p),
        }
    }
}

impl FromStr for Aggregate {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(Aggregate::Count),
            "rate" => Ok(Aggregate::Rate),
            "avg" => Ok(Aggregate::Avg),
            "min" => Ok(Aggregate::Min),
            "max" => Ok(Aggregate::Max),
            "med" => Ok(Aggregate::Med),
            other => {
                let inner = other
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or(())?;
                let p: f64 = inner.trim().parse().map_err(|_| ())?;
                if (0.0..=100.0).contains(&p) {
                    Ok(Aggregate::Percentile(p))
                } else {
                    Err(())
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "==")]
    Equal,
}

impl Comparison {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Equal => "==",
        }
    }

    pub fn holds(&self, actual: f64, expected: f64) -> bool {
        match self {
            Comparison::Less => actual < expected,
            Comparison::LessOrEqual => actual <= expected,
            Comparison::Greater => actual > expected,
            Comparison::GreaterOrEqual => actual >= expected,
            Comparison::Equal => (actual - expected).abs() < f64::EPSILON,
        }
    }
}

/// A parsed threshold expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub aggregate: Aggregate,
    pub comparison: Comparison,
    pub value: f64,
}

impl Threshold {
    pub fn new(aggregate: Aggregate, comparison: Comparison, value: f64) -> Self {
        Self {
            aggregate,
            comparison,
            value,
        }
    }

    /// Checks an observed aggregate value against this threshold
    pub fn passes(&self, actual: f64) -> bool {
        self.comparison.holds(actual, self.value)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.aggregate, self.comparison.symbol(), self.value)
    }
}

impl FromStr for Threshold {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expr: String = s.chars().filter(|c| !c.is_whitespace()).collect();

        // Two-character operators first so `<=` is not read as `<`
        let operators = [
            ("<=", Comparison::LessOrEqual),
            (">=", Comparison::GreaterOrEqual),
            ("==", Comparison::Equal),
            ("<", Comparison::Less),
            (">", Comparison::Greater),
        ];

        let (pos, symbol, comparison) = operators
            .iter()
            .filter_map(|(symbol, cmp)| expr.find(symbol).map(|pos| (pos, *symbol, *cmp)))
            .min_by_key(|(pos, symbol, _)| (*pos, std::cmp::Reverse(symbol.len())))
            .ok_or_else(|| ThresholdError::MissingOperator(s.to_string()))?;

        let aggregate_str = &expr[..pos];
        let value_str = &expr[pos + symbol.len()..];

        let aggregate = aggregate_str
            .parse::<Aggregate>()
            .map_err(|_| ThresholdError::UnknownAggregate {
                expr: s.to_string(),
                aggregate: aggregate_str.to_string(),
            })?;
        let value = value_str
            .parse::<f64>()
            .map_err(|_| ThresholdError::InvalidValue(s.to_string()))?;

        Ok(Self::new(aggregate, comparison, value))
    }
}

/// Thresholds keyed by metric name, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    entries: Vec<(String, Threshold)>,
}

impl ThresholdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a threshold for a metric
    pub fn push(&mut self, metric: impl Into<String>, threshold: Threshold) {
        self.entries.push((metric.into(), threshold));
    }

    /// Builder form of [`push`](Self::push)
    pub fn with(mut self, metric: impl Into<String>, threshold: Threshold) -> Self {
        self.push(metric, threshold);
        self
    }

    /// Parses and adds a `<metric>=<expression>` entry, e.g. `errors=rate<0.05`
    pub fn add_entry(&mut self, entry: &str) -> Result<(), ThresholdError> {
        let (metric, expr) = entry
            .split_once('=')
            .filter(|(metric, _)| !metric.trim().is_empty())
            .ok_or_else(|| ThresholdError::InvalidEntry(entry.to_string()))?;
        self.push(metric.trim(), expr.parse()?);
        Ok(())
    }

    /// Drops every threshold registered for `metric`
    pub fn clear_metric(&mut self, metric: &str) {
        self.entries.retain(|(name, _)| name != metric);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Threshold)> {
        self.entries.iter().map(|(name, t)| (name.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
