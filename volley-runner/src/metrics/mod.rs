//! Metric primitives
//!
//! Process-wide accumulators shared by every virtual user:
//! - [`Counter`]: monotonic count
//! - [`Rate`]: share of `true` samples
//! - [`Trend`]: millisecond samples with percentile statistics
//! - [`Checks`]: named pass/fail assertions
//!
//! Counters and rates are lock-free. Trends and checks take a short lock
//! per sample. All of them are registered by name in [`MetricsRegistry`].

mod http;

pub use http::HttpMetrics;

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use volley_core::threshold::Aggregate;

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Share of samples that were `true`
#[derive(Debug, Default)]
pub struct Rate {
    hits: AtomicU64,
    total: AtomicU64,
}

impl Rate {
    pub fn add(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Fraction of `true` samples, `None` before the first sample
    pub fn rate(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.hits() as f64 / total as f64)
    }
}

/// Sample store for latency-like values, in milliseconds
#[derive(Debug, Default)]
pub struct Trend {
    samples: Mutex<Vec<f64>>,
}

impl Trend {
    pub fn add_millis(&self, value: f64) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
    }

    pub fn add_duration(&self, duration: Duration) {
        self.add_millis(duration.as_secs_f64() * 1000.0);
    }

    pub fn count(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn sorted_samples(&self) -> Vec<f64> {
        let mut samples = self
            .samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        samples.sort_by(f64::total_cmp);
        samples
    }

    /// Summary statistics, `None` before the first sample
    pub fn stats(&self) -> Option<TrendStats> {
        TrendStats::from_sorted(&self.sorted_samples())
    }

    /// A single aggregate, `None` before the first sample or for aggregates
    /// a trend does not have
    pub fn aggregate(&self, aggregate: Aggregate) -> Option<f64> {
        let sorted = self.sorted_samples();
        if sorted.is_empty() {
            return None;
        }
        match aggregate {
            Aggregate::Count => Some(sorted.len() as f64),
            Aggregate::Avg => Some(sorted.iter().sum::<f64>() / sorted.len() as f64),
            Aggregate::Min => sorted.first().copied(),
            Aggregate::Max => sorted.last().copied(),
            Aggregate::Med => percentile(&sorted, 50.0),
            Aggregate::Percentile(p) => percentile(&sorted, p),
            Aggregate::Rate => None,
        }
    }
}

/// Linearly interpolated percentile of ascending samples
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        len => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (len - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
        }
    }
}

/// Summary of a trend, all values in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendStats {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl TrendStats {
    fn from_sorted(sorted: &[f64]) -> Option<Self> {
        let p = |q| percentile(sorted, q);
        Some(Self {
            count: sorted.len(),
            avg: sorted.iter().sum::<f64>() / sorted.len().max(1) as f64,
            min: *sorted.first()?,
            med: p(50.0)?,
            max: *sorted.last()?,
            p90: p(90.0)?,
            p95: p(95.0)?,
            p99: p(99.0)?,
        })
    }
}

/// Pass/fail tallies of one named check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckTally {
    pub passes: u64,
    pub fails: u64,
}

/// Named assertions, plus an aggregate `checks` rate over all of them
#[derive(Debug, Default)]
pub struct Checks {
    tallies: Mutex<BTreeMap<String, CheckTally>>,
    overall: Rate,
}

impl Checks {
    /// Records one evaluation of a check and returns whether it passed
    pub fn record(&self, name: &str, passed: bool) -> bool {
        let mut tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
        let tally = tallies.entry(name.to_string()).or_default();
        if passed {
            tally.passes += 1;
        } else {
            tally.fails += 1;
        }
        self.overall.add(passed);
        passed
    }

    pub fn tallies(&self) -> Vec<(String, CheckTally)> {
        self.tallies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, tally)| (name.clone(), *tally))
            .collect()
    }

    pub fn overall(&self) -> &Rate {
        &self.overall
    }
}

/// Registry of named metrics shared across the run
///
/// Lookups are get-or-create: asking twice for the same name returns the
/// same accumulator.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: RwLock<BTreeMap<String, Arc<Counter>>>,
    rates: RwLock<BTreeMap<String, Arc<Rate>>>,
    trends: RwLock<BTreeMap<String, Arc<Trend>>>,
    checks: Checks,
}

fn get_or_create<T: Default>(map: &RwLock<BTreeMap<String, Arc<T>>>, name: &str) -> Arc<T> {
    if let Some(existing) = map
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
    {
        return Arc::clone(existing);
    }
    let mut map = map.write().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(map.entry(name.to_string()).or_default())
}

fn snapshot<T>(map: &RwLock<BTreeMap<String, Arc<T>>>) -> Vec<(String, Arc<T>)> {
    map.read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(name, metric)| (name.clone(), Arc::clone(metric)))
        .collect()
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> Arc<Counter> {
        get_or_create(&self.counters, name)
    }

    pub fn rate(&self, name: &str) -> Arc<Rate> {
        get_or_create(&self.rates, name)
    }

    pub fn trend(&self, name: &str) -> Arc<Trend> {
        get_or_create(&self.trends, name)
    }

    /// Records a named check, returning whether it passed
    pub fn check(&self, name: &str, passed: bool) -> bool {
        self.checks.record(name, passed)
    }

    pub fn checks(&self) -> &Checks {
        &self.checks
    }

    pub fn counters(&self) -> Vec<(String, Arc<Counter>)> {
        snapshot(&self.counters)
    }

    pub fn rates(&self) -> Vec<(String, Arc<Rate>)> {
        snapshot(&self.rates)
    }

    pub fn trends(&self) -> Vec<(String, Arc<Trend>)> {
        snapshot(&self.trends)
    }

    /// Current value of `aggregate` for the metric called `name`
    ///
    /// `elapsed` turns counters into per-second rates. The aggregate
    /// `checks` rate is addressable as `checks`. Returns `None` when the
    /// metric is unknown, has no samples, or lacks that aggregate.
    pub fn aggregate(&self, name: &str, aggregate: Aggregate, elapsed: Duration) -> Option<f64> {
        if name == "checks" && aggregate == Aggregate::Rate {
            return self.checks.overall().rate();
        }

        if let Some(trend) = self.trends.read().unwrap_or_else(PoisonError::into_inner).get(name) {
            return trend.aggregate(aggregate);
        }

        if let Some(rate) = self.rates.read().unwrap_or_else(PoisonError::into_inner).get(name) {
            return match aggregate {
                Aggregate::Rate => rate.rate(),
                Aggregate::Count => (rate.total() > 0).then(|| rate.hits() as f64),
                _ => None,
            };
        }

        if let Some(counter) = self.counters.read().unwrap_or_else(PoisonError::into_inner).get(name) {
            let count = counter.get() as f64;
            return match aggregate {
                Aggregate::Count => Some(count),
                Aggregate::Rate if !elapsed.is_zero() => Some(count / elapsed.as_secs_f64()),
                _ => None,
            };
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_and_rate() {
        let registry = MetricsRegistry::new();
        registry.counter("login_calls").add(2);
        registry.counter("login_calls").add(1);
        assert_eq!(registry.counter("login_calls").get(), 3);

        let rate = registry.rate("errors");
        assert_eq!(rate.rate(), None);
        rate.add(true);
        rate.add(false);
        rate.add(false);
        rate.add(false);
        assert_eq!(rate.rate(), Some(0.25));
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&sorted, 50.0), Some(30.0));
        assert_eq!(percentile(&sorted, 90.0), Some(46.0));
        assert_eq!(percentile(&sorted, 0.0), Some(10.0));
        assert_eq!(percentile(&sorted, 100.0), Some(50.0));
        assert_eq!(percentile(&[], 50.0), None);
        assert_eq!(percentile(&[7.0], 99.0), Some(7.0));
    }

    #[test]
    fn test_trend_stats() {
        let trend = Trend::default();
        assert!(trend.stats().is_none());
        for ms in [400.0, 100.0, 300.0, 200.0] {
            trend.add_millis(ms);
        }
        trend.add_duration(Duration::from_millis(500));

        let stats = trend.stats().unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, 100.0);
        assert_eq!(stats.max, 500.0);
        assert_eq!(stats.avg, 300.0);
        assert_eq!(stats.med, 300.0);
        assert_eq!(trend.aggregate(Aggregate::Percentile(90.0)), Some(460.0));
        assert_eq!(trend.aggregate(Aggregate::Rate), None);
    }

    #[test]
    fn test_checks_tally() {
        let registry = MetricsRegistry::new();
        assert!(registry.check("status is 200", true));
        assert!(!registry.check("status is 200", false));
        registry.check("content-type is JSON", true);

        let tallies = registry.checks().tallies();
        assert_eq!(tallies.len(), 2);
        assert_eq!(
            tallies[1],
            ("status is 200".to_string(), CheckTally { passes: 1, fails: 1 })
        );
        assert_eq!(
            registry.aggregate("checks", Aggregate::Rate, Duration::ZERO),
            Some(2.0 / 3.0)
        );
    }

    #[test]
    fn test_registry_aggregate_lookup() {
        let registry = MetricsRegistry::new();
        registry.counter("request_success").add(30);
        registry.trend("request_duration").add_millis(12.0);

        assert_eq!(
            registry.aggregate("request_success", Aggregate::Rate, Duration::from_secs(10)),
            Some(3.0)
        );
        assert_eq!(
            registry.aggregate("request_duration", Aggregate::Max, Duration::ZERO),
            Some(12.0)
        );
        assert_eq!(
            registry.aggregate("missing", Aggregate::Count, Duration::ZERO),
            None
        );
        // An empty rate has no data yet
        registry.rate("errors");
        assert_eq!(registry.aggregate("errors", Aggregate::Rate, Duration::ZERO), None);
    }

    #[test]
    fn test_concurrent_counter_updates_are_not_lost() {
        let counter = Arc::new(Counter::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.add(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.get(), 8000);
    }
}
