//! Contest-listing scenario
//!
//! Hammers the contest list endpoint and judges each answer on status,
//! content type and body shape. Response time is checked but does not make
//! a request fail.

use async_trait::async_trait;
use fastrand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{info, warn};
use volley_client::{ServiceClient, TimedResponse};
use volley_core::threshold::Aggregate;

use crate::config::ContestConfig;
use crate::metrics::{Counter, HttpMetrics, MetricsRegistry, Rate, Trend};
use crate::repository::{ContestApi, HttpContestApi};
use crate::scenario::Scenario;
use crate::scheduler::ExecutionStats;

/// Share of successful requests that get a log line
const SUCCESS_LOG_SAMPLE: f64 = 0.1;

pub struct ContestScenario {
    config: ContestConfig,
    api: Arc<dyn ContestApi>,
    registry: Arc<MetricsRegistry>,
    /// `response time < {limit}ms`, named after the configured limit
    latency_check: String,
    request_duration: Arc<Trend>,
    request_success: Arc<Counter>,
    request_failure: Arc<Counter>,
    success_rate: Arc<Rate>,
}

/// Why a listing did not count as a success, first failing reason only
#[derive(Debug, Clone, PartialEq, Eq)]
enum ListingFailure {
    Status(u16),
    InvalidJson,
    ContentType,
    Transport(String),
}

/// Body of the listing is a JSON array
fn is_json_array(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body).is_ok_and(|v| v.is_array())
}

fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}

impl ContestScenario {
    /// Creates the scenario against the configured contest API
    pub fn new(config: ContestConfig, registry: Arc<MetricsRegistry>) -> Self {
        let client = ServiceClient::new(config.base_url.clone());
        let api = HttpContestApi::new(client, HttpMetrics::new(&registry));
        Self::with_api(config, Arc::new(api), registry)
    }

    /// Creates the scenario on top of an existing contest repository
    pub fn with_api(
        config: ContestConfig,
        api: Arc<dyn ContestApi>,
        registry: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            latency_check: format!(
                "response time < {}ms",
                config.max_response_time.as_millis()
            ),
            request_duration: registry.trend("request_duration"),
            request_success: registry.counter("request_success"),
            request_failure: registry.counter("request_failure"),
            success_rate: registry.rate("contest_list_success_rate"),
            config,
            api,
            registry,
        }
    }

    fn target_url(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url,
            ServiceClient::contests_path(&self.config.space_id)
        )
    }

    /// Records the four listing checks and returns the first failing reason
    fn evaluate(&self, response: &TimedResponse) -> Option<ListingFailure> {
        let status_ok = self.registry.check("status is 200", response.status == 200);
        self.registry.check(
            &self.latency_check,
            response.elapsed < self.config.max_response_time,
        );
        let json_ok = self
            .registry
            .check("has valid JSON response", is_json_array(&response.body));
        let content_type_ok = self
            .registry
            .check("content-type is JSON", response.is_json());

        if !status_ok {
            Some(ListingFailure::Status(response.status))
        } else if !json_ok {
            Some(ListingFailure::InvalidJson)
        } else if !content_type_ok {
            Some(ListingFailure::ContentType)
        } else {
            None
        }
    }

    fn think_time(&self, rng: &mut Rng) -> Duration {
        let min = self.config.think_time_min;
        let spread = self.config.think_time_max.saturating_sub(min);
        min + spread.mul_f64(rng.f64())
    }
}

#[async_trait]
impl Scenario for ContestScenario {
    type Actor = Rng;

    fn name(&self) -> String {
        "Contest List API Test".to_string()
    }

    async fn setup(&self) -> anyhow::Result<()> {
        info!("Contest List API Performance Test Starting...");
        info!("Target URL: {}", self.target_url());
        info!("Base URL: {}", self.config.base_url);
        info!("Space ID: {}", self.config.space_id);
        info!("Expected Response: JSON array of contests");
        info!("Testing connection...");

        match self.api.list_contests(&self.config.space_id).await {
            Ok(response) if response.status == 200 => {
                info!("Connection test successful");
                match response.json::<serde_json::Value>() {
                    Ok(serde_json::Value::Array(items)) => {
                        info!("Sample response: Array with {} items", items.len())
                    }
                    Ok(_) => info!("Sample response: Array with unknown items"),
                    Err(_) => warn!("Response is not valid JSON"),
                }
            }
            Ok(response) => {
                warn!("Connection test failed - Status: {}", response.status);
                warn!("   Response: {}...", preview(&response.body));
            }
            Err(e) => warn!("Connection test failed: {}", e),
        }

        Ok(())
    }

    async fn start_actor(&self, _vu: usize) -> Rng {
        Rng::new()
    }

    async fn iteration(&self, rng: &mut Rng) {
        let start = Instant::now();
        let result = self.api.list_contests(&self.config.space_id).await;
        let duration = start.elapsed();
        self.request_duration.add_duration(duration);

        let failure = match &result {
            Ok(response) => self.evaluate(response),
            Err(e) => {
                for name in [
                    "status is 200",
                    self.latency_check.as_str(),
                    "has valid JSON response",
                    "content-type is JSON",
                ] {
                    self.registry.check(name, false);
                }
                Some(ListingFailure::Transport(e.to_string()))
            }
        };

        let millis = duration.as_millis();
        match failure {
            None => {
                self.request_success.add(1);
                self.success_rate.add(true);
                if rng.f64() < SUCCESS_LOG_SAMPLE {
                    let size = result.as_ref().map_or(0, |r| r.body.len());
                    info!(
                        "Contest list retrieved successfully in {}ms (Response size: {} bytes)",
                        millis, size
                    );
                }
            }
            Some(reason) => {
                self.request_failure.add(1);
                self.success_rate.add(false);
                match reason {
                    ListingFailure::Status(status) => {
                        warn!(
                            "Contest list request failed - Status: {}, Duration: {}ms",
                            status, millis
                        );
                        if let Ok(response) = &result {
                            warn!("   Error body: {}...", preview(&response.body));
                        }
                    }
                    ListingFailure::InvalidJson => warn!(
                        "Contest list request failed - Invalid JSON response, Duration: {}ms",
                        millis
                    ),
                    ListingFailure::ContentType => warn!(
                        "Contest list request failed - Invalid content type, Duration: {}ms",
                        millis
                    ),
                    ListingFailure::Transport(e) => warn!(
                        "Contest list request failed - {}, Duration: {}ms",
                        e, millis
                    ),
                }
            }
        }

        time::sleep(self.think_time(rng)).await;
    }
}

/// Four-step grade used by the contest report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Grade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Grade {
    /// Grades `value` where lower is better
    fn lower_is_better(value: f64, bounds: [f64; 3]) -> Self {
        match bounds {
            [a, _, _] if value < a => Grade::Excellent,
            [_, b, _] if value < b => Grade::Good,
            [_, _, c] if value < c => Grade::Fair,
            _ => Grade::Poor,
        }
    }

    /// Grades `value` where higher is better
    fn higher_is_better(value: f64, bounds: [f64; 3]) -> Self {
        match bounds {
            [a, _, _] if value >= a => Grade::Excellent,
            [_, b, _] if value >= b => Grade::Good,
            [_, _, c] if value >= c => Grade::Fair,
            _ => Grade::Poor,
        }
    }
}

/// Post-run performance analysis of the contest API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContestReport {
    pub total_requests: u64,
    /// Percentage of requests judged successful
    pub success_pct: f64,
    pub requests_per_sec: f64,
    /// `http_req_duration` average and p(95), in milliseconds
    pub avg_response_ms: f64,
    pub p95_response_ms: f64,
    /// Percentage of failed HTTP requests
    pub http_fail_pct: f64,
    pub peak_vus: usize,
    pub response_avg_grade: Grade,
    pub response_p95_grade: Grade,
    pub stability_grade: Grade,
    pub throughput_grade: Grade,
    pub recommendations: Vec<String>,
}

impl ContestReport {
    pub fn from_run(registry: &MetricsRegistry, stats: &ExecutionStats) -> Self {
        let successes = registry.counter("request_success").get();
        let failures = registry.counter("request_failure").get();
        let total_requests = successes + failures;
        let success_pct = if total_requests > 0 {
            successes as f64 / total_requests as f64 * 100.0
        } else {
            0.0
        };

        let elapsed = stats.elapsed;
        let value = |name: &str, aggregate| registry.aggregate(name, aggregate, elapsed).unwrap_or(0.0);
        let requests_per_sec = if elapsed.is_zero() {
            0.0
        } else {
            total_requests as f64 / elapsed.as_secs_f64()
        };
        let avg_response_ms = value("http_req_duration", Aggregate::Avg);
        let p95_response_ms = value("http_req_duration", Aggregate::Percentile(95.0));
        let http_fail_pct = value("http_req_failed", Aggregate::Rate) * 100.0;

        let mut report = Self {
            total_requests,
            success_pct,
            requests_per_sec,
            avg_response_ms,
            p95_response_ms,
            http_fail_pct,
            peak_vus: stats.peak_vus,
            response_avg_grade: Grade::lower_is_better(avg_response_ms, [200.0, 500.0, 1000.0]),
            response_p95_grade: Grade::lower_is_better(p95_response_ms, [500.0, 1000.0, 2000.0]),
            stability_grade: Grade::higher_is_better(success_pct, [99.0, 95.0, 90.0]),
            throughput_grade: Grade::higher_is_better(requests_per_sec, [100.0, 50.0, 20.0]),
            recommendations: Vec::new(),
        };
        report.recommendations = report.recommend();
        report
    }

    fn recommend(&self) -> Vec<String> {
        let mut out = Vec::new();

        if self.success_pct >= 99.0 && self.p95_response_ms <= 200.0 && self.requests_per_sec >= 100.0 {
            out.push("Top performance: ready for production with the current setup".to_string());
            out.push("Consider probing the limit with a heavier load (50+ VUs)".to_string());
        } else if self.success_pct >= 95.0
            && self.p95_response_ms <= 500.0
            && self.requests_per_sec >= 50.0
        {
            out.push("Good performance for typical production traffic".to_string());
            out.push("A caching layer could improve it further".to_string());
        } else {
            if self.success_pct < 95.0 {
                out.push("Success rate needs work: check application logs and errors".to_string());
            }
            if self.p95_response_ms > 1000.0 {
                out.push("Response time needs work: review database query performance".to_string());
            }
            if self.http_fail_pct > 5.0 {
                out.push("High HTTP failure rate: check server resources and connection settings".to_string());
            }
            if self.requests_per_sec < 20.0 {
                out.push("Low throughput: look for application bottlenecks".to_string());
            }
        }

        if self.peak_vus <= 30 && self.success_pct >= 95.0 {
            out.push("Next step: stress test with 50 VUs".to_string());
        }

        if self.avg_response_ms > 100.0 {
            out.push(
                "Optimisation ideas: database indexes, gzip responses, Redis cache, connection pool tuning"
                    .to_string(),
            );
        }

        out
    }

    /// One-line digest of the run
    pub fn headline(&self) -> String {
        format!(
            "Contest List API Test - {}VU | Success: {:.1}% | Avg: {:.0}ms | P95: {:.0}ms | {:.1} req/s",
            self.peak_vus,
            self.success_pct,
            self.avg_response_ms,
            self.p95_response_ms,
            self.requests_per_sec
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
    use std::sync::Mutex;
    use volley_client::ClientError;

    fn listing(status: u16, content_type: &str, body: &str, elapsed_ms: u64) -> TimedResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        TimedResponse {
            status,
            headers,
            body: body.to_string(),
            elapsed: Duration::from_millis(elapsed_ms),
        }
    }

    /// Contest API replaying queued answers
    struct QueuedContests {
        answers: Mutex<Vec<Result<TimedResponse, ClientError>>>,
    }

    impl QueuedContests {
        fn new(mut answers: Vec<Result<TimedResponse, ClientError>>) -> Arc<Self> {
            answers.reverse();
            Arc::new(Self {
                answers: Mutex::new(answers),
            })
        }
    }

    #[async_trait]
    impl ContestApi for QueuedContests {
        async fn list_contests(&self, _space_id: &str) -> Result<TimedResponse, ClientError> {
            self.answers
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ClientError::InvalidRequest("no more answers".into())))
        }
    }

    fn contest(api: Arc<QueuedContests>) -> (ContestScenario, Arc<MetricsRegistry>) {
        let registry = Arc::new(MetricsRegistry::new());
        let scenario = ContestScenario::with_api(ContestConfig::default(), api, Arc::clone(&registry));
        (scenario, registry)
    }

    fn tally(registry: &MetricsRegistry, check: &str) -> (u64, u64) {
        registry
            .checks()
            .tallies()
            .into_iter()
            .find(|(name, _)| name == check)
            .map(|(_, t)| (t.passes, t.fails))
            .unwrap_or_default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_listing_still_succeeds() {
        let api = QueuedContests::new(vec![Ok(listing(
            200,
            "application/json;charset=UTF-8",
            "[]",
            1500,
        ))]);
        let (scenario, registry) = contest(api);

        let mut rng = Rng::with_seed(3);
        scenario.iteration(&mut rng).await;

        assert_eq!(registry.counter("request_success").get(), 1);
        assert_eq!(registry.rate("contest_list_success_rate").rate(), Some(1.0));
        assert_eq!(tally(&registry, "response time < 1000ms"), (0, 1));
        assert_eq!(tally(&registry, "has valid JSON response"), (1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_check_named_after_limit() {
        let api = QueuedContests::new(vec![
            Ok(listing(200, "application/json", "[]", 100)),
            Ok(listing(200, "application/json", "[]", 400)),
        ]);
        let registry = Arc::new(MetricsRegistry::new());
        let config = ContestConfig {
            max_response_time: Duration::from_millis(250),
            ..ContestConfig::default()
        };
        let scenario = ContestScenario::with_api(config, api, Arc::clone(&registry));

        let mut rng = Rng::with_seed(3);
        scenario.iteration(&mut rng).await;
        scenario.iteration(&mut rng).await;

        assert_eq!(tally(&registry, "response time < 250ms"), (1, 1));
        assert!(
            registry
                .checks()
                .tallies()
                .iter()
                .all(|(name, _)| name != "response time < 1000ms")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_by_shape() {
        let api = QueuedContests::new(vec![
            Ok(listing(200, "application/json", r#"{"items":[]}"#, 10)),
            Ok(listing(200, "text/html", "[]", 10)),
            Ok(listing(500, "application/json", "[]", 10)),
            Err(ClientError::InvalidRequest("connection refused".into())),
        ]);
        let (scenario, registry) = contest(api);

        let mut rng = Rng::with_seed(3);
        for _ in 0..4 {
            scenario.iteration(&mut rng).await;
        }

        assert_eq!(registry.counter("request_success").get(), 0);
        assert_eq!(registry.counter("request_failure").get(), 4);
        assert_eq!(tally(&registry, "content-type is JSON"), (2, 2));
        assert_eq!(tally(&registry, "status is 200"), (2, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_think_time_bounds() {
        let (scenario, _) = contest(QueuedContests::new(Vec::new()));
        let mut rng = Rng::with_seed(11);
        for _ in 0..100 {
            let pause = scenario.think_time(&mut rng);
            assert!(pause >= Duration::from_millis(100));
            assert!(pause <= Duration::from_millis(600));
        }
    }

    #[test]
    fn test_grades() {
        assert_eq!(Grade::lower_is_better(150.0, [200.0, 500.0, 1000.0]), Grade::Excellent);
        assert_eq!(Grade::lower_is_better(500.0, [200.0, 500.0, 1000.0]), Grade::Fair);
        assert_eq!(Grade::lower_is_better(5000.0, [200.0, 500.0, 1000.0]), Grade::Poor);
        assert_eq!(Grade::higher_is_better(95.0, [99.0, 95.0, 90.0]), Grade::Good);
        assert_eq!(Grade::higher_is_better(10.0, [100.0, 50.0, 20.0]), Grade::Poor);
    }

    #[test]
    fn test_report_from_run() {
        let registry = MetricsRegistry::new();
        registry.counter("request_success").add(95);
        registry.counter("request_failure").add(5);
        let duration = registry.trend("http_req_duration");
        for _ in 0..100 {
            duration.add_millis(300.0);
        }
        let failed = registry.rate("http_req_failed");
        for i in 0..100 {
            failed.add(i < 5);
        }

        let stats = ExecutionStats {
            iterations: 100,
            peak_vus: 30,
            elapsed: Duration::from_secs(10),
            aborted: 0,
        };
        let report = ContestReport::from_run(&registry, &stats);

        assert_eq!(report.total_requests, 100);
        assert!((report.success_pct - 95.0).abs() < 1e-9);
        assert!((report.requests_per_sec - 10.0).abs() < 1e-9);
        assert_eq!(report.response_avg_grade, Grade::Good);
        assert_eq!(report.stability_grade, Grade::Good);
        assert_eq!(report.throughput_grade, Grade::Poor);
        assert!(
            report
                .recommendations
                .iter()
                .any(|r| r.starts_with("Low throughput"))
        );
        assert!(report.headline().contains("30VU"));
    }
}
