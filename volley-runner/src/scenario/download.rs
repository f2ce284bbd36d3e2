//! Resume-file download scenario
//!
//! Every iteration submits a save-files task for a random subset of the
//! repository's files and polls it to a terminal state.

use async_trait::async_trait;
use fastrand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use volley_client::{ResumeScope, ServiceClient};
use volley_core::dto::task::SaveFilesRequest;
use volley_core::schedule::format_duration;

use crate::config::DownloadConfig;
use crate::metrics::{HttpMetrics, MetricsRegistry};
use crate::repository::{HttpTaskApi, TaskApi};
use crate::scenario::Scenario;
use crate::service::{MetricsEventSink, TaskPoller};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DownloadScenario {
    config: DownloadConfig,
    client: ServiceClient,
    poller: TaskPoller,
    http: HttpMetrics,
}

impl DownloadScenario {
    /// Creates the scenario against the configured download service
    pub fn new(config: DownloadConfig, registry: Arc<MetricsRegistry>) -> Self {
        let client = ServiceClient::new(config.base_url.clone());
        let scope = ResumeScope {
            space_id: config.space_id.clone(),
            user_id: config.user_id.clone(),
        };
        let api = HttpTaskApi::new(
            client.clone(),
            scope,
            config.mode,
            config.request_timeout,
            config.status_timeout,
            HttpMetrics::new(&registry),
        );
        Self::with_api(config, client, Arc::new(api), registry)
    }

    /// Creates the scenario on top of an existing task repository
    pub fn with_api(
        config: DownloadConfig,
        client: ServiceClient,
        api: Arc<dyn TaskApi>,
        registry: Arc<MetricsRegistry>,
    ) -> Self {
        let http = HttpMetrics::new(&registry);
        let sink = Arc::new(MetricsEventSink::new(config.mode, registry));
        let poller = TaskPoller::new(api, sink, config.poll_policy());
        Self {
            config,
            client,
            poller,
            http,
        }
    }

    /// Picks a random number of distinct paths within the configured bounds
    ///
    /// The count is clamped to the number of available paths.
    pub fn pick_files(&self, rng: &mut Rng) -> Vec<String> {
        let available = self.config.files.len();
        let max = self.config.max_files.min(available);
        let min = self.config.min_files.min(max);
        let count = rng.usize(min..=max);

        let mut files = self.config.files.clone();
        rng.shuffle(&mut files);
        files.truncate(count);
        files
    }

    fn label(&self) -> String {
        self.config.mode.as_str().to_uppercase()
    }
}

#[async_trait]
impl Scenario for DownloadScenario {
    type Actor = Rng;

    fn name(&self) -> String {
        self.config.mode.test_name().to_string()
    }

    async fn setup(&self) -> anyhow::Result<()> {
        let config = &self.config;
        info!("=== Starting {} ===", config.mode.test_name());
        info!("Test Type: {}", self.label());
        info!("Endpoint: /save-files/{}", config.mode);
        info!("Base URL: {}", config.base_url);
        info!("Repository: {}, Branch: {}", config.repository, config.branch);
        info!(
            "File range: {}-{}, Total available: {}",
            config.min_files,
            config.max_files,
            config.files.len()
        );
        info!(
            "Polling: every {} up to {} time(s)",
            format_duration(config.poll_interval),
            config.max_polls
        );
        info!(
            "Thresholds: p95 response < {}ms, error rate < {}%, p90 task time < {}ms",
            config.limits.max_response_time.as_millis(),
            config.limits.max_error_rate * 100.0,
            config.limits.max_task_completion_time.as_millis()
        );

        match self.client.health(HEALTH_CHECK_TIMEOUT).await {
            Ok(response) => {
                self.http.record_response(&response);
                if response.status != 200 {
                    warn!(
                        "Health check returned {}, but continuing with test",
                        response.status
                    );
                }
            }
            Err(e) => {
                self.http.record(e.status(), HEALTH_CHECK_TIMEOUT);
                warn!("Health check failed ({}), but continuing with test", e);
            }
        }

        Ok(())
    }

    async fn start_actor(&self, _vu: usize) -> Rng {
        Rng::new()
    }

    async fn iteration(&self, rng: &mut Rng) {
        let files = self.pick_files(rng);
        info!(
            "[{}] Testing with {} random files from {}",
            self.label(),
            files.len(),
            self.config.repository
        );

        let req = SaveFilesRequest {
            repository: self.config.repository.clone(),
            file_paths: files,
            branch: self.config.branch.clone(),
        };

        // Every outcome has already been reported to the event sink
        if let Err(e) = self.poller.run(&req).await {
            debug!("[{}] Iteration ended early: {}", self.label(), e);
        }
    }

    async fn teardown(&self) {
        info!("{} completed", self.config.mode.test_name());
    }
}
