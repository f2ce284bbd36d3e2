//! Runner configuration
//!
//! Plain configuration structs for the executor and each scenario. The CLI
//! fills them from flags and environment variables; everything here has a
//! `Default` matching the stock load profiles and a `validate()` that
//! rejects settings a run cannot start with.

use std::time::Duration;
use volley_core::domain::task::SaveMode;
use volley_core::schedule::{Stage, peak_target, total_duration};
use volley_core::threshold::{Aggregate, Comparison, Threshold, ThresholdSet};

use crate::service::{CacheProfile, PollPolicy};

fn validate_base_url(base_url: &str) -> anyhow::Result<()> {
    if base_url.is_empty() {
        anyhow::bail!("base_url cannot be empty");
    }

    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        anyhow::bail!("base_url must start with http:// or https://");
    }

    Ok(())
}

/// Ramping executor configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// VU target at the start of the first stage
    pub start_vus: usize,

    /// Ramp schedule
    pub stages: Vec<Stage>,

    /// How often the controller re-evaluates the VU target
    pub tick: Duration,

    /// How long running iterations may finish after the schedule ends
    pub graceful_stop: Duration,
}

impl ExecutorConfig {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            start_vus: 0,
            stages,
            tick: Duration::from_millis(100),
            graceful_stop: Duration::from_secs(30),
        }
    }

    pub fn total_duration(&self) -> Duration {
        total_duration(&self.stages)
    }

    /// Most VUs the schedule will ever ask for
    pub fn peak_vus(&self) -> usize {
        peak_target(self.start_vus, &self.stages)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stages.is_empty() {
            anyhow::bail!("at least one stage is required");
        }

        if self.total_duration().is_zero() {
            anyhow::bail!("stages must last longer than zero");
        }

        if self.tick.is_zero() {
            anyhow::bail!("tick must be greater than 0");
        }

        Ok(())
    }
}

/// Limits behind the download thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadLimits {
    /// p(95) bound for `http_req_duration`
    pub max_response_time: Duration,
    /// Bound for the `errors` rate
    pub max_error_rate: f64,
    /// p(90) bound for `task_completion_time`
    pub max_task_completion_time: Duration,
}

impl Default for DownloadLimits {
    fn default() -> Self {
        Self {
            max_response_time: Duration::from_secs(10),
            max_error_rate: 0.05,
            max_task_completion_time: Duration::from_secs(300),
        }
    }
}

/// Resume-file download scenario configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadConfig {
    /// Download service base URL (e.g., "http://localhost:8080")
    pub base_url: String,
    pub space_id: String,
    pub user_id: String,
    pub repository: String,
    pub branch: String,

    /// Which save-files route to exercise
    pub mode: SaveMode,

    /// Bounds of the random file count per submission
    pub min_files: usize,
    pub max_files: usize,

    /// Paths to pick from
    pub files: Vec<String>,

    /// Delay before each status query
    pub poll_interval: Duration,

    /// Status queries per task before giving up
    pub max_polls: u32,

    pub status_timeout: Duration,
    pub request_timeout: Duration,

    /// Failure ratio above which a completed task is flagged
    pub failure_threshold: f64,

    pub limits: DownloadLimits,
}

impl DownloadConfig {
    /// Warmup, small, medium, heavy, stress, cooldown
    pub fn default_stages() -> Vec<Stage> {
        let minutes = |m: u64| Duration::from_secs(m * 60);
        vec![
            Stage::new(minutes(1), 1),
            Stage::new(minutes(2), 10),
            Stage::new(minutes(2), 50),
            Stage::new(minutes(3), 100),
            Stage::new(minutes(2), 200),
            Stage::new(minutes(1), 0),
        ]
    }

    pub fn thresholds(&self) -> ThresholdSet {
        ThresholdSet::new()
            .with(
                "http_req_duration",
                Threshold::new(
                    Aggregate::Percentile(95.0),
                    Comparison::Less,
                    self.limits.max_response_time.as_millis() as f64,
                ),
            )
            .with(
                "errors",
                Threshold::new(Aggregate::Rate, Comparison::Less, self.limits.max_error_rate),
            )
            .with(
                "task_completion_time",
                Threshold::new(
                    Aggregate::Percentile(90.0),
                    Comparison::Less,
                    self.limits.max_task_completion_time.as_millis() as f64,
                ),
            )
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            failure_threshold: self.failure_threshold,
            ..PollPolicy::new(self.poll_interval, self.max_polls)
        }
    }

    /// Uses the bundled list of dummy paths
    pub fn with_generated_files(mut self, count: usize) -> Self {
        self.files = generate_file_paths(count);
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_base_url(&self.base_url)?;

        if self.space_id.is_empty() || self.user_id.is_empty() {
            anyhow::bail!("space_id and user_id cannot be empty");
        }

        if self.repository.is_empty() {
            anyhow::bail!("repository cannot be empty");
        }

        if self.min_files == 0 {
            anyhow::bail!("min_files must be greater than 0");
        }

        if self.min_files > self.max_files {
            anyhow::bail!(
                "min_files ({}) cannot exceed max_files ({})",
                self.min_files,
                self.max_files
            );
        }

        if self.files.is_empty() {
            anyhow::bail!("file list cannot be empty");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.max_polls == 0 {
            anyhow::bail!("max_polls must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.failure_threshold) {
            anyhow::bail!("failure_threshold must be between 0 and 1");
        }

        Ok(())
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            space_id: "1".to_string(),
            user_id: "1".to_string(),
            repository: "test-user/test-repo-100".to_string(),
            branch: "main".to_string(),
            mode: SaveMode::Async,
            min_files: 1,
            max_files: 100,
            files: generate_file_paths(100),
            poll_interval: Duration::from_secs(5),
            max_polls: 60,
            status_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            failure_threshold: crate::service::poller::DEFAULT_FAILURE_THRESHOLD,
            limits: DownloadLimits::default(),
        }
    }
}

/// Dummy repository paths used when no file list is supplied
pub fn generate_file_paths(count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| format!("src/dummy/file-{:03}.md", i))
        .collect()
}

/// Parses a file list, one path per line; blank lines and `#` comments are skipped
pub fn parse_file_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Auth gateway implementation under test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayVariant {
    Complex,
    Redis,
    Simple,
}

impl GatewayVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayVariant::Complex => "complex",
            GatewayVariant::Redis => "redis",
            GatewayVariant::Simple => "simple",
        }
    }

    /// What the variant's gateway does with refresh tokens
    pub fn description(&self) -> &'static str {
        match self {
            GatewayVariant::Complex => "complex locking",
            GatewayVariant::Redis => "Redis token cache",
            GatewayVariant::Simple => "simple logic (locks removed)",
        }
    }

    /// Typical refresh latency the variant is expected to show
    pub fn expected_latency(&self) -> Duration {
        match self {
            GatewayVariant::Complex => Duration::from_millis(800),
            GatewayVariant::Redis | GatewayVariant::Simple => Duration::from_millis(100),
        }
    }

    pub fn cache_profile(&self) -> CacheProfile {
        match self {
            GatewayVariant::Complex => CacheProfile::complex(),
            GatewayVariant::Redis => CacheProfile::redis(),
            GatewayVariant::Simple => CacheProfile::simple(),
        }
    }

    pub fn thresholds(&self) -> ThresholdSet {
        let (duration_p95, refresh_p95, failed_rate) = match self {
            GatewayVariant::Complex => (2000.0, 1500.0, 0.05),
            GatewayVariant::Redis => (2000.0, 1500.0, 0.01),
            GatewayVariant::Simple => (500.0, 300.0, 0.02),
        };

        ThresholdSet::new()
            .with(
                "http_req_duration",
                Threshold::new(Aggregate::Percentile(95.0), Comparison::Less, duration_p95),
            )
            .with(
                "refresh_token_latency",
                Threshold::new(Aggregate::Percentile(95.0), Comparison::Less, refresh_p95),
            )
            .with(
                "http_req_failed",
                Threshold::new(Aggregate::Rate, Comparison::Less, failed_rate),
            )
    }
}

impl std::fmt::Display for GatewayVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GatewayVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "complex" => Ok(GatewayVariant::Complex),
            "redis" => Ok(GatewayVariant::Redis),
            "simple" => Ok(GatewayVariant::Simple),
            other => Err(format!(
                "Invalid test type: {}. Valid types: complex, redis, simple",
                other
            )),
        }
    }
}

/// Auth gateway scenario configuration
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Gateway base URL (e.g., "http://localhost:9000")
    pub base_url: String,
    pub variant: GatewayVariant,

    /// Accounts signed up during setup
    pub accounts: usize,

    /// Password shared by every test account
    pub password: String,

    /// Pause between repeat calls
    pub repeat_gap: Duration,

    /// Pause at the end of each iteration
    pub think_time: Duration,

    /// Signup and login calls slower than this fail their latency check
    pub auth_latency_limit: Duration,
}

impl GatewayConfig {
    pub fn default_stages() -> Vec<Stage> {
        let minutes = |m: u64| Duration::from_secs(m * 60);
        vec![
            Stage::new(minutes(1), 1),
            Stage::new(minutes(2), 10),
            Stage::new(minutes(2), 50),
            Stage::new(minutes(2), 100),
            Stage::new(minutes(1), 0),
        ]
    }

    pub fn thresholds(&self) -> ThresholdSet {
        self.variant.thresholds()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_base_url(&self.base_url)?;

        if self.accounts == 0 {
            anyhow::bail!("accounts must be greater than 0");
        }

        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            variant: GatewayVariant::Complex,
            accounts: 100,
            password: "1234".to_string(),
            repeat_gap: Duration::from_millis(100),
            think_time: Duration::from_secs(1),
            auth_latency_limit: Duration::from_secs(3),
        }
    }
}

/// Contest-listing scenario configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ContestConfig {
    /// Contest API base URL (e.g., "http://localhost:9040")
    pub base_url: String,
    pub space_id: String,

    /// Bounds of the random pause after each iteration
    pub think_time_min: Duration,
    pub think_time_max: Duration,

    /// Responses slower than this fail the response-time check
    pub max_response_time: Duration,
}

impl ContestConfig {
    pub fn default_stages() -> Vec<Stage> {
        let secs = Duration::from_secs;
        vec![
            Stage::new(secs(10), 10),
            Stage::new(secs(20), 10),
            Stage::new(secs(10), 20),
            Stage::new(secs(20), 20),
            Stage::new(secs(10), 30),
            Stage::new(secs(20), 30),
            Stage::new(secs(10), 0),
        ]
    }

    pub fn thresholds(&self) -> ThresholdSet {
        let limit = self.max_response_time.as_millis() as f64;
        ThresholdSet::new()
            .with(
                "request_duration",
                Threshold::new(Aggregate::Percentile(95.0), Comparison::Less, limit),
            )
            .with(
                "contest_list_success_rate",
                Threshold::new(Aggregate::Rate, Comparison::Greater, 0.95),
            )
            .with(
                "http_req_failed",
                Threshold::new(Aggregate::Rate, Comparison::Less, 0.05),
            )
            .with(
                "http_req_duration",
                Threshold::new(Aggregate::Percentile(95.0), Comparison::Less, limit),
            )
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_base_url(&self.base_url)?;

        if self.space_id.is_empty() {
            anyhow::bail!("space_id cannot be empty");
        }

        if self.think_time_min > self.think_time_max {
            anyhow::bail!("think_time_min cannot exceed think_time_max");
        }

        Ok(())
    }
}

impl Default for ContestConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9040".to_string(),
            space_id: "1".to_string(),
            think_time_min: Duration::from_millis(100),
            think_time_max: Duration::from_millis(600),
            max_response_time: Duration::from_secs(1),
        }
    }
}
