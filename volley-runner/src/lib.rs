//! Volley Runner
//!
//! Load-test engine for the services Volley targets.
//!
//! Architecture:
//! - Configuration: executor and per-scenario settings with validation
//! - Repositories: HTTP communication with the services under test
//! - Services: the async task poller, its event sink and the latency classifier
//! - Scheduler: the ramping-VUs executor
//! - Scenarios: download, gateway and contest load tests
//! - Metrics and summary: accumulators, thresholds and the end-of-run report
//!
//! A run is `setup`, then the ramp schedule with one task per VU, then
//! `teardown`, and finally threshold evaluation over everything recorded.

pub mod config;
pub mod metrics;
pub mod repository;
pub mod run;
pub mod scenario;
pub mod scheduler;
pub mod service;
pub mod summary;

pub use run::{RunReport, run_scenario};
