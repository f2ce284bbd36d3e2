//! Task events
//!
//! Everything the task poller observes is reported as a [`TaskEvent`] to an
//! injected [`TaskEventSink`]. The poller never touches metrics directly.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use volley_core::domain::task::{SaveMode, TaskId};

use crate::metrics::{MetricsRegistry, Rate, Trend};

/// One step of a submit + poll sequence
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// The service accepted the work and assigned an id
    Submitted { task_id: TaskId, latency: Duration },

    /// Not accepted, or accepted without an id; no polling follows
    SubmissionFailed { status: Option<u16>, reason: String },

    /// A valid status showing the task still running
    Progress {
        task_id: TaskId,
        poll: u32,
        progress: f64,
        completed_files: u64,
        total_files: u64,
    },

    /// Bad status, malformed body or id mismatch; polling continues
    StatusCheckFailed {
        task_id: TaskId,
        poll: u32,
        status: Option<u16>,
        reason: String,
    },

    /// The service reported the task complete
    Completed {
        task_id: TaskId,
        polls: u32,
        elapsed: Duration,
        saved: usize,
        failed: usize,
        partial_failure: bool,
    },

    /// Completed, but more items failed than the policy tolerates
    PartialFailure {
        task_id: TaskId,
        failure_ratio: f64,
        threshold: f64,
    },

    /// The service no longer knows the task; polling stopped
    TaskNotFound { task_id: TaskId, polls: u32 },

    /// The poll budget ran out before completion
    TaskTimeout {
        task_id: TaskId,
        polls: u32,
        waited: Duration,
    },
}

impl TaskEvent {
    /// Whether this event counts against the error rate
    ///
    /// Not-found is a terminal state of its own and partial failure is
    /// advisory; neither is an error.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            TaskEvent::SubmissionFailed { .. }
                | TaskEvent::StatusCheckFailed { .. }
                | TaskEvent::TaskTimeout { .. }
        )
    }

    /// Whether this event ends the sequence without error
    pub fn is_clean_end(&self) -> bool {
        matches!(
            self,
            TaskEvent::Completed { .. } | TaskEvent::TaskNotFound { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Submitted { .. } => "Submitted",
            TaskEvent::SubmissionFailed { .. } => "SubmissionFailed",
            TaskEvent::Progress { .. } => "Progress",
            TaskEvent::StatusCheckFailed { .. } => "StatusCheckFailed",
            TaskEvent::Completed { .. } => "Completed",
            TaskEvent::PartialFailure { .. } => "PartialFailure",
            TaskEvent::TaskNotFound { .. } => "TaskNotFound",
            TaskEvent::TaskTimeout { .. } => "TaskTimeout",
        }
    }
}

/// Receiver of task events
pub trait TaskEventSink: Send + Sync {
    fn record(&self, event: TaskEvent);
}

/// Sink that turns task events into metrics, checks and log lines
///
/// Metrics:
/// - `errors` rate: `true` per error event, `false` per clean end
/// - `download_duration` trend: submit latency
/// - `task_completion_time` trend: time from first poll wait to completion
pub struct MetricsEventSink {
    mode: SaveMode,
    label: String,
    registry: Arc<MetricsRegistry>,
    errors: Arc<Rate>,
    download_duration: Arc<Trend>,
    task_completion_time: Arc<Trend>,
}

impl MetricsEventSink {
    pub fn new(mode: SaveMode, registry: Arc<MetricsRegistry>) -> Self {
        Self {
            mode,
            label: mode.as_str().to_uppercase(),
            errors: registry.rate("errors"),
            download_duration: registry.trend("download_duration"),
            task_completion_time: registry.trend("task_completion_time"),
            registry,
        }
    }

    fn check(&self, name: &str, passed: bool) {
        self.registry.check(&format!("{} {}", self.mode, name), passed);
    }
}

impl TaskEventSink for MetricsEventSink {
    fn record(&self, event: TaskEvent) {
        let label = &self.label;

        match &event {
            TaskEvent::Submitted { task_id, latency } => {
                self.check("download request successful", true);
                self.check("response has taskId", true);
                self.download_duration.add_duration(*latency);
                info!("[{}] Task started with ID: {}", label, task_id);
            }
            TaskEvent::SubmissionFailed { status, reason } => {
                self.check("download request successful", *status == Some(202));
                self.check("response has taskId", false);
                error!(
                    "[{}] Download request failed: {} - {}",
                    label,
                    status.map_or_else(|| "no response".to_string(), |s| s.to_string()),
                    reason
                );
            }
            TaskEvent::Progress {
                task_id,
                poll,
                progress,
                completed_files,
                total_files,
            } => {
                self.check("status request successful", true);
                self.check("status response is valid", true);
                debug!(
                    "[{}] Task {} - Poll {}: {}% ({}/{})",
                    label, task_id, poll, progress, completed_files, total_files
                );
            }
            TaskEvent::StatusCheckFailed {
                task_id,
                poll,
                status,
                reason,
            } => {
                self.check("status request successful", *status == Some(200));
                self.check("status response is valid", false);
                error!(
                    "[{}] Status check failed for task {} (poll {}): {}",
                    label, task_id, poll, reason
                );
            }
            TaskEvent::Completed {
                task_id,
                polls,
                elapsed,
                saved,
                failed,
                partial_failure,
            } => {
                self.check("status request successful", true);
                self.check("status response is valid", true);
                self.check("task completed successfully", true);
                self.check("has saved files", *saved > 0);
                self.check("error rate acceptable", !partial_failure);
                self.task_completion_time.add_duration(*elapsed);
                info!(
                    "[{}] Task {} completed in {}ms after {} poll(s) (saved: {}, failed: {})",
                    label,
                    task_id,
                    elapsed.as_millis(),
                    polls,
                    saved,
                    failed
                );
            }
            TaskEvent::PartialFailure {
                task_id,
                failure_ratio,
                threshold,
            } => {
                warn!(
                    "[{}] Task {} failed {:.1}% of its files (limit {:.1}%)",
                    label,
                    task_id,
                    failure_ratio * 100.0,
                    threshold * 100.0
                );
            }
            TaskEvent::TaskNotFound { task_id, polls } => {
                self.check("status request successful", false);
                self.check("status response is valid", false);
                info!(
                    "[{}] Task {} not found after {} poll(s) - may have been cleaned up",
                    label, task_id, polls
                );
            }
            TaskEvent::TaskTimeout {
                task_id, waited, ..
            } => {
                error!(
                    "[{}] Task {} did not complete within {} seconds",
                    label,
                    task_id,
                    waited.as_secs()
                );
            }
        }

        if event.is_error() {
            self.errors.add(true);
        } else if event.is_clean_end() {
            self.errors.add(false);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Sink that keeps every event for assertions
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        events: Mutex<Vec<TaskEvent>>,
    }

    impl RecordingSink {
        pub(crate) fn events(&self) -> Vec<TaskEvent> {
            self.events.lock().unwrap().clone()
        }

        pub(crate) fn names(&self) -> Vec<&'static str> {
            self.events().iter().map(TaskEvent::name).collect()
        }
    }

    impl TaskEventSink for RecordingSink {
        fn record(&self, event: TaskEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn test_error_classification() {
        let id = TaskId::from("T1");
        assert!(
            TaskEvent::TaskTimeout {
                task_id: id.clone(),
                polls: 3,
                waited: Duration::from_secs(15),
            }
            .is_error()
        );
        let not_found = TaskEvent::TaskNotFound {
            task_id: id.clone(),
            polls: 1,
        };
        assert!(!not_found.is_error());
        assert!(not_found.is_clean_end());
        assert!(
            !TaskEvent::PartialFailure {
                task_id: id,
                failure_ratio: 0.5,
                threshold: 0.1,
            }
            .is_error()
        );
    }

    #[test]
    fn test_metrics_sink_records_errors_and_checks() {
        let registry = Arc::new(MetricsRegistry::new());
        let sink = MetricsEventSink::new(SaveMode::Async, Arc::clone(&registry));
        let id = TaskId::from("T1");

        sink.record(TaskEvent::Submitted {
            task_id: id.clone(),
            latency: Duration::from_millis(40),
        });
        sink.record(TaskEvent::StatusCheckFailed {
            task_id: id.clone(),
            poll: 1,
            status: Some(500),
            reason: "boom".to_string(),
        });
        sink.record(TaskEvent::Completed {
            task_id: id,
            polls: 2,
            elapsed: Duration::from_secs(10),
            saved: 0,
            failed: 0,
            partial_failure: false,
        });

        let errors = registry.rate("errors");
        assert_eq!(errors.total(), 2);
        assert_eq!(errors.hits(), 1);
        assert_eq!(registry.trend("download_duration").count(), 1);
        assert_eq!(
            registry.trend("task_completion_time").stats().unwrap().max,
            10_000.0
        );

        let tallies = registry.checks().tallies();
        let has_saved = tallies
            .iter()
            .find(|(name, _)| name == "async has saved files")
            .map(|(_, tally)| *tally)
            .unwrap();
        assert_eq!(has_saved.fails, 1);
    }

    #[test]
    fn test_forgotten_task_fails_status_checks() {
        let registry = Arc::new(MetricsRegistry::new());
        let sink = MetricsEventSink::new(SaveMode::Zip, Arc::clone(&registry));

        sink.record(TaskEvent::TaskNotFound {
            task_id: TaskId::from("T1"),
            polls: 2,
        });

        let tallies = registry.checks().tallies();
        for name in ["zip status request successful", "zip status response is valid"] {
            let tally = tallies
                .iter()
                .find(|(check, _)| check == name)
                .map(|(_, tally)| *tally)
                .unwrap();
            assert_eq!((tally.passes, tally.fails), (0, 1), "{}", name);
        }

        // Not found still ends the iteration cleanly
        let errors = registry.rate("errors");
        assert_eq!((errors.hits(), errors.total()), (0, 1));
    }
}
