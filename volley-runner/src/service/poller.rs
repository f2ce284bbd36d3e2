//! Async task poller
//!
//! Submits a unit of work, then polls the task's status with a fixed delay
//! until the service reports completion, forgets the task, or the poll
//! budget runs out. Every step is reported to a [`TaskEventSink`].

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{self, Instant};
use volley_client::ClientError;
use volley_core::domain::task::TaskId;
use volley_core::dto::task::{SaveFilesRequest, SubmitAccepted};

use crate::repository::TaskApi;
use crate::service::events::{TaskEvent, TaskEventSink};

/// Failure ratio above which a completed task is flagged
pub const DEFAULT_FAILURE_THRESHOLD: f64 = 0.1;

/// Polling parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Delay before each status query
    pub interval: Duration,
    /// Maximum number of status queries
    pub max_polls: u32,
    /// Completed tasks failing more than this share of items are flagged
    pub failure_threshold: f64,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_polls: u32) -> Self {
        Self {
            interval,
            max_polls,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }

    /// Longest time polling can take, ignoring request latency
    pub fn budget(&self) -> Duration {
        self.interval * self.max_polls
    }
}

/// Why a submission did not yield a task
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("submission rejected: {0}")]
    Rejected(#[from] ClientError),

    #[error("submission accepted without a taskId")]
    MissingTaskId,
}

/// Result of a completed task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskCompletion {
    pub task_id: TaskId,
    pub polls: u32,
    pub elapsed: Duration,
    pub saved_files: Vec<String>,
    pub failed_files: Vec<String>,
    pub partial_failure: bool,
}

/// How polling ended
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(TaskCompletion),
    NotFound { task_id: TaskId, polls: u32 },
    TimedOut { task_id: TaskId, polls: u32 },
}

impl PollOutcome {
    /// Number of status queries issued
    pub fn polls(&self) -> u32 {
        match self {
            PollOutcome::Completed(completion) => completion.polls,
            PollOutcome::NotFound { polls, .. } | PollOutcome::TimedOut { polls, .. } => *polls,
        }
    }
}

/// Drives the submit + poll protocol for one task at a time
///
/// A poller holds no per-task state, so one instance can be shared by every
/// virtual user.
#[derive(Clone)]
pub struct TaskPoller {
    api: Arc<dyn TaskApi>,
    sink: Arc<dyn TaskEventSink>,
    policy: PollPolicy,
}

impl TaskPoller {
    pub fn new(api: Arc<dyn TaskApi>, sink: Arc<dyn TaskEventSink>, policy: PollPolicy) -> Self {
        Self { api, sink, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Submits the work and, if accepted, polls it to a terminal state
    pub async fn run(&self, req: &SaveFilesRequest) -> Result<PollOutcome, SubmitError> {
        let task_id = self.submit(req).await?;
        Ok(self.poll(&task_id).await)
    }

    /// Submits a unit of work and returns the assigned task id
    ///
    /// Failures are reported as [`TaskEvent::SubmissionFailed`] and never retried.
    pub async fn submit(&self, req: &SaveFilesRequest) -> Result<TaskId, SubmitError> {
        let start = Instant::now();

        match self.api.submit(req).await {
            Ok(SubmitAccepted {
                task_id: Some(task_id),
            }) => {
                self.sink.record(TaskEvent::Submitted {
                    task_id: task_id.clone(),
                    latency: start.elapsed(),
                });
                Ok(task_id)
            }
            Ok(SubmitAccepted { task_id: None }) => {
                self.sink.record(TaskEvent::SubmissionFailed {
                    status: Some(202),
                    reason: "response has no taskId".to_string(),
                });
                Err(SubmitError::MissingTaskId)
            }
            Err(e) => {
                self.sink.record(TaskEvent::SubmissionFailed {
                    status: e.status(),
                    reason: e.to_string(),
                });
                Err(SubmitError::Rejected(e))
            }
        }
    }

    /// Polls a task until completion, not-found, or budget exhaustion
    ///
    /// Each iteration waits `interval` first, then issues exactly one
    /// status query.
    pub async fn poll(&self, task_id: &TaskId) -> PollOutcome {
        let started = Instant::now();

        for poll in 1..=self.policy.max_polls {
            time::sleep(self.policy.interval).await;

            match self.api.status(task_id).await {
                Ok(status) if status.is_for(task_id) => {
                    if status.completed {
                        let failure_ratio = status.failure_ratio();
                        let partial_failure = failure_ratio > self.policy.failure_threshold;
                        let completion = TaskCompletion {
                            task_id: task_id.clone(),
                            polls: poll,
                            elapsed: started.elapsed(),
                            saved_files: status.saved_files,
                            failed_files: status.failed_files,
                            partial_failure,
                        };

                        self.sink.record(TaskEvent::Completed {
                            task_id: task_id.clone(),
                            polls: poll,
                            elapsed: completion.elapsed,
                            saved: completion.saved_files.len(),
                            failed: completion.failed_files.len(),
                            partial_failure,
                        });
                        if partial_failure {
                            self.sink.record(TaskEvent::PartialFailure {
                                task_id: task_id.clone(),
                                failure_ratio,
                                threshold: self.policy.failure_threshold,
                            });
                        }

                        return PollOutcome::Completed(completion);
                    }

                    self.sink.record(TaskEvent::Progress {
                        task_id: task_id.clone(),
                        poll,
                        progress: status.progress,
                        completed_files: status.completed_files,
                        total_files: status.total_files,
                    });
                }
                Ok(status) => {
                    let reported = status
                        .task_id
                        .as_ref()
                        .map_or_else(|| "none".to_string(), |id| id.to_string());
                    self.sink.record(TaskEvent::StatusCheckFailed {
                        task_id: task_id.clone(),
                        poll,
                        status: Some(200),
                        reason: format!("status response is for task {}", reported),
                    });
                }
                Err(e) if e.is_not_found() => {
                    self.sink.record(TaskEvent::TaskNotFound {
                        task_id: task_id.clone(),
                        polls: poll,
                    });
                    return PollOutcome::NotFound {
                        task_id: task_id.clone(),
                        polls: poll,
                    };
                }
                Err(e) => {
                    self.sink.record(TaskEvent::StatusCheckFailed {
                        task_id: task_id.clone(),
                        poll,
                        status: e.status(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.sink.record(TaskEvent::TaskTimeout {
            task_id: task_id.clone(),
            polls: self.policy.max_polls,
            waited: self.policy.budget(),
        });
        PollOutcome::TimedOut {
            task_id: task_id.clone(),
            polls: self.policy.max_polls,
        }
    }
}
