//! Task repository
//!
//! Handles communication with the download service for the save-files
//! task protocol:
//! - Submitting a save-files task
//! - Querying a task's status

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use volley_client::{ClientError, ResumeScope, ServiceClient};
use volley_core::domain::task::{SaveMode, TaskId, TaskStatus};
use volley_core::dto::task::{SaveFilesRequest, SubmitAccepted};

use crate::metrics::HttpMetrics;

/// Repository trait for the remote task protocol
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Submits a unit of work
    ///
    /// `Ok` means the service answered 202; the body may still lack an id.
    async fn submit(&self, req: &SaveFilesRequest) -> Result<SubmitAccepted, ClientError>;

    /// Fetches the current state of a task
    ///
    /// A task the service no longer knows yields an error for which
    /// [`ClientError::is_not_found`] is true.
    async fn status(&self, task_id: &TaskId) -> Result<TaskStatus, ClientError>;
}

/// HTTP implementation of TaskApi
pub struct HttpTaskApi {
    client: ServiceClient,
    scope: ResumeScope,
    mode: SaveMode,
    request_timeout: Duration,
    status_timeout: Duration,
    http: HttpMetrics,
}

impl HttpTaskApi {
    /// Creates a new HTTP task repository
    ///
    /// # Arguments
    /// * `client` - Client bound to the download service
    /// * `scope` - Space and user the tasks run for
    /// * `mode` - Which save-files route to submit to
    /// * `request_timeout` - Timeout of the submit call
    /// * `status_timeout` - Timeout of each status call
    /// * `http` - Built-in HTTP metrics to record into
    pub fn new(
        client: ServiceClient,
        scope: ResumeScope,
        mode: SaveMode,
        request_timeout: Duration,
        status_timeout: Duration,
        http: HttpMetrics,
    ) -> Self {
        Self {
            client,
            scope,
            mode,
            request_timeout,
            status_timeout,
            http,
        }
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn submit(&self, req: &SaveFilesRequest) -> Result<SubmitAccepted, ClientError> {
        let start = Instant::now();
        let result = self
            .client
            .submit_save_files(&self.scope, self.mode, req, self.request_timeout)
            .await;
        self.http.record_result(&result, start.elapsed());
        result
    }

    async fn status(&self, task_id: &TaskId) -> Result<TaskStatus, ClientError> {
        let start = Instant::now();
        let result = self
            .client
            .task_status(&self.scope, task_id, self.status_timeout)
            .await;
        self.http.record_result(&result, start.elapsed());
        result
    }
}
