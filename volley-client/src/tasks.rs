//! Resume download service endpoints (save-files task protocol)

use reqwest::StatusCode;
use std::time::Duration;
use volley_core::domain::task::{SaveMode, TaskId, TaskStatus};
use volley_core::dto::task::{SaveFilesRequest, SubmitAccepted};

use crate::ServiceClient;
use crate::error::Result;

/// Path segment under which the download service exposes its load-test routes
const LOAD_TEST_ROUTE: &str = "k6";

/// Space and user a download runs on behalf of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeScope {
    pub space_id: String,
    pub user_id: String,
}

impl ResumeScope {
    pub fn submit_path(&self, mode: SaveMode) -> String {
        format!(
            "/api/v1/resume/{}/{}/users/{}/save-files/{}",
            self.space_id, LOAD_TEST_ROUTE, self.user_id, mode
        )
    }

    pub fn status_path(&self, task_id: &TaskId) -> String {
        format!(
            "/api/v1/resume/{}/{}/tasks/{}",
            self.space_id, LOAD_TEST_ROUTE, task_id
        )
    }
}

impl ServiceClient {
    // =============================================================================
    // Save-files Task Lifecycle
    // =============================================================================

    /// Start an asynchronous save-files task
    ///
    /// Only `202 Accepted` is a valid answer; anything else is an
    /// [`ApiError`](crate::ClientError::ApiError). The returned body may still
    /// lack a task id, which callers must treat as a failed submission.
    pub async fn submit_save_files(
        &self,
        scope: &ResumeScope,
        mode: SaveMode,
        req: &SaveFilesRequest,
        timeout: Duration,
    ) -> Result<SubmitAccepted> {
        let url = self.url(&scope.submit_path(mode));
        let response = self
            .client
            .post(&url)
            .json(req)
            .timeout(timeout)
            .send()
            .await?;

        self.expect_status(response, StatusCode::ACCEPTED).await
    }

    /// Get the current state of a task
    ///
    /// A 404 becomes [`NotFound`](crate::ClientError::NotFound): the service
    /// has forgotten the task.
    pub async fn task_status(
        &self,
        scope: &ResumeScope,
        task_id: &TaskId,
        timeout: Duration,
    ) -> Result<TaskStatus> {
        let url = self.url(&scope.status_path(task_id));
        let response = self.client.get(&url).timeout(timeout).send().await?;

        self.expect_status(response, StatusCode::OK).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Answers each incoming connection with the next canned response
    async fn serve(responses: Vec<(u16, &'static str)>) -> ServiceClient {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                let reply = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        ServiceClient::new(format!("http://{}", addr))
    }

    /// Consumes the request head and body
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    fn scope() -> ResumeScope {
        ResumeScope {
            space_id: "1".to_string(),
            user_id: "1".to_string(),
        }
    }

    fn request() -> SaveFilesRequest {
        SaveFilesRequest {
            repository: "r".to_string(),
            file_paths: vec!["a.txt".to_string()],
            branch: "main".to_string(),
        }
    }

    #[tokio::test]
    async fn test_submit_accepted() {
        let client = serve(vec![(202, r#"{"taskId":"T1"}"#)]).await;

        let accepted = client
            .submit_save_files(&scope(), SaveMode::Async, &request(), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(accepted.task_id, Some(TaskId::from("T1")));
    }

    #[tokio::test]
    async fn test_submit_rejects_plain_ok() {
        let client = serve(vec![(200, r#"{"taskId":"T1"}"#)]).await;

        let err = client
            .submit_save_files(&scope(), SaveMode::Async, &request(), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ApiError { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_submit_with_unreadable_body_keeps_status() {
        let client = serve(vec![(202, "accepted")]).await;

        let err = client
            .submit_save_files(&scope(), SaveMode::Zip, &request(), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ParseError { status: 202, .. }));
        assert_eq!(err.status(), Some(202));
    }

    #[tokio::test]
    async fn test_task_status_ok_and_gone() {
        let client = serve(vec![
            (200, r#"{"taskId":"T1","completed":false,"progress":50}"#),
            (404, r#"{"message":"no such task"}"#),
            (200, "<html>"),
        ])
        .await;
        let id = TaskId::from("T1");

        let status = client.task_status(&scope(), &id, TIMEOUT).await.unwrap();
        assert!(status.is_for(&id));
        assert_eq!(status.progress, 50.0);

        let gone = client.task_status(&scope(), &id, TIMEOUT).await.unwrap_err();
        assert!(gone.is_not_found());

        let malformed = client.task_status(&scope(), &id, TIMEOUT).await.unwrap_err();
        assert_eq!(malformed.status(), Some(200));
        assert!(!malformed.is_not_found());
    }

    #[test]
    fn test_paths() {
        let scope = ResumeScope {
            space_id: "1".to_string(),
            user_id: "7".to_string(),
        };
        assert_eq!(
            scope.submit_path(SaveMode::Zip),
            "/api/v1/resume/1/k6/users/7/save-files/zip"
        );
        assert_eq!(
            scope.status_path(&TaskId::from("T1")),
            "/api/v1/resume/1/k6/tasks/T1"
        );
    }
}
