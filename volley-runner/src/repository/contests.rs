//! Contest repository

use async_trait::async_trait;
use tokio::time::Instant;
use volley_client::{ClientError, ServiceClient, TimedResponse};

use crate::metrics::HttpMetrics;

/// Repository trait for the contest-listing API
#[async_trait]
pub trait ContestApi: Send + Sync {
    /// Lists the contests of a space
    async fn list_contests(&self, space_id: &str) -> Result<TimedResponse, ClientError>;
}

/// HTTP implementation of ContestApi
pub struct HttpContestApi {
    client: ServiceClient,
    http: HttpMetrics,
}

impl HttpContestApi {
    pub fn new(client: ServiceClient, http: HttpMetrics) -> Self {
        Self { client, http }
    }
}

#[async_trait]
impl ContestApi for HttpContestApi {
    async fn list_contests(&self, space_id: &str) -> Result<TimedResponse, ClientError> {
        let start = Instant::now();
        let result = self.client.list_contests(space_id).await;
        match &result {
            Ok(response) => self.http.record_response(response),
            Err(e) => self.http.record(e.status(), start.elapsed()),
        }
        result
    }
}
