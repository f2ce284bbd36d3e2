//! Auth repository
//!
//! Handles communication with the auth gateway:
//! - Signing up test accounts
//! - Logging in
//! - Calling a protected endpoint with explicit cookies

use async_trait::async_trait;
use tokio::time::Instant;
use volley_client::{ClientError, ServiceClient, TimedResponse};
use volley_core::dto::auth::{LoginRequest, SignupRequest};

use crate::metrics::HttpMetrics;

/// Repository trait for auth gateway operations
///
/// Responses come back raw; their status, headers and latency are what the
/// gateway scenario measures.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn signup(&self, req: &SignupRequest) -> Result<TimedResponse, ClientError>;

    async fn login(&self, req: &LoginRequest) -> Result<TimedResponse, ClientError>;

    /// Fetches the current member using `cookie` as the Cookie header
    async fn member_me(&self, cookie: &str) -> Result<TimedResponse, ClientError>;
}

/// HTTP implementation of AuthApi
pub struct HttpAuthApi {
    client: ServiceClient,
    http: HttpMetrics,
}

impl HttpAuthApi {
    pub fn new(client: ServiceClient, http: HttpMetrics) -> Self {
        Self { client, http }
    }

    fn observe(
        &self,
        result: Result<TimedResponse, ClientError>,
        start: Instant,
    ) -> Result<TimedResponse, ClientError> {
        match &result {
            Ok(response) => self.http.record_response(response),
            Err(e) => self.http.record(e.status(), start.elapsed()),
        }
        result
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn signup(&self, req: &SignupRequest) -> Result<TimedResponse, ClientError> {
        let start = Instant::now();
        let result = self.client.signup(req).await;
        self.observe(result, start)
    }

    async fn login(&self, req: &LoginRequest) -> Result<TimedResponse, ClientError> {
        let start = Instant::now();
        let result = self.client.login(req).await;
        self.observe(result, start)
    }

    async fn member_me(&self, cookie: &str) -> Result<TimedResponse, ClientError> {
        let start = Instant::now();
        let result = self.client.member_me(cookie).await;
        self.observe(result, start)
    }
}
