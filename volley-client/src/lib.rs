//! Volley HTTP Client
//!
//! A small, type-safe HTTP client for the services Volley puts under load:
//! the resume-file download service, the auth gateway and the contest API.
//!
//! Calls that drive the async task protocol decode typed bodies and turn
//! unexpected statuses into [`ClientError`]s. Calls whose raw status, headers
//! and latency are themselves the thing being measured return a
//! [`TimedResponse`] instead.
//!
//! # Example
//!
//! ```no_run
//! use volley_client::ServiceClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), volley_client::ClientError> {
//!     let client = ServiceClient::new("http://localhost:9040");
//!
//!     let listing = client.list_contests("1").await?;
//!     println!("contests answered {} in {:?}", listing.status, listing.elapsed);
//!     Ok(())
//! }
//! ```

pub mod error;
mod auth;
mod contests;
mod tasks;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use tasks::ResumeScope;

use reqwest::header::{CONTENT_TYPE, HeaderMap, SET_COOKIE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// HTTP client bound to the base URL of one service under test
#[derive(Debug, Clone)]
pub struct ServiceClient {
    /// Base URL of the service (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

/// A response captured together with how long it took
#[derive(Debug, Clone)]
pub struct TimedResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
    /// Time from sending the request until the body was read
    pub elapsed: Duration,
}

impl TimedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Value of a header, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All `Set-Cookie` header values
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    /// Whether the response declares a JSON content type
    pub fn is_json(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"))
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            ClientError::parse_error(self.status, format!("Failed to parse JSON response: {}", e))
        })
    }
}

impl ServiceClient {
    /// Create a new client for a service
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the service (e.g., "http://localhost:8080")
    ///
    /// # Example
    /// ```
    /// use volley_client::ServiceClient;
    ///
    /// let client = ServiceClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure default timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use volley_client::ServiceClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = ServiceClient::with_client("http://localhost:8080", http_client);
    /// ```
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query the service's actuator health endpoint
    pub async fn health(&self, timeout: Duration) -> Result<TimedResponse> {
        let url = format!("{}/actuator/health", self.base_url);
        self.send_timed(self.client.get(&url).timeout(timeout)).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Send a request and capture status, headers, body and latency
    ///
    /// Any status is returned as-is; only transport failures are errors.
    async fn send_timed(&self, request: RequestBuilder) -> Result<TimedResponse> {
        let start = Instant::now();
        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;
        let elapsed = start.elapsed();

        debug!("Response {} in {:?}", status, elapsed);

        Ok(TimedResponse {
            status,
            headers,
            body,
            elapsed,
        })
    }

    /// Require an exact status code and deserialize the JSON body
    ///
    /// Unlike a plain success check, this rejects e.g. 200 where 202 is the
    /// only acceptable answer.
    async fn expect_status<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        expected: StatusCode,
    ) -> Result<T> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            let url = response.url().path().to_string();
            return Err(ClientError::NotFound(url));
        }

        if status != expected {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ClientError::parse_error(
                status.as_u16(),
                format!("Failed to parse JSON response: {}", e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn response_with(headers: HeaderMap, body: &str) -> TimedResponse {
        TimedResponse {
            status: 200,
            headers,
            body: body.to_string(),
            elapsed: Duration::from_millis(12),
        }
    }

    #[test]
    fn test_client_creation() {
        let client = ServiceClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ServiceClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/actuator/health"), "http://localhost:8080/actuator/health");
    }

    #[test]
    fn test_timed_response_cookies_and_json() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("accessToken=a; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("refreshToken=r; HttpOnly"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json;charset=UTF-8"),
        );

        let response = response_with(headers, "[1, 2]");
        assert_eq!(response.set_cookies().len(), 2);
        assert!(response.is_json());
        assert!(response.is_success());
        assert_eq!(response.json::<Vec<u32>>().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_timed_response_bad_json() {
        let response = response_with(HeaderMap::new(), "<html>");
        assert!(!response.is_json());
        assert!(matches!(
            response.json::<serde_json::Value>(),
            Err(ClientError::ParseError { status: 200, .. })
        ));
    }
}
