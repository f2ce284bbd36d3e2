//! Built-in HTTP metrics recorded around every request

use std::sync::Arc;
use std::time::Duration;
use volley_client::{ClientError, TimedResponse};

use super::{Counter, MetricsRegistry, Rate, Trend};

/// Handles to `http_reqs`, `http_req_duration` and `http_req_failed`
///
/// A request counts as failed when no response arrived or its status is
/// 400 or above.
#[derive(Debug, Clone)]
pub struct HttpMetrics {
    reqs: Arc<Counter>,
    duration: Arc<Trend>,
    failed: Arc<Rate>,
}

impl HttpMetrics {
    pub fn new(registry: &MetricsRegistry) -> Self {
        Self {
            reqs: registry.counter("http_reqs"),
            duration: registry.trend("http_req_duration"),
            failed: registry.rate("http_req_failed"),
        }
    }

    /// Records one request; `status` is `None` when no response arrived
    pub fn record(&self, status: Option<u16>, elapsed: Duration) {
        self.reqs.add(1);
        self.failed.add(status.is_none_or(|s| s >= 400));
        if status.is_some() {
            self.duration.add_duration(elapsed);
        }
    }

    pub fn record_response(&self, response: &TimedResponse) {
        self.record(Some(response.status), response.elapsed);
    }

    /// Records the outcome of a typed call
    ///
    /// Typed calls only fail with a status for non-accepted answers, so an
    /// `Ok` is taken as a 2xx.
    pub fn record_result<T>(&self, result: &Result<T, ClientError>, elapsed: Duration) {
        match result {
            Ok(_) => self.record(Some(200), elapsed),
            Err(e) => self.record(e.status(), elapsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_requests() {
        let registry = MetricsRegistry::new();
        let http = HttpMetrics::new(&registry);

        http.record(Some(200), Duration::from_millis(10));
        http.record(Some(404), Duration::from_millis(5));
        http.record(None, Duration::from_secs(30));

        assert_eq!(registry.counter("http_reqs").get(), 3);
        assert_eq!(registry.rate("http_req_failed").hits(), 2);
        // Transport failures have no response time
        assert_eq!(registry.trend("http_req_duration").count(), 2);
    }

    #[test]
    fn test_record_result() {
        let registry = MetricsRegistry::new();
        let http = HttpMetrics::new(&registry);

        let ok: Result<(), ClientError> = Ok(());
        http.record_result(&ok, Duration::from_millis(3));
        let gone: Result<(), ClientError> = Err(ClientError::NotFound("task".into()));
        http.record_result(&gone, Duration::from_millis(3));

        assert_eq!(registry.rate("http_req_failed").rate(), Some(0.5));
    }
}
