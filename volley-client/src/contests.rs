//! Contest listing endpoints

use reqwest::header::{ACCEPT, CONTENT_TYPE};

use crate::error::Result;
use crate::{ServiceClient, TimedResponse};

impl ServiceClient {
    /// Path of the contest list for a space
    pub fn contests_path(space_id: &str) -> String {
        format!("/api/v1/tech-interview/{}/contests", space_id)
    }

    /// List contests of a space
    ///
    /// The raw response is returned so callers can check status, content
    /// type and body shape independently.
    pub async fn list_contests(&self, space_id: &str) -> Result<TimedResponse> {
        let url = self.url(&Self::contests_path(space_id));
        self.send_timed(
            self.client
                .get(&url)
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, "application/json"),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contests_path() {
        assert_eq!(
            ServiceClient::contests_path("3"),
            "/api/v1/tech-interview/3/contests"
        );
    }
}
