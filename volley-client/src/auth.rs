//! Auth gateway endpoints

use reqwest::header::COOKIE;
use volley_core::dto::auth::{LoginRequest, SignupRequest};

use crate::error::Result;
use crate::{ServiceClient, TimedResponse};

impl ServiceClient {
    /// Register a new account
    ///
    /// The gateway answers 201 with `{ username, id }` on success.
    pub async fn signup(&self, req: &SignupRequest) -> Result<TimedResponse> {
        let url = self.url("/api/v1/auth/signup");
        self.send_timed(self.client.post(&url).json(req)).await
    }

    /// Log in with username and password
    ///
    /// Tokens arrive in the JSON body, in `Set-Cookie` headers, or both.
    pub async fn login(&self, req: &LoginRequest) -> Result<TimedResponse> {
        let url = self.url("/api/v1/auth/login");
        self.send_timed(self.client.post(&url).json(req)).await
    }

    /// Fetch the current member with an explicit cookie header
    ///
    /// Used to force the gateway down its refresh-token path by pairing a
    /// stale access token with a valid refresh token.
    pub async fn member_me(&self, cookie: &str) -> Result<TimedResponse> {
        let url = self.url("/api/v1/members/me");
        self.send_timed(self.client.get(&url).header(COOKIE, cookie))
            .await
    }
}
