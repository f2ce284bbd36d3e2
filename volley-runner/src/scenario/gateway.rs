//! Auth gateway refresh-token scenario
//!
//! Setup signs up a pool of accounts. Each VU logs in once with its own
//! account, then keeps hitting a protected endpoint with an expired access
//! token so the gateway has to go through its refresh-token path. Latencies
//! are classified with the variant's [`CacheProfile`].

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};
use volley_client::{ClientError, ServiceClient, TimedResponse};
use volley_core::domain::account::{Account, Session, extract_cookie_value};
use volley_core::dto::auth::{LoginRequest, LoginResponse, SignupRequest, SignupResponse};

use crate::config::GatewayConfig;
use crate::metrics::{Counter, HttpMetrics, MetricsRegistry, Rate, Trend};
use crate::repository::{AuthApi, HttpAuthApi};
use crate::scenario::Scenario;
use crate::service::{CacheGrade, CacheProfile, Classification};

/// Calls made with the same refresh token per iteration
const REPEAT_CALLS: usize = 3;

/// Per-VU state
#[derive(Debug)]
pub struct GatewayVu {
    vu: usize,
    session: Option<Session>,
}

pub struct GatewayScenario {
    config: GatewayConfig,
    profile: CacheProfile,
    api: Arc<dyn AuthApi>,
    registry: Arc<MetricsRegistry>,
    accounts: OnceLock<Vec<Account>>,
    auth_calls: Arc<Counter>,
    hit_rate: Arc<Rate>,
    refresh_latency: Arc<Trend>,
    login_calls: Arc<Counter>,
}

impl GatewayScenario {
    /// Creates the scenario against the configured gateway
    pub fn new(config: GatewayConfig, registry: Arc<MetricsRegistry>) -> Self {
        let client = ServiceClient::new(config.base_url.clone());
        let api = HttpAuthApi::new(client, HttpMetrics::new(&registry));
        Self::with_api(config, Arc::new(api), registry)
    }

    /// Creates the scenario on top of an existing auth repository
    pub fn with_api(
        config: GatewayConfig,
        api: Arc<dyn AuthApi>,
        registry: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            profile: config.variant.cache_profile(),
            auth_calls: registry.counter("auth_service_calls"),
            hit_rate: registry.rate("redis_hit_rate"),
            refresh_latency: registry.trend("refresh_token_latency"),
            login_calls: registry.counter("login_calls"),
            accounts: OnceLock::new(),
            config,
            api,
            registry,
        }
    }

    /// Accounts created during setup; empty before setup has run
    pub fn accounts(&self) -> &[Account] {
        self.accounts.get().map(Vec::as_slice).unwrap_or_default()
    }

    fn username(&self, index: usize) -> String {
        format!("{}{}", self.config.variant, index)
    }

    /// Signs up one account, returning it when every signup check passed
    async fn signup(&self, username: &str) -> Option<Account> {
        debug!("Signing up {}", username);
        let req = SignupRequest::for_test_user(username, &self.config.password);

        let response = match self.api.signup(&req).await {
            Ok(response) => response,
            Err(e) => {
                self.registry.check("signup succeeded", false);
                self.registry.check("signup under 3s", false);
                warn!("Signup failed for {}: {}", username, e);
                return None;
            }
        };

        let created = self.registry.check("signup succeeded", response.status == 201);
        let fast = self.registry.check(
            "signup under 3s",
            response.elapsed < self.config.auth_latency_limit,
        );
        if !(created && fast) {
            warn!(
                "Signup failed for {} - Status: {}, Body: {}",
                username, response.status, response.body
            );
            return None;
        }

        match response.json::<SignupResponse>() {
            Ok(body) => Some(Account {
                username: body.username,
                password: self.config.password.clone(),
            }),
            Err(e) => {
                warn!("Signup response for {} unreadable: {}", username, e);
                None
            }
        }
    }

    /// Logs `vu` in with its round-robin account
    async fn login(&self, vu: usize) -> Option<Session> {
        let accounts = self.accounts();
        if accounts.is_empty() {
            warn!("VU {}: no accounts available", vu);
            return None;
        }
        let account = &accounts[vu.saturating_sub(1) % accounts.len()];
        info!("VU {}: logging in as {}", vu, account.username);

        let req = LoginRequest {
            username: account.username.clone(),
            password: account.password.clone(),
        };
        let result = self.api.login(&req).await;
        self.login_calls.add(1);

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.registry.check("login succeeded", false);
                self.registry.check("login under 3s", false);
                warn!("VU {}: login failed: {}", vu, e);
                return None;
            }
        };

        let ok = self.registry.check("login succeeded", response.status == 200);
        let fast = self.registry.check(
            "login under 3s",
            response.elapsed < self.config.auth_latency_limit,
        );
        if !(ok && fast) {
            warn!(
                "VU {}: login failed - Status: {}, Body: {}",
                vu, response.status, response.body
            );
            return None;
        }

        let session = session_from_login(&account.username, &response);
        match &session {
            Some(_) => info!("VU {}: logged in as {}", vu, account.username),
            None => warn!("VU {}: no tokens in login response: {}", vu, response.body),
        }
        session
    }

    /// Calls the protected endpoint and measures the round trip
    async fn timed_member_me(&self, cookie: &str) -> (Result<TimedResponse, ClientError>, Duration) {
        let start = Instant::now();
        let result = self.api.member_me(cookie).await;
        let latency = start.elapsed();
        self.refresh_latency.add_duration(latency);
        (result, latency)
    }

    fn apply(&self, classification: Classification) {
        if classification.auth_call {
            self.auth_calls.add(1);
        }
        if let Some(hit) = classification.cache_hit {
            self.hit_rate.add(hit);
        }
    }

    /// Expired access token with a valid refresh token
    async fn expired_token_call(&self, vu: usize, session: &Session) {
        let cookie = format!(
            "accessToken=expired_token_{}; refreshToken={}",
            Utc::now().timestamp_millis(),
            session.refresh_token
        );
        let (result, latency) = self.timed_member_me(&cookie).await;

        let completed = result
            .as_ref()
            .is_ok_and(|r| (200..500).contains(&r.status));
        let processed = result.as_ref().is_ok_and(refresh_processed);
        let passed = self.registry.check("response completed", completed)
            & self.registry.check("refresh token processed", processed);

        let classification = self.profile.classify(latency);
        self.apply(classification);

        if passed {
            info!(
                "VU {} ({}): expired token handled in {}ms - {}",
                vu,
                session.username,
                latency.as_millis(),
                classification.class
            );
        } else {
            let status = result
                .as_ref()
                .map_or_else(|e| e.to_string(), |r| r.status.to_string());
            warn!(
                "VU {} ({}): expired token call failed after {}ms, Status: {}",
                vu,
                session.username,
                latency.as_millis(),
                status
            );
        }
    }

    /// Same refresh token several times in a row
    async fn repeat_token_calls(&self, vu: usize, session: &Session) {
        let mut latencies = [Duration::ZERO; REPEAT_CALLS];

        for (i, slot) in latencies.iter_mut().enumerate() {
            let cookie = format!(
                "accessToken=expired_token_{}_{}; refreshToken={}",
                Utc::now().timestamp_millis(),
                i,
                session.refresh_token
            );
            let (_, latency) = self.timed_member_me(&cookie).await;
            *slot = latency;
            self.apply(self.profile.classify_repeat(i, latency));

            time::sleep(self.config.repeat_gap).await;
        }

        let effect = self.profile.cache_effect(latencies);
        let millis: Vec<String> = latencies
            .iter()
            .map(|l| format!("{}ms", l.as_millis()))
            .collect();
        let verdict = match effect.grade {
            Some(CacheGrade::Strong) => "strong cache effect",
            Some(CacheGrade::Moderate) => "moderate cache effect",
            Some(CacheGrade::Negligible) => "negligible cache effect",
            None => "repeat call effect",
        };
        info!(
            "VU {} ({}) repeated calls: {} - {} (2nd: {:.1}%, 3rd: {:.1}%)",
            vu,
            session.username,
            millis.join(", "),
            verdict,
            effect.second_improvement_pct,
            effect.third_improvement_pct
        );
    }
}

/// Whether the gateway re-issued tokens or answered 200
fn refresh_processed(response: &TimedResponse) -> bool {
    let reissued = response
        .set_cookies()
        .iter()
        .any(|c| c.contains("accessToken") || c.contains("refreshToken"));
    reissued || response.status == 200
}

/// Reads tokens from the login body, falling back to `Set-Cookie` headers
fn session_from_login(username: &str, response: &TimedResponse) -> Option<Session> {
    if let Ok(LoginResponse {
        access_token: Some(access_token),
        refresh_token: Some(refresh_token),
    }) = response.json::<LoginResponse>()
    {
        return Some(Session {
            username: username.to_string(),
            access_token,
            refresh_token,
        });
    }

    let mut access_token = None;
    let mut refresh_token = None;
    for cookie in response.set_cookies() {
        if cookie.contains("accessToken=") {
            access_token = extract_cookie_value(&cookie, "accessToken");
        } else if cookie.contains("refreshToken=") {
            refresh_token = extract_cookie_value(&cookie, "refreshToken");
        }
    }

    Some(Session {
        username: username.to_string(),
        access_token: access_token?,
        refresh_token: refresh_token?,
    })
}

#[async_trait]
impl Scenario for GatewayScenario {
    type Actor = GatewayVu;

    fn name(&self) -> String {
        format!("Gateway Refresh Token Test ({})", self.config.variant)
    }

    async fn setup(&self) -> anyhow::Result<()> {
        let variant = self.config.variant;
        info!("=== Starting gateway refresh-token test ===");
        info!("Test type: {} ({})", variant, variant.description());
        info!("Target URL: {}", self.config.base_url);
        info!(
            "Expected latency: {}ms",
            variant.expected_latency().as_millis()
        );
        info!("Creating {} test account(s)...", self.config.accounts);

        let mut created = Vec::with_capacity(self.config.accounts);
        for i in 1..=self.config.accounts {
            let username = self.username(i);
            if let Some(account) = self.signup(&username).await {
                debug!("Account created: {}", account.username);
                created.push(account);
            }
        }

        info!("Created {} test account(s)", created.len());
        if created.is_empty() {
            anyhow::bail!("No test accounts could be created, aborting");
        }

        if self.accounts.set(created).is_err() {
            anyhow::bail!("Gateway setup ran twice");
        }
        Ok(())
    }

    async fn start_actor(&self, vu: usize) -> GatewayVu {
        GatewayVu { vu, session: None }
    }

    async fn iteration(&self, actor: &mut GatewayVu) {
        if actor.session.is_none() {
            actor.session = self.login(actor.vu).await;
        }
        let Some(session) = actor.session.as_ref() else {
            return;
        };

        self.expired_token_call(actor.vu, session).await;
        self.repeat_token_calls(actor.vu, session).await;

        time::sleep(self.config.think_time).await;
    }

    async fn teardown(&self) {
        info!("=== Gateway refresh-token test complete ===");
        info!("Test accounts used: {}", self.accounts().len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayVariant;
    use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn response(status: u16, body: &str, cookies: &[&str]) -> TimedResponse {
        let mut headers = HeaderMap::new();
        for cookie in cookies {
            headers.append(SET_COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        TimedResponse {
            status,
            headers,
            body: body.to_string(),
            elapsed: Duration::from_millis(20),
        }
    }

    /// Gateway answering from fixed rules
    ///
    /// Signups of usernames ending in an even digit fail. Refresh calls
    /// take `refresh_latency` of (paused) time.
    struct FakeGateway {
        refresh_latency: Duration,
        login_body: String,
        login_cookies: Vec<String>,
        cookies_seen: Mutex<Vec<String>>,
        logins: AtomicUsize,
    }

    impl FakeGateway {
        fn new(refresh_latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                refresh_latency,
                login_body: r#"{"accessToken":"at","refreshToken":"rt"}"#.to_string(),
                login_cookies: Vec::new(),
                cookies_seen: Mutex::new(Vec::new()),
                logins: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AuthApi for FakeGateway {
        async fn signup(&self, req: &SignupRequest) -> Result<TimedResponse, ClientError> {
            let even = req
                .username
                .chars()
                .last()
                .and_then(|c| c.to_digit(10))
                .is_some_and(|d| d % 2 == 0);
            if even {
                return Ok(response(409, "taken", &[]));
            }
            let body = format!(r#"{{"username":"{}","id":1}}"#, req.username);
            Ok(response(201, &body, &[]))
        }

        async fn login(&self, _req: &LoginRequest) -> Result<TimedResponse, ClientError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            let cookies: Vec<&str> = self.login_cookies.iter().map(String::as_str).collect();
            Ok(response(200, &self.login_body, &cookies))
        }

        async fn member_me(&self, cookie: &str) -> Result<TimedResponse, ClientError> {
            self.cookies_seen.lock().unwrap().push(cookie.to_string());
            time::sleep(self.refresh_latency).await;
            Ok(response(200, "{}", &["accessToken=new; Path=/"]))
        }
    }

    fn gateway(
        variant: GatewayVariant,
        accounts: usize,
        api: Arc<FakeGateway>,
    ) -> (GatewayScenario, Arc<MetricsRegistry>) {
        let registry = Arc::new(MetricsRegistry::new());
        let config = GatewayConfig {
            variant,
            accounts,
            ..GatewayConfig::default()
        };
        (
            GatewayScenario::with_api(config, api, Arc::clone(&registry)),
            registry,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_keeps_successful_signups() {
        let (scenario, registry) = gateway(GatewayVariant::Redis, 4, FakeGateway::new(Duration::ZERO));

        scenario.setup().await.unwrap();

        let names: Vec<&str> = scenario
            .accounts()
            .iter()
            .map(|a| a.username.as_str())
            .collect();
        assert_eq!(names, vec!["redis1", "redis3"]);
        assert!(scenario.accounts().iter().all(|a| a.password == "1234"));

        let tallies = registry.checks().tallies();
        let signup = tallies
            .iter()
            .find(|(name, _)| name == "signup succeeded")
            .map(|(_, t)| *t)
            .unwrap();
        assert_eq!((signup.passes, signup.fails), (2, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_without_accounts_fails() {
        // No signup is attempted at all
        let api = FakeGateway::new(Duration::ZERO);
        let registry = Arc::new(MetricsRegistry::new());
        let config = GatewayConfig {
            variant: GatewayVariant::Simple,
            accounts: 0,
            ..GatewayConfig::default()
        };
        let scenario = GatewayScenario::with_api(config, api, registry);
        assert!(scenario.setup().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_iteration_logs_in_once_and_classifies() {
        let api = FakeGateway::new(Duration::from_millis(50));
        let (scenario, registry) = gateway(GatewayVariant::Redis, 1, Arc::clone(&api));
        scenario.setup().await.unwrap();

        let mut vu = scenario.start_actor(3).await;
        scenario.iteration(&mut vu).await;
        scenario.iteration(&mut vu).await;

        assert_eq!(api.logins.load(Ordering::SeqCst), 1);
        assert_eq!(registry.counter("login_calls").get(), 1);
        assert_eq!(
            vu.session.as_ref().map(|s| s.refresh_token.as_str()),
            Some("rt")
        );

        // 1 expired-token call + 3 repeats, per iteration
        assert_eq!(registry.trend("refresh_token_latency").count(), 8);

        // 50ms is a hit everywhere except the first repeat call
        let hits = registry.rate("redis_hit_rate");
        assert_eq!(hits.total(), 8);
        assert_eq!(hits.hits(), 6);
        assert_eq!(registry.counter("auth_service_calls").get(), 2);

        let cookies = api.cookies_seen.lock().unwrap().clone();
        assert!(cookies[0].starts_with("accessToken=expired_token_"));
        assert!(cookies[0].ends_with("; refreshToken=rt"));
        assert!(cookies[1].contains("_0; refreshToken=rt"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simple_variant_counts_every_call() {
        let api = FakeGateway::new(Duration::from_millis(10));
        let (scenario, registry) = gateway(GatewayVariant::Simple, 1, api);
        scenario.setup().await.unwrap();

        let mut vu = scenario.start_actor(1).await;
        scenario.iteration(&mut vu).await;

        assert_eq!(registry.counter("auth_service_calls").get(), 4);
        assert_eq!(registry.rate("redis_hit_rate").total(), 0);
    }

    #[test]
    fn test_session_from_cookies() {
        let login = response(
            200,
            "ok",
            &["accessToken=a1; Path=/; HttpOnly", "refreshToken=r1; Path=/"],
        );
        let session = session_from_login("u", &login).unwrap();
        assert_eq!(session.access_token, "a1");
        assert_eq!(session.refresh_token, "r1");

        let partial = response(200, r#"{"accessToken":"a"}"#, &[]);
        assert!(session_from_login("u", &partial).is_none());
    }

    #[test]
    fn test_refresh_processed() {
        assert!(refresh_processed(&response(200, "", &[])));
        assert!(refresh_processed(&response(401, "", &["refreshToken=x"])));
        assert!(!refresh_processed(&response(401, "", &["JSESSIONID=x"])));
    }
}
