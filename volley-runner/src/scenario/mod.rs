//! Load-test scenarios
//!
//! A scenario is what every virtual user does over and over. The executor
//! owns the VUs; the scenario only owns their per-VU state (the actor).

mod contest;
mod download;
mod gateway;

pub use contest::{ContestReport, ContestScenario, Grade};
pub use download::DownloadScenario;
pub use gateway::GatewayScenario;

use async_trait::async_trait;

/// Behaviour shared by every load test
#[async_trait]
pub trait Scenario: Send + Sync + 'static {
    /// Per-VU state, created once and kept for the whole run
    type Actor: Send + 'static;

    /// Scenario name used in banners and summaries
    fn name(&self) -> String;

    /// Runs once before any VU starts
    ///
    /// An error aborts the run before load is generated.
    async fn setup(&self) -> anyhow::Result<()>;

    /// Creates the state of VU `vu` (1-based)
    async fn start_actor(&self, vu: usize) -> Self::Actor;

    /// One iteration for one VU
    ///
    /// Failures are recorded as metrics, never returned; the next
    /// iteration starts regardless.
    async fn iteration(&self, actor: &mut Self::Actor);

    /// Runs once after every VU has stopped
    async fn teardown(&self) {}
}
