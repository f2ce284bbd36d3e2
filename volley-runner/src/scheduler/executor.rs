//! Ramping VU executor
//!
//! A controller re-evaluates the schedule every tick and publishes the VU
//! target over a watch channel. Each VU runs in its own task and only
//! iterates while its index is within the target.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use volley_core::schedule::{format_duration, target_at};

use crate::config::ExecutorConfig;
use crate::metrics::{Counter, MetricsRegistry};
use crate::scenario::Scenario;

/// What the controller tells the VUs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// VUs `1..=target` may iterate
    Running(usize),
    /// The schedule is over
    Stopped,
}

impl Phase {
    /// Whether VU `vu` (1-based) may start an iteration
    pub fn admits(&self, vu: usize) -> bool {
        matches!(self, Phase::Running(target) if vu <= *target)
    }
}

/// Totals of one executor run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionStats {
    pub iterations: u64,
    /// Most VUs alive at once
    pub peak_vus: usize,
    pub elapsed: Duration,
    /// VUs still busy when the graceful stop ran out
    pub aborted: usize,
}

/// Ramping-VUs executor
pub struct RampingExecutor {
    config: ExecutorConfig,
    iterations: Arc<Counter>,
}

impl RampingExecutor {
    /// Creates an executor recording its `iterations` counter into `registry`
    pub fn new(config: ExecutorConfig, registry: &MetricsRegistry) -> Self {
        Self {
            config,
            iterations: registry.counter("iterations"),
        }
    }

    /// Runs `scenario` for the length of the schedule
    ///
    /// Setup and teardown are the caller's business; this only drives VUs.
    pub async fn run<S: Scenario>(&self, scenario: Arc<S>) -> ExecutionStats {
        let config = &self.config;
        info!(
            "Starting ramping executor ({} stage(s), {}, up to {} VUs)",
            config.stages.len(),
            format_duration(config.total_duration()),
            config.peak_vus()
        );

        let start = Instant::now();
        let (phase_tx, phase_rx) = watch::channel(Phase::Running(config.start_vus));
        let mut vus = JoinSet::new();
        let mut spawned = 0;
        let mut last_target = None;

        let mut ticker = time::interval(config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let Some(target) = target_at(config.start_vus, &config.stages, start.elapsed())
            else {
                break;
            };

            if last_target != Some(target) {
                debug!("VU target: {}", target);
                last_target = Some(target);
            }
            phase_tx.send_replace(Phase::Running(target));

            while spawned < target {
                spawned += 1;
                vus.spawn(run_vu(
                    Arc::clone(&scenario),
                    spawned,
                    phase_rx.clone(),
                    Arc::clone(&self.iterations),
                ));
            }
        }

        info!("Schedule finished, waiting for {} VU(s) to stop", vus.len());
        phase_tx.send_replace(Phase::Stopped);

        let drained = time::timeout(config.graceful_stop, async {
            while let Some(result) = vus.join_next().await {
                if let Err(e) = result {
                    warn!("VU task failed: {}", e);
                }
            }
        })
        .await;

        let aborted = if drained.is_err() {
            let remaining = vus.len();
            warn!(
                "{} VU(s) still running after {} graceful stop, aborting",
                remaining,
                format_duration(config.graceful_stop)
            );
            vus.abort_all();
            while vus.join_next().await.is_some() {}
            remaining
        } else {
            0
        };

        let stats = ExecutionStats {
            iterations: self.iterations.get(),
            peak_vus: spawned,
            elapsed: start.elapsed(),
            aborted,
        };
        info!(
            "Executor finished: {} iteration(s), {} VU(s) max",
            stats.iterations, stats.peak_vus
        );
        stats
    }
}

/// Body of one VU task
async fn run_vu<S: Scenario>(
    scenario: Arc<S>,
    vu: usize,
    mut phase: watch::Receiver<Phase>,
    iterations: Arc<Counter>,
) {
    let mut actor = scenario.start_actor(vu).await;

    loop {
        let current = match phase
            .wait_for(|p| *p == Phase::Stopped || p.admits(vu))
            .await
        {
            Ok(p) => *p,
            Err(_) => break,
        };

        if current == Phase::Stopped {
            break;
        }

        scenario.iteration(&mut actor).await;
        iterations.add(1);
    }

    debug!("VU {} stopped", vu);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use volley_core::schedule::Stage;

    /// Scenario whose iterations just sleep
    struct SleepScenario {
        iteration_time: Duration,
        started: Mutex<Vec<usize>>,
    }

    impl SleepScenario {
        fn new(iteration_time: Duration) -> Arc<Self> {
            Arc::new(Self {
                iteration_time,
                started: Mutex::new(Vec::new()),
            })
        }

        fn started(&self) -> Vec<usize> {
            self.started.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Scenario for SleepScenario {
        type Actor = u64;

        fn name(&self) -> String {
            "sleep".to_string()
        }

        async fn setup(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn start_actor(&self, vu: usize) -> u64 {
            self.started.lock().unwrap().push(vu);
            0
        }

        async fn iteration(&self, actor: &mut u64) {
            time::sleep(self.iteration_time).await;
            *actor += 1;
        }
    }

    fn executor(stages: Vec<Stage>) -> RampingExecutor {
        RampingExecutor::new(ExecutorConfig::new(stages), &MetricsRegistry::new())
    }

    #[test]
    fn test_phase_admits() {
        assert!(Phase::Running(2).admits(1));
        assert!(Phase::Running(2).admits(2));
        assert!(!Phase::Running(2).admits(3));
        assert!(!Phase::Stopped.admits(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_vu_iterates_for_schedule() {
        let scenario = SleepScenario::new(Duration::from_millis(500));
        let stats = executor(vec![
            Stage::new(Duration::ZERO, 1),
            Stage::new(Duration::from_secs(2), 1),
        ])
        .run(Arc::clone(&scenario))
        .await;

        assert_eq!(stats.peak_vus, 1);
        assert_eq!(stats.aborted, 0);
        assert!(
            (4..=5).contains(&stats.iterations),
            "iterations: {}",
            stats.iterations
        );
        assert_eq!(scenario.started(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vus_spawn_once_and_are_reused() {
        let scenario = SleepScenario::new(Duration::from_millis(50));
        let stats = executor(vec![
            Stage::new(Duration::from_secs(1), 2),
            Stage::new(Duration::from_secs(1), 0),
            Stage::new(Duration::from_secs(1), 2),
        ])
        .run(Arc::clone(&scenario))
        .await;

        assert_eq!(stats.peak_vus, 2);
        assert_eq!(scenario.started(), vec![1, 2]);
        assert!(stats.iterations > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_iterations_are_aborted_after_graceful_stop() {
        let scenario = SleepScenario::new(Duration::from_secs(120));
        let mut config = ExecutorConfig::new(vec![
            Stage::new(Duration::ZERO, 3),
            Stage::new(Duration::from_secs(1), 3),
        ]);
        config.graceful_stop = Duration::from_secs(2);

        let stats = RampingExecutor::new(config, &MetricsRegistry::new())
            .run(Arc::clone(&scenario))
            .await;

        assert_eq!(stats.peak_vus, 3);
        assert_eq!(stats.aborted, 3);
        assert_eq!(stats.iterations, 0);
        assert!(stats.elapsed < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_iterations_counter_is_registered() {
        let registry = MetricsRegistry::new();
        let scenario = SleepScenario::new(Duration::from_millis(100));
        let stats = RampingExecutor::new(
            ExecutorConfig::new(vec![
                Stage::new(Duration::ZERO, 2),
                Stage::new(Duration::from_secs(1), 2),
            ]),
            &registry,
        )
        .run(scenario)
        .await;

        assert_eq!(registry.counter("iterations").get(), stats.iterations);
    }
}
