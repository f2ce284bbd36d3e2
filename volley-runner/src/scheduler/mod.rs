//! Scheduler layer for the runner
//!
//! This layer decides how many virtual users run at any moment and drives
//! their iterations from the start of the ramp schedule until every VU has
//! stopped.

pub mod executor;

pub use executor::{ExecutionStats, Phase, RampingExecutor};
