//! Service layer
//!
//! Services hold the runner's logic. They drive the services under test
//! through the repository traits and report what they observe through
//! injected sinks, so every one of them can be exercised with fakes.

pub mod classifier;
pub mod events;
pub mod poller;

pub use classifier::{CacheEffect, CacheGrade, CacheProfile, Classification, Cutoff, LatencyClass};
pub use events::{MetricsEventSink, TaskEvent, TaskEventSink};
pub use poller::{PollOutcome, PollPolicy, SubmitError, TaskCompletion, TaskPoller};
