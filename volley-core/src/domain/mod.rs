//! Core domain types
//!
//! This module contains the entities the load tests reason about. They are
//! shared between the HTTP client (which decodes them) and the runner
//! (which drives scenarios with them).

pub mod account;
pub mod task;
