//! Repository layer
//!
//! Repositories are thin adapters over the HTTP client that the service
//! layer talks to. They record built-in HTTP metrics but carry no business
//! logic.
//!
//! All repositories are trait-based to enable testing and mocking.

mod auth;
mod contests;
mod tasks;

// Re-export traits
pub use auth::AuthApi;
pub use contests::ContestApi;
pub use tasks::TaskApi;

// Re-export implementations
pub use auth::HttpAuthApi;
pub use contests::HttpContestApi;
pub use tasks::HttpTaskApi;
