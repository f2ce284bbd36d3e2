//! Data Transfer Objects for the services under test
//!
//! Request and response bodies as they travel over the wire. Field names
//! follow the services' camelCase JSON.

pub mod auth;
pub mod task;
