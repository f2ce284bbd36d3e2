//! Volley Core
//!
//! Core types and abstractions shared by the Volley load-testing workspace.
//!
//! This crate contains:
//! - Domain types: Tasks, sessions and accounts of the services under test
//! - DTOs: Request and response bodies exchanged with those services
//! - Schedule: Ramping virtual-user stages and duration parsing
//! - Threshold: Pass/fail expressions evaluated over aggregated metrics

pub mod domain;
pub mod dto;
pub mod schedule;
pub mod threshold;
