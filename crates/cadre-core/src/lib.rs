//! Core library for the cadre orchestration engine — foundational types,
//! the datastore client, policy caching, configuration, and logging setup.
//!
//! This crate is the bottom of the workspace. It provides:
//! - The relational data model (§3 of the design doc): teams, agents, the
//!   name pool, personas, proposals, missions, steps, approvals, memory,
//!   events, model usage, health checks, and policy rows.
//! - A SQLite-backed datastore client (`store`) that every other crate
//!   goes through for persistence — no in-process queues, no shared locks.
//! - A short-TTL policy cache (`policy`).
//! - TOML + environment configuration (`config`).
//! - Logging initialization (`logging`).

pub mod config;
pub mod error;
pub mod logging;
pub mod policy;
pub mod store;
pub mod types;

pub use error::CoreError;
