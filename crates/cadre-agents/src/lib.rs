//! Agent-facing orchestration: the mission engine (§4.1), the agent
//! registry and hiring pipeline (§4.2), role/category routing tables
//! (§9), and the review/approval chain (§4.9).
//!
//! This crate holds no persistent state of its own — everything flows
//! through `cadre_core::store::Store`, the same way `at-agents` sits on
//! top of `at-core` in the teacher repo.

pub mod mission;
pub mod registry;
pub mod review;
pub mod roles;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentsError {
    #[error(transparent)]
    Core(#[from] cadre_core::CoreError),
    #[error(transparent)]
    Mission(#[from] mission::MissionError),
    #[error(transparent)]
    Registry(#[from] registry::RegistryError),
    #[error(transparent)]
    Review(#[from] review::ReviewError),
}
