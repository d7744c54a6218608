//! The founder-facing chat surface (§6). Not a process of its own — a
//! library the daemon binaries or the CLI can embed behind whatever
//! `ChatAdapter` the deployment actually has (Slack, Discord, a plain
//! terminal). Ships with stdout/no-op stubs good enough for local use.

pub mod adapter;
pub mod commands;
pub mod documents;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Core(#[from] cadre_core::CoreError),
    #[error(transparent)]
    Mission(#[from] cadre_agents::mission::MissionError),
    #[error(transparent)]
    Registry(#[from] cadre_agents::registry::RegistryError),
}
