//! Intelligence layer: LLM provider abstraction, tiered model routing,
//! per-agent memory/skills/persona, context assembly, and tool-use
//! resolution (§4.3–§4.8).

pub mod context_builder;
pub mod cost_tracker;
pub mod llm;
pub mod memory;
pub mod model_router;
pub mod persona;
pub mod skills;
pub mod tool_resolver;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntelligenceError {
    #[error(transparent)]
    Core(#[from] cadre_core::CoreError),
    #[error(transparent)]
    Llm(#[from] llm::LlmError),
    #[error(transparent)]
    Tool(#[from] tool_resolver::ToolError),
}
