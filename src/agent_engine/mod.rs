pub mod engine;
pub mod types;

pub use engine::VisualAgentEngine;
pub use types::{AgentResult, PlannedAction, PlannerResponse, RunStatus, ScreenElement};
