pub mod openai;
pub mod prompt;

use std::path::Path;

use async_trait::async_trait;

use crate::agent_engine::types::{PlannerResponse, ScreenElement};
use crate::errors::VisualAgentResult;
use crate::executor::ActionRecord;

/// Planning capability. The control loop depends only on this trait;
/// each vision-language provider is one implementation behind it.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        instruction: &str,
        screenshot: &Path,
        elements: &[ScreenElement],
        history: &[ActionRecord],
    ) -> VisualAgentResult<PlannerResponse>;
}
