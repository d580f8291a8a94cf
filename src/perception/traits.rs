use std::path::Path;

use async_trait::async_trait;

use crate::errors::VisualAgentResult;
use crate::perception::types::Perception;

/// Capability seam for screenshot analysis. The control loop depends
/// only on this trait; the HTTP detector client is one implementation.
#[async_trait]
pub trait Perceiver: Send + Sync {
    async fn analyze(&self, screenshot: &Path) -> VisualAgentResult<Perception>;
}
