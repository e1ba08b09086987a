//! The completion seam used by every model-backed pipeline stage.

use async_trait::async_trait;
use mise_core::Result;

use crate::types::LlmRequest;

/// Stateless text completion.
///
/// Calls are side-effect free, so the pipeline may issue the same request
/// again for a different candidate without coordination.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete `request` and return the model's text output.
    async fn complete(&self, request: LlmRequest) -> Result<String>;

    /// Model identifier, for logs and responses.
    fn model(&self) -> &str;

    /// Whether requests carrying [`WebSearch`](crate::types::WebSearch)
    /// run a live search. When false the model answers from its own
    /// knowledge and the caller should prompt accordingly.
    fn supports_web_search(&self) -> bool {
        false
    }
}
