use async_trait::async_trait;

use crate::errors::TapClawResult;
use crate::llm::types::InferenceRequest;

/// Inference contract: one request in, raw model text out.
/// Any error is treated by the session as "inference unavailable".
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Returns the provider's identifier (matches config.toml key).
    fn name(&self) -> &str;

    async fn infer(&self, request: &InferenceRequest) -> TapClawResult<String>;
}
