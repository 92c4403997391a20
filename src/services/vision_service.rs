use crate::error::AnalysisResult;
use crate::models::AnalysisRequest;

/// Trait for vision model providers (OpenRouter, a relay, test stubs).
/// One call per analysis, no retries.
#[async_trait::async_trait]
pub trait VisionService: Send + Sync {
    /// Sends the prompt and image, returns the model's raw reply text.
    async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult<String>;
}
