use async_trait::async_trait;

use crate::errors::AgentResult;
use crate::llm::types::CallConfig;

/// The model-call collaborator: prompt plus screenshot in, free-form text out.
/// New providers only need to implement this trait and register in config.toml.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches config.toml key).
    fn name(&self) -> &str;

    /// Sends one user turn with `prompt` and the PNG `image_png` and returns
    /// the assistant's text. Transport and HTTP failures are errors.
    async fn complete(&self, prompt: &str, image_png: &[u8], cfg: &CallConfig) -> AgentResult<String>;
}
