use async_trait::async_trait;
use base64::Engine as _;

use crate::errors::{AgentError, AgentResult};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn complete(&self, prompt: &str, image_png: &[u8], cfg: &CallConfig) -> AgentResult<String> {
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(image_png);
        let messages = vec![ChatMessage::user_with_image(prompt, &image_b64)];
        let body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "max_tokens": cfg.max_tokens,
            "temperature": cfg.temperature,
        });

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            prompt_len = prompt.len(),
            image_bytes = image_png.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(AgentError::LlmProvider(format!("{}: {}", status, err_body)));
        }

        let json: serde_json::Value = response.json().await?;
        let content = extract_content(&json)?;
        tracing::info!(
            provider = %self.id,
            content_len = content.len(),
            "completion received"
        );
        Ok(content)
    }
}

/// Pulls the assistant text out of a chat-completions body. Some providers
/// return `content` as an array of text parts; those are concatenated.
fn extract_content(json: &serde_json::Value) -> AgentResult<String> {
    let content = &json["choices"][0]["message"]["content"];
    if let Some(text) = content.as_str() {
        return Ok(text.to_string());
    }
    if let Some(parts) = content.as_array() {
        return Ok(parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join(""));
    }
    if let Some(err) = json["error"]["message"].as_str() {
        return Err(AgentError::LlmProvider(err.to_string()));
    }
    Err(AgentError::LlmProvider(
        "completion response carried no message content".into(),
    ))
}
