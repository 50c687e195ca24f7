//! OpenAI-style chat completions backend.
//!
//! The simplest of the three envelopes: system instructions ride inline as a
//! `system`-role message, so the conversation is forwarded as-is.

use super::{GenerationOptions, Message, ProviderAdapter, SseLineBuffer, TextStream};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";

pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAIProvider {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    fn request_body(
        &self,
        messages: &[Message],
        options: GenerationOptions,
        stream: bool,
    ) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": stream,
        })
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::backend(format!("{status}: {detail}")));
        }
        Ok(response)
    }

    /// Text carried by one SSE payload, or `None` for the `[DONE]` sentinel
    /// and non-content events (role announcements, finish chunks).
    fn delta_text(data: &str) -> Option<String> {
        if data == "[DONE]" {
            return None;
        }
        let value: serde_json::Value = serde_json::from_str(data).ok()?;
        value["choices"][0]["delta"]["content"]
            .as_str()
            .map(|s| s.to_string())
    }
}

#[async_trait]
impl ProviderAdapter for OpenAIProvider {
    async fn generate(&self, messages: &[Message], options: GenerationOptions) -> Result<String> {
        debug!(model = %self.model, "OpenAI completion request");
        let response = self.post(&self.request_body(messages, options, false)).await?;
        let parsed: ChatResponse = response.json().await?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn stream_generate(
        &self,
        messages: &[Message],
        options: GenerationOptions,
    ) -> Result<TextStream> {
        debug!(model = %self.model, "OpenAI streaming request");
        let response = self.post(&self.request_body(messages, options, true)).await?;

        let (tx, stream) = TextStream::channel();
        tokio::spawn(async move {
            let mut lines = SseLineBuffer::new();
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        let _ = tx.send(Err(err.into())).await;
                        return;
                    }
                };
                lines.push(&bytes);
                while let Some(data) = lines.next_data() {
                    if let Some(text) = Self::delta_text(&data) {
                        if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_text_unwraps_content() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(OpenAIProvider::delta_text(data), Some("Hel".to_string()));
    }

    #[test]
    fn delta_text_skips_done_sentinel_and_empty_deltas() {
        assert_eq!(OpenAIProvider::delta_text("[DONE]"), None);
        assert_eq!(
            OpenAIProvider::delta_text(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#),
            None
        );
        assert_eq!(
            OpenAIProvider::delta_text(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            None
        );
    }

    #[test]
    fn missing_content_parses_as_empty() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant"}}]}"#).unwrap();
        assert_eq!(parsed.choices[0].message.content, None);
    }

    #[test]
    fn model_defaults_when_not_overridden() {
        let provider = OpenAIProvider::new("key".to_string(), None);
        assert_eq!(provider.model, DEFAULT_MODEL);
        let provider = OpenAIProvider::new("key".to_string(), Some("gpt-4o".to_string()));
        assert_eq!(provider.model, "gpt-4o");
    }
}
