//! Anthropic messages backend.
//!
//! System instructions travel in a dedicated top-level `system` field rather
//! than the message list, and streamed text arrives wrapped in typed events;
//! only `content_block_delta` events with a `text_delta` carry text.

use super::{GenerationOptions, Message, ProviderAdapter, Role, SseLineBuffer, TextStream};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicProvider {
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
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone());
        let turns: Vec<&Message> = messages.iter().filter(|m| m.role != Role::System).collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": options.max_tokens,
            "messages": turns,
            "temperature": options.temperature,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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

    /// Text from a `content_block_delta` event; every other event type
    /// (`message_start`, `ping`, tool deltas, `message_stop`) yields nothing.
    fn delta_text(data: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(data).ok()?;
        if value["type"] != "content_block_delta" || value["delta"]["type"] != "text_delta" {
            return None;
        }
        value["delta"]["text"].as_str().map(|s| s.to_string())
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    async fn generate(&self, messages: &[Message], options: GenerationOptions) -> Result<String> {
        debug!(model = %self.model, "Anthropic messages request");
        let response = self.post(&self.request_body(messages, options, false)).await?;
        let parsed: MessagesResponse = response.json().await?;
        Ok(parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .unwrap_or_default())
    }

    async fn stream_generate(
        &self,
        messages: &[Message],
        options: GenerationOptions,
    ) -> Result<TextStream> {
        debug!(model = %self.model, "Anthropic streaming request");
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
    fn system_message_moves_to_dedicated_field() {
        let provider = AnthropicProvider::new("key".to_string(), None);
        let messages = [
            Message::system("obey the grammar"),
            Message::user("build me a crate"),
        ];
        let body = provider.request_body(&messages, GenerationOptions::default(), false);

        assert_eq!(body["system"], "obey the grammar");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn body_omits_system_field_when_no_system_message() {
        let provider = AnthropicProvider::new("key".to_string(), None);
        let messages = [Message::user("hi")];
        let body = provider.request_body(&messages, GenerationOptions::default(), false);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn delta_text_unwraps_text_delta_events_only() {
        let delta = r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"lo"}}"#;
        assert_eq!(AnthropicProvider::delta_text(delta), Some("lo".to_string()));

        let ping = r#"{"type":"ping"}"#;
        assert_eq!(AnthropicProvider::delta_text(ping), None);

        let json_delta =
            r#"{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"{"}}"#;
        assert_eq!(AnthropicProvider::delta_text(json_delta), None);
    }

    #[test]
    fn non_text_first_block_yields_empty_string() {
        let parsed: MessagesResponse =
            serde_json::from_str(r#"{"content":[{"type":"tool_use","id":"t1"}]}"#).unwrap();
        let text = parsed
            .content
            .into_iter()
            .find(|b| b.kind == "text")
            .and_then(|b| b.text)
            .unwrap_or_default();
        assert_eq!(text, "");
    }
}
