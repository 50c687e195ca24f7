//! Google Gemini backend.
//!
//! Gemini separates turn history from the active prompt and has no system
//! role at all: prior turns become `contents` entries with roles `user` and
//! `model`, and the system instruction is prefixed onto the final user turn.

use super::{GenerationOptions, Message, ProviderAdapter, Role, SseLineBuffer, TextStream};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tracing::debug;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    fn url(&self, method: &str, query: &str) -> String {
        format!(
            "{API_BASE}/models/{model}:{method}?{query}key={key}",
            model = self.model,
            key = self.api_key
        )
    }

    fn request_body(&self, messages: &[Message], options: GenerationOptions) -> serde_json::Value {
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str());
        let turns: Vec<&Message> = messages.iter().filter(|m| m.role != Role::System).collect();

        // History is every turn but the last; the last becomes the active
        // prompt, with the system instruction folded in front of it.
        let history: Vec<serde_json::Value> = turns
            .iter()
            .take(turns.len().saturating_sub(1))
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::Assistant => "model",
                        _ => "user",
                    },
                    "parts": [{ "text": m.content }],
                })
            })
            .collect();

        let last = turns.last().map(|m| m.content.as_str()).unwrap_or_default();
        let prompt = match system {
            Some(system) => format!("{system}\n\n{last}"),
            None => last.to_string(),
        };

        let mut contents = history;
        contents.push(json!({ "role": "user", "parts": [{ "text": prompt }] }));

        json!({
            "contents": contents,
            "generationConfig": {
                "temperature": options.temperature,
                "maxOutputTokens": options.max_tokens,
            },
        })
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::backend(format!("{status}: {detail}")));
        }
        Ok(response)
    }

    /// Concatenated text parts of the first candidate; `None` when the chunk
    /// carries no text (safety annotations, usage metadata).
    fn candidate_text(value: &serde_json::Value) -> Option<String> {
        let parts = value["candidates"][0]["content"]["parts"].as_array()?;
        let text: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect();
        if text.is_empty() { None } else { Some(text) }
    }

    fn delta_text(data: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(data).ok()?;
        Self::candidate_text(&value)
    }
}

#[async_trait]
impl ProviderAdapter for GeminiProvider {
    async fn generate(&self, messages: &[Message], options: GenerationOptions) -> Result<String> {
        debug!(model = %self.model, "Gemini generateContent request");
        let url = self.url("generateContent", "");
        let response = self.post(&url, &self.request_body(messages, options)).await?;
        let value: serde_json::Value = response.json().await?;
        Ok(Self::candidate_text(&value).unwrap_or_default())
    }

    async fn stream_generate(
        &self,
        messages: &[Message],
        options: GenerationOptions,
    ) -> Result<TextStream> {
        debug!(model = %self.model, "Gemini streaming request");
        let url = self.url("streamGenerateContent", "alt=sse&");
        let response = self.post(&url, &self.request_body(messages, options)).await?;

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
                        if tx.send(Ok(text)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Ok(stream)
    }
}
