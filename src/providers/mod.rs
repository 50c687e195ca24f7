//! Uniform generation contract over heterogeneous LLM backends.
//!
//! Each backend variant translates the role-tagged conversation into its own
//! request envelope and unwraps its own streaming-delta envelope back into
//! plain text fragments. Everything else about the contract is identical
//! across variants; see [`ProviderAdapter`].

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

pub mod anthropic;
pub mod gemini;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAIProvider;

/// Speaker of one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn in a conversation. Order within a `Vec<Message>` is the turn
/// history and is semantically significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-request tuning knobs. Transient, one per call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Fragments kept in flight between the producer task and the consumer.
const STREAM_BUFFER: usize = 16;

/// A finite, non-restartable stream of text fragments.
///
/// A producer task parses the backend's live connection and pushes fragments
/// into a bounded channel; the consumer pulls them one at a time, so
/// backpressure never exceeds the channel bound. Dropping the stream closes
/// the channel, which ends the producer and with it the connection.
/// Concatenating all fragments in order yields exactly what a non-streamed
/// call would have returned.
pub struct TextStream {
    rx: mpsc::Receiver<Result<String>>,
}

impl TextStream {
    /// A bounded fragment channel plus the stream draining it.
    pub fn channel() -> (mpsc::Sender<Result<String>>, Self) {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        (tx, Self { rx })
    }
}

impl Stream for TextStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// The capability every backend variant provides.
///
/// Instances own exactly one credential and one resolved model identifier,
/// are constructed fresh per generation request, and keep no state beyond
/// the call lifetime.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Complete text of the first textual response segment, or `""` when the
    /// backend returned no textual segment. Transport and authentication
    /// failures surface as [`Error::Backend`]; no retries.
    async fn generate(&self, messages: &[Message], options: GenerationOptions) -> Result<String>;

    /// Lazy stream of text fragments for the same inputs. Each concrete
    /// variant unwraps its backend's incremental-delta envelope and skips
    /// non-text events.
    async fn stream_generate(
        &self,
        messages: &[Message],
        options: GenerationOptions,
    ) -> Result<TextStream>;
}

impl std::fmt::Debug for dyn ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProviderAdapter")
    }
}

/// Build the adapter named by the effective configuration.
///
/// A model override (e.g. from `run --model`) takes precedence over the
/// configured model, which takes precedence over the variant's default.
pub fn create_provider(
    config: &Config,
    model_override: Option<String>,
) -> Result<Box<dyn ProviderAdapter>> {
    let active = config.active.as_str();
    let provider_config = config
        .providers
        .get(active)
        .filter(|p| !p.api_key.is_empty())
        .ok_or_else(|| Error::ProviderNotConfigured(active.to_string()))?;

    let api_key = provider_config.api_key.clone();
    let model = model_override.or_else(|| provider_config.model.clone());

    match active {
        "openai" => Ok(Box::new(OpenAIProvider::new(api_key, model))),
        "anthropic" => Ok(Box::new(AnthropicProvider::new(api_key, model))),
        "gemini" => Ok(Box::new(GeminiProvider::new(api_key, model))),
        other => Err(Error::UnknownProvider(other.to_string())),
    }
}

/// Reassembles server-sent-event `data:` payloads from a raw byte stream.
///
/// Chunks arrive on arbitrary boundaries, so bytes accumulate until a full
/// line is available; non-`data:` lines (event names, comments, blanks) are
/// dropped here and the payload handed back untouched.
pub(crate) struct SseLineBuffer {
    buf: BytesMut,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete `data:` payload, if a full line is buffered.
    pub fn next_data(&mut self) -> Option<String> {
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes = self.buf.split_to(pos + 1);
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                return Some(data.trim_start().to_string());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    /// Stub adapter that replays a fixed reply, whole or in fragments.
    struct StubProvider {
        fragments: Vec<&'static str>,
    }

    #[async_trait]
    impl ProviderAdapter for StubProvider {
        async fn generate(&self, _: &[Message], _: GenerationOptions) -> Result<String> {
            Ok(self.fragments.concat())
        }

        async fn stream_generate(
            &self,
            _: &[Message],
            _: GenerationOptions,
        ) -> Result<TextStream> {
            let (tx, stream) = TextStream::channel();
            let fragments: Vec<String> = self.fragments.iter().map(|s| s.to_string()).collect();
            tokio::spawn(async move {
                for fragment in fragments {
                    if tx.send(Ok(fragment)).await.is_err() {
                        return;
                    }
                }
            });
            Ok(stream)
        }
    }

    #[tokio::test]
    async fn streamed_fragments_concatenate_to_generate_result() {
        let provider = StubProvider {
            fragments: vec!["Hel", "lo"],
        };
        let messages = [Message::user("hi")];
        let options = GenerationOptions::default();

        let whole = provider.generate(&messages, options).await.unwrap();

        let mut stream = provider.stream_generate(&messages, options).await.unwrap();
        let mut assembled = String::new();
        while let Some(fragment) = stream.next().await {
            assembled.push_str(&fragment.unwrap());
        }

        assert_eq!(assembled, "Hello");
        assert_eq!(assembled, whole);
    }

    #[tokio::test]
    async fn dropping_the_stream_stops_the_producer() {
        let (tx, stream) = TextStream::channel();
        drop(stream);
        assert!(tx.send(Ok("orphan".to_string())).await.is_err());
    }

    #[test]
    fn factory_rejects_provider_without_credentials() {
        let config = Config::default();
        let err = create_provider(&config, None).unwrap_err();
        assert!(matches!(err, Error::ProviderNotConfigured(p) if p == "openai"));
    }

    #[test]
    fn factory_rejects_unknown_provider_id() {
        use crate::config::ProviderConfig;
        let mut config = Config {
            active: "mystery".to_string(),
            ..Config::default()
        };
        config.providers.insert(
            "mystery".to_string(),
            ProviderConfig {
                api_key: "key".to_string(),
                model: None,
            },
        );
        let err = create_provider(&config, None).unwrap_err();
        assert!(matches!(err, Error::UnknownProvider(p) if p == "mystery"));
    }

    #[test]
    fn factory_builds_each_known_variant() {
        use crate::config::ProviderConfig;
        for id in ["openai", "anthropic", "gemini"] {
            let mut config = Config {
                active: id.to_string(),
                ..Config::default()
            };
            config.providers.insert(
                id.to_string(),
                ProviderConfig {
                    api_key: "key".to_string(),
                    model: None,
                },
            );
            assert!(create_provider(&config, None).is_ok(), "variant {id}");
        }
    }

    #[test]
    fn sse_buffer_handles_split_and_mixed_lines() {
        let mut buf = SseLineBuffer::new();
        buf.push(b"event: delta\r\nda");
        assert_eq!(buf.next_data(), None);
        buf.push(b"ta: {\"x\":1}\n\ndata: [DONE]\n");
        assert_eq!(buf.next_data(), Some("{\"x\":1}".to_string()));
        assert_eq!(buf.next_data(), Some("[DONE]".to_string()));
        assert_eq!(buf.next_data(), None);
    }

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&Message::user("hi")).unwrap(),
            r#"{"role":"user","content":"hi"}"#
        );
    }
}
