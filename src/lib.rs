//! Promptsmith - provider-agnostic AI code generation library.
//!
//! This library lets one CLI talk to interchangeable LLM backends through a
//! uniform generate/stream contract and turns a backend's free-form reply
//! into files written to disk. It supports:
//!
//! - **Provider abstraction** over OpenAI, Anthropic, and Gemini backends
//! - **Streaming generation** as a pull-based fragment stream
//! - **Response materialization** via a `FILE:`-block grammar
//! - **Layered configuration** with project-over-global precedence
//! - **Session persistence** for the interactive shell
//!
//! # Architecture
//!
//! - [`config`] - Configuration resolution (credentials, active provider)
//! - [`providers`] - The `ProviderAdapter` contract, its three backend
//!   variants, and the provider factory
//! - [`generator`] - Wraps prompts with the output-grammar instruction and
//!   drives one generation
//! - [`materializer`] - Parses `FILE:` blocks out of a reply and writes them
//! - [`session`] - Saved conversations for `start --continue`
//! - [`error`] - The typed error taxonomy
//!
//! # Example
//!
//! ```ignore
//! use promptsmith::config::ConfigManager;
//! use promptsmith::generator::Generator;
//! use promptsmith::providers;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigManager::new()?.load()?;
//!     let provider = providers::create_provider(&config, None)?;
//!     let generator = Generator::new(provider);
//!
//!     let outcome = generator
//!         .generate("a small express server", &std::env::current_dir()?)
//!         .await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! The library returns typed results only; exit-code decisions belong to the
//! binary.

pub mod config;
pub mod error;
pub mod generator;
pub mod materializer;
pub mod providers;
pub mod session;
