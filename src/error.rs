//! Typed error taxonomy for the core library.
//!
//! The library never terminates the process; every fallible operation
//! returns one of these variants and the CLI boundary decides what to do
//! with it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No configuration file exists at either scope.
    #[error("no configuration found. Run: promptsmith init")]
    ConfigurationMissing,

    /// The active or requested provider has no stored credentials.
    #[error("no API key configured for {0}. Run: promptsmith init --provider {0}")]
    ProviderNotConfigured(String),

    /// The provider id does not name a known adapter variant.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// Transport, authentication, or rate-limit failure from a backend.
    /// The backend's own error detail is preserved verbatim.
    #[error("backend error: {detail}")]
    Backend { detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn backend(detail: impl Into<String>) -> Self {
        Error::Backend {
            detail: detail.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Backend {
            detail: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
