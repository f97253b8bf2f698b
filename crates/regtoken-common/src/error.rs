// Error type for the credential-exchange chain.
//
// Every failure is returned as a value; the binary decides how to report it.

use std::path::PathBuf;

/// Boxed error produced by an HTTP transport implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type TokenResult<T> = Result<T, TokenError>;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read private key file '{}'", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse RSA private key")]
    KeyParse(#[source] jsonwebtoken::errors::Error),

    #[error("failed to sign app assertion")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("invalid request URL '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{step}: request failed after {attempts} attempt(s)")]
    Network {
        step: &'static str,
        attempts: u32,
        #[source]
        source: BoxError,
    },

    #[error("{step}: unexpected HTTP status {status} (expected 201): {body}")]
    UnexpectedStatus {
        step: &'static str,
        status: u16,
        body: String,
    },

    #[error("{step}: failed to decode response body")]
    Decode {
        step: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{step}: {reason}")]
    InvalidCredential { step: &'static str, reason: String },
}

impl TokenError {
    /// Short, stable name of the error kind for structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::Config(_) => "config",
            TokenError::FileRead { .. } => "file_read",
            TokenError::KeyParse(_) => "key_parse",
            TokenError::Signing(_) => "signing",
            TokenError::InvalidUrl { .. } => "invalid_url",
            TokenError::Network { .. } => "network",
            TokenError::UnexpectedStatus { .. } => "unexpected_status",
            TokenError::Decode { .. } => "decode",
            TokenError::InvalidCredential { .. } => "invalid_credential",
        }
    }
}
