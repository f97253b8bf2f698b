// ExchangeSettings: the immutable configuration value handed to every
// component of the exchange chain, plus the optional JSON settings file that
// can pre-populate it.

use crate::constants::{defaults, HOSTED_API_URL};
use crate::error::{TokenError, TokenResult};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

// ---------------------------------------------------------------------------
// RunnerScope
// ---------------------------------------------------------------------------

/// Where the runner will be registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RunnerScope {
    /// Organization-level runner
    Organization { name: String },

    /// Repository-level runner
    Repository { owner: String, repo: String },
}

impl RunnerScope {
    /// Parse an `owner/repo` pair into a repository scope.
    pub fn repository(value: &str) -> TokenResult<Self> {
        match value.trim().split_once('/') {
            Some((owner, repo))
                if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
            {
                Ok(RunnerScope::Repository {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                })
            }
            _ => Err(TokenError::Config(format!(
                "repository must be given as 'owner/repo', got '{value}'"
            ))),
        }
    }

    /// API path segments of the registration-token endpoint for this scope.
    pub fn registration_token_segments(&self) -> Vec<&str> {
        let mut segments = match self {
            RunnerScope::Organization { name } => vec!["orgs", name.as_str()],
            RunnerScope::Repository { owner, repo } => {
                vec!["repos", owner.as_str(), repo.as_str()]
            }
        };
        segments.extend(["actions", "runners", "registration-token"]);
        segments
    }
}

impl std::fmt::Display for RunnerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerScope::Organization { name } => write!(f, "org:{name}"),
            RunnerScope::Repository { owner, repo } => write!(f, "repo:{owner}/{repo}"),
        }
    }
}

// ---------------------------------------------------------------------------
// DecodeMode / RetrySettings
// ---------------------------------------------------------------------------

/// How a 201 response body that does not decode is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeMode {
    /// Decode failures and empty tokens are errors.
    #[default]
    Strict,
    /// Decode failures are logged and the empty credential is passed on.
    Lenient,
}

/// Bounded retry policy of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    /// Attempts in total, including the first one.
    pub max_attempts: u32,
    pub wait_min: Duration,
    pub wait_max: Duration,
    /// Per-attempt deadline enforced by the HTTP client.
    pub request_timeout: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            wait_min: defaults::RETRY_WAIT_MIN,
            wait_max: defaults::RETRY_WAIT_MAX,
            request_timeout: defaults::REQUEST_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// ExchangeSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    /// API server hostname, e.g. `ghe.example.com`.
    pub host: String,
    /// Explicit REST API base; derived from `host` when absent.
    pub api_url: Option<String>,
    pub scope: RunnerScope,
    /// GitHub App ID, used as the JWT issuer.
    pub app_id: u64,
    pub installation_id: u64,
    pub private_key_path: PathBuf,
    pub jwt_ttl: Duration,
    pub jwt_issue_buffer: Duration,
    pub retry: RetrySettings,
    pub decode_mode: DecodeMode,
}

impl ExchangeSettings {
    /// Settings with the default TTL, buffer, retry policy and decode mode.
    pub fn new(
        host: impl Into<String>,
        scope: RunnerScope,
        app_id: u64,
        installation_id: u64,
        private_key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            api_url: None,
            scope,
            app_id,
            installation_id,
            private_key_path: private_key_path.into(),
            jwt_ttl: defaults::JWT_TTL,
            jwt_issue_buffer: defaults::JWT_ISSUE_BUFFER,
            retry: RetrySettings::default(),
            decode_mode: DecodeMode::default(),
        }
    }

    /// Check every field; the first violation is returned as `TokenError::Config`.
    pub fn validate(&self) -> TokenResult<()> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(TokenError::Config("host must not be empty".into()));
        }
        if host.contains("://") || host.contains('/') {
            return Err(TokenError::Config(format!(
                "host must be a bare hostname without scheme or path, got '{host}'"
            )));
        }

        match &self.scope {
            RunnerScope::Organization { name } if name.trim().is_empty() => {
                return Err(TokenError::Config("organization must not be empty".into()));
            }
            RunnerScope::Repository { owner, repo }
                if owner.trim().is_empty() || repo.trim().is_empty() =>
            {
                return Err(TokenError::Config("repository owner and name must not be empty".into()));
            }
            _ => {}
        }

        if self.app_id == 0 {
            return Err(TokenError::Config("app id must be greater than zero".into()));
        }
        if self.installation_id == 0 {
            return Err(TokenError::Config(
                "installation id must be greater than zero".into(),
            ));
        }

        if self.jwt_ttl.is_zero() || self.jwt_ttl > defaults::JWT_MAX_TTL {
            return Err(TokenError::Config(format!(
                "jwt ttl must be between 1 and {} seconds, got {}",
                defaults::JWT_MAX_TTL.as_secs(),
                self.jwt_ttl.as_secs()
            )));
        }
        if self.jwt_issue_buffer >= defaults::JWT_MAX_TTL {
            return Err(TokenError::Config(format!(
                "jwt issue buffer must be below {} seconds",
                defaults::JWT_MAX_TTL.as_secs()
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(TokenError::Config("max attempts must be at least 1".into()));
        }
        if self.retry.wait_min > self.retry.wait_max {
            return Err(TokenError::Config(
                "retry wait minimum must not exceed the maximum".into(),
            ));
        }

        self.api_base().map(|_| ())
    }

    /// REST API base URL.
    ///
    /// github.com uses `https://api.github.com`, GHE.com tenants use
    /// `https://api.<tenant>.ghe.com`, everything else is a GitHub Enterprise
    /// Server at `https://<host>/api/v3`.
    pub fn api_base(&self) -> TokenResult<Url> {
        let raw = match &self.api_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let host = self.host.trim().to_lowercase();
                if host == "github.com" || host == "www.github.com" {
                    HOSTED_API_URL.to_string()
                } else if host.ends_with(".ghe.com") && !host.starts_with("api.") {
                    format!("https://api.{host}")
                } else {
                    format!("https://{host}/api/v3")
                }
            }
        };

        Url::parse(&raw).map_err(|source| TokenError::InvalidUrl { url: raw, source })
    }
}

// ---------------------------------------------------------------------------
// SettingsFile
// ---------------------------------------------------------------------------

/// Optional JSON settings file. Every field may be omitted; command-line
/// flags and environment variables take precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsFile {
    pub host: Option<String>,
    pub api_url: Option<String>,
    pub organization: Option<String>,
    pub repository: Option<String>,
    pub app_id: Option<u64>,
    pub installation_id: Option<u64>,
    pub private_key_path: Option<PathBuf>,
    pub jwt_ttl_secs: Option<u64>,
    pub jwt_issue_buffer_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub retry_wait_min_secs: Option<u64>,
    pub retry_wait_max_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub decode_mode: Option<DecodeMode>,
}

impl SettingsFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }
}
