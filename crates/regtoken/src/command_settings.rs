// Command-line arguments, with environment variable fallback and an optional
// JSON settings file underneath both.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use regtoken_common::constants::{defaults, env as vars};
use regtoken_common::{
    DecodeMode, ExchangeSettings, LogFormat, RetrySettings, RunnerScope, SettingsFile,
};
use std::path::PathBuf;
use std::time::Duration;

use crate::credentials::{Credential, RegistrationToken};

/// How the registration token is written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The bare token
    Text,
    /// `{"token": ..., "expires_at": ...}`
    Json,
}

impl OutputFormat {
    pub fn render(self, token: &RegistrationToken) -> Result<String> {
        match self {
            OutputFormat::Text => Ok(token.secret().to_string()),
            OutputFormat::Json => {
                serde_json::to_string(token).context("Failed to serialize registration token")
            }
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "regtoken",
    version,
    about = "Exchange a GitHub App identity for a self-hosted runner registration token"
)]
pub struct Args {
    /// JSON settings file; flags and environment variables override its values.
    #[arg(long, env = vars::CONFIG)]
    pub config: Option<PathBuf>,

    /// API server hostname, e.g. ghe.example.com or github.com.
    #[arg(long, env = vars::HOST)]
    pub host: Option<String>,

    /// Explicit REST API base URL (defaults to one derived from --host).
    #[arg(long)]
    pub api_url: Option<String>,

    /// Organization to register the runner with.
    #[arg(long = "org", env = vars::ORG)]
    pub organization: Option<String>,

    /// Repository (`owner/repo`) to register the runner with, instead of an organization.
    #[arg(long = "repo", env = vars::REPO, conflicts_with = "organization")]
    pub repository: Option<String>,

    /// GitHub App ID.
    #[arg(long, env = vars::APP_ID)]
    pub app_id: Option<u64>,

    /// GitHub App installation ID.
    #[arg(long, env = vars::INSTALLATION_ID)]
    pub installation_id: Option<u64>,

    /// Path to the GitHub App private key (PEM).
    #[arg(long = "private-key", env = vars::PRIVATE_KEY_PATH)]
    pub private_key_path: Option<PathBuf>,

    #[arg(long, env = vars::JWT_TTL_SECS)]
    pub jwt_ttl_secs: Option<u64>,

    #[arg(long, env = vars::JWT_ISSUE_BUFFER_SECS)]
    pub jwt_issue_buffer_secs: Option<u64>,

    /// Attempts per API call, including the first one.
    #[arg(long, env = vars::MAX_ATTEMPTS)]
    pub max_attempts: Option<u32>,

    #[arg(long)]
    pub retry_wait_min_secs: Option<u64>,

    #[arg(long)]
    pub retry_wait_max_secs: Option<u64>,

    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// Treat undecodable 201 bodies as empty credentials instead of errors.
    #[arg(long)]
    pub lenient_decode: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Log line format: text or json.
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,
}

impl Args {
    /// Load the settings file (if any) and merge it under the command line.
    pub fn resolve_settings(&self) -> Result<ExchangeSettings> {
        let file = match &self.config {
            Some(path) => SettingsFile::load(path)?,
            None => SettingsFile::default(),
        };
        self.merge(file)
    }

    /// Merge with `file`; values given on the command line or in the
    /// environment win.
    pub fn merge(&self, file: SettingsFile) -> Result<ExchangeSettings> {
        let host = required(self.host.clone().or(file.host), "host", "--host", vars::HOST)?;

        let scope = match (
            self.repository.as_deref(),
            self.organization.as_deref(),
        ) {
            (Some(repo), _) => RunnerScope::repository(repo)?,
            (None, Some(org)) => RunnerScope::Organization {
                name: org.to_string(),
            },
            (None, None) => match (file.repository, file.organization) {
                (Some(repo), _) => RunnerScope::repository(&repo)?,
                (None, Some(org)) => RunnerScope::Organization { name: org },
                (None, None) => {
                    return Err(anyhow!(
                        "missing runner scope: pass --org (or {}) or --repo (or {})",
                        vars::ORG,
                        vars::REPO
                    ))
                }
            },
        };

        let app_id = required(self.app_id.or(file.app_id), "app id", "--app-id", vars::APP_ID)?;
        let installation_id = required(
            self.installation_id.or(file.installation_id),
            "installation id",
            "--installation-id",
            vars::INSTALLATION_ID,
        )?;
        let private_key_path = required(
            self.private_key_path.clone().or(file.private_key_path),
            "private key path",
            "--private-key",
            vars::PRIVATE_KEY_PATH,
        )?;

        let secs = |cli: Option<u64>, file: Option<u64>, default: Duration| {
            cli.or(file).map(Duration::from_secs).unwrap_or(default)
        };

        let retry = RetrySettings {
            max_attempts: self
                .max_attempts
                .or(file.max_attempts)
                .unwrap_or(defaults::MAX_ATTEMPTS),
            wait_min: secs(
                self.retry_wait_min_secs,
                file.retry_wait_min_secs,
                defaults::RETRY_WAIT_MIN,
            ),
            wait_max: secs(
                self.retry_wait_max_secs,
                file.retry_wait_max_secs,
                defaults::RETRY_WAIT_MAX,
            ),
            request_timeout: secs(
                self.request_timeout_secs,
                file.request_timeout_secs,
                defaults::REQUEST_TIMEOUT,
            ),
        };

        let decode_mode = if self.lenient_decode {
            DecodeMode::Lenient
        } else {
            file.decode_mode.unwrap_or_default()
        };

        let settings = ExchangeSettings {
            host,
            api_url: self.api_url.clone().or(file.api_url),
            scope,
            app_id,
            installation_id,
            private_key_path,
            jwt_ttl: secs(self.jwt_ttl_secs, file.jwt_ttl_secs, defaults::JWT_TTL),
            jwt_issue_buffer: secs(
                self.jwt_issue_buffer_secs,
                file.jwt_issue_buffer_secs,
                defaults::JWT_ISSUE_BUFFER,
            ),
            retry,
            decode_mode,
        };
        settings.validate()?;
        Ok(settings)
    }
}

fn required<T>(value: Option<T>, what: &str, flag: &str, env_var: &str) -> Result<T> {
    value.ok_or_else(|| {
        anyhow!("missing required setting '{what}': pass {flag}, set {env_var}, or use a settings file")
    })
}
