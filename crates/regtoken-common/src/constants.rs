// Constants shared by the exchange steps, the transport and the CLI.

use std::time::Duration;

/// `Accept` header value pinned to the REST API v3 media type.
pub const GITHUB_V3_MEDIA_TYPE: &str = "application/vnd.github.v3+json";

/// REST API base for github.com.
pub const HOSTED_API_URL: &str = "https://api.github.com";

/// Authorization scheme keywords.
pub mod auth_scheme {
    /// Used with the App JWT.
    pub const BEARER: &str = "Bearer";
    /// Used with installation access tokens.
    pub const TOKEN: &str = "token";
}

/// Defaults for the App JWT and the retrying transport.
pub mod defaults {
    use super::Duration;

    pub const JWT_TTL: Duration = Duration::from_secs(300);
    pub const JWT_ISSUE_BUFFER: Duration = Duration::from_secs(30);
    /// GitHub rejects App JWTs valid for longer than ten minutes.
    pub const JWT_MAX_TTL: Duration = Duration::from_secs(600);

    /// First try plus three retries.
    pub const MAX_ATTEMPTS: u32 = 4;
    pub const RETRY_WAIT_MIN: Duration = Duration::from_secs(30);
    pub const RETRY_WAIT_MAX: Duration = Duration::from_secs(30);
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
}

/// Environment variables read by the binary.
pub mod env {
    pub const HOST: &str = "REGTOKEN_HOST";
    pub const ORG: &str = "REGTOKEN_ORG";
    pub const REPO: &str = "REGTOKEN_REPO";
    pub const APP_ID: &str = "REGTOKEN_APP_ID";
    pub const INSTALLATION_ID: &str = "REGTOKEN_INSTALLATION_ID";
    pub const PRIVATE_KEY_PATH: &str = "REGTOKEN_PRIVATE_KEY_PATH";
    pub const JWT_TTL_SECS: &str = "REGTOKEN_JWT_TTL_SECS";
    pub const JWT_ISSUE_BUFFER_SECS: &str = "REGTOKEN_JWT_ISSUE_BUFFER_SECS";
    pub const MAX_ATTEMPTS: &str = "REGTOKEN_MAX_ATTEMPTS";
    pub const CONFIG: &str = "REGTOKEN_CONFIG";
    /// When truthy, TLS certificate verification is disabled.
    pub const TLS_NO_VERIFY: &str = "REGTOKEN_TLS_NO_VERIFY";
}

/// Process exit codes.
pub mod return_code {
    pub const SUCCESS: i32 = 0;
    pub const FAILED: i32 = 1;
}
