// regtoken-common: Shared services for regtoken.
// Depends on `regtoken-sdk`; consumed by the `regtoken` binary crate.

pub mod constants;
pub mod error;
pub mod http_client_factory;
pub mod logging;
pub mod secret_masker;
pub mod settings;

pub use error::{TokenError, TokenResult};
pub use http_client_factory::HttpClientFactory;
pub use logging::LogFormat;
pub use secret_masker::SecretMasker;
pub use settings::{DecodeMode, ExchangeSettings, RetrySettings, RunnerScope, SettingsFile};
