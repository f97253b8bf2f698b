// regtoken: signs a GitHub App JWT, exchanges it for an installation access
// token, and exchanges that for a self-hosted runner registration token.
//
// Architecture:
//   main -> Args::resolve_settings -> TokenPipeline::run
//   TokenPipeline::run -> key_loader -> AppJwtSigner -> InstallationTokenStep
//                      -> RegistrationTokenStep (both over RetryingClient)

pub mod app_jwt;
pub mod command_settings;
pub mod credentials;
pub mod exchange;
pub mod key_loader;
pub mod pipeline;
pub mod transport;

pub use app_jwt::{AppJwtClaims, AppJwtSigner};
pub use credentials::{AppAssertion, Credential, InstallationToken, RegistrationToken};
pub use exchange::{ExchangeStep, ExchangeStepExt, InstallationTokenStep, RegistrationTokenStep};
pub use pipeline::TokenPipeline;
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, RetryPolicy, RetryingClient, Transport};
