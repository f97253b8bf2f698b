// TokenPipeline: key file -> App JWT -> installation token -> registration token.

use anyhow::{Context, Result};
use regtoken_common::{ExchangeSettings, HttpClientFactory, SecretMasker, TokenResult};
use std::sync::Arc;

use crate::app_jwt::AppJwtSigner;
use crate::credentials::{Credential, RegistrationToken};
use crate::exchange::{ExchangeStep, ExchangeStepExt, InstallationTokenStep, RegistrationTokenStep};
use crate::key_loader;
use crate::transport::{ReqwestTransport, RetryPolicy, RetryingClient, Transport};

/// One run of the credential-exchange chain. Nothing is cached between runs.
pub struct TokenPipeline {
    settings: ExchangeSettings,
    client: RetryingClient,
}

impl TokenPipeline {
    /// Build a pipeline that talks to the API through `reqwest`, honoring the
    /// proxy environment.
    pub fn from_settings(settings: ExchangeSettings, masker: SecretMasker) -> Result<Self> {
        let http =
            HttpClientFactory::create_default_client(settings.retry.request_timeout, &masker)
                .context("Failed to set up the HTTP transport")?;
        Self::with_transport(settings, Arc::new(ReqwestTransport::new(http)), masker)
            .context("Invalid exchange settings")
    }

    /// Build a pipeline over an arbitrary transport.
    pub fn with_transport(
        settings: ExchangeSettings,
        transport: Arc<dyn Transport>,
        masker: SecretMasker,
    ) -> TokenResult<Self> {
        settings.validate()?;
        let policy = RetryPolicy::from(&settings.retry);
        Ok(Self {
            settings,
            client: RetryingClient::new(transport, policy, masker),
        })
    }

    pub fn settings(&self) -> &ExchangeSettings {
        &self.settings
    }

    pub async fn run(&self) -> TokenResult<RegistrationToken> {
        let settings = &self.settings;
        let api_base = settings.api_base()?;

        tracing::info!(
            api = %api_base,
            app_id = settings.app_id,
            installation_id = settings.installation_id,
            scope = %settings.scope,
            "Requesting runner registration token"
        );

        let pem = key_loader::load_private_key(&settings.private_key_path)?;
        let signer = AppJwtSigner::from_pem(
            &pem,
            settings.app_id,
            settings.jwt_ttl,
            settings.jwt_issue_buffer,
        )?;
        drop(pem);

        let assertion = signer.sign()?;
        self.client.masker().add_value(assertion.secret());
        tracing::info!(
            "Signed app assertion {} (valid until {})",
            assertion.redacted(),
            assertion
                .expires_at()
                .map(|t| t.to_rfc3339())
                .unwrap_or_default()
        );

        let chain = InstallationTokenStep::new(
            api_base.clone(),
            settings.installation_id,
            settings.decode_mode,
        )
        .then(RegistrationTokenStep::new(
            api_base,
            settings.scope.clone(),
            settings.decode_mode,
        ));
        tracing::debug!(steps = ?chain.names(), "Running exchange chain");

        chain.run(&self.client, assertion).await
    }
}
