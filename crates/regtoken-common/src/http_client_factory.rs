// HttpClientFactory: builds the `reqwest::Client` shared by both exchange
// steps of a run, with proxy, TLS and timeout configuration applied.

use crate::constants::env;
use crate::secret_masker::SecretMasker;
use anyhow::{Context, Result};
use regtoken_sdk::web_proxy::decode_user_info;
use regtoken_sdk::{Package, StringUtil, WebProxy};
use reqwest::Client;
use std::time::Duration;

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Create a client routed through `web_proxy` with a per-request timeout.
    /// Proxy passwords are registered with `masker`.
    ///
    /// If `REGTOKEN_TLS_NO_VERIFY` is truthy, TLS certificate verification is
    /// disabled.
    pub fn create_client(
        web_proxy: &WebProxy,
        request_timeout: Duration,
        masker: &SecretMasker,
    ) -> Result<Client> {
        let mut builder = Client::builder()
            .user_agent(Package::user_agent())
            .timeout(request_timeout);

        if web_proxy.is_configured() {
            for address in [&web_proxy.http_proxy_address, &web_proxy.https_proxy_address]
                .into_iter()
                .flatten()
            {
                let (user, password) = decode_user_info(address);
                if let Some(password) = password {
                    masker.add_value(&password);
                }
                if let Some(user) = user {
                    tracing::debug!(proxy.user = %user, "Proxy requires authentication");
                }
            }
            tracing::info!("Using proxy: {}", web_proxy.describe());

            let routing = web_proxy.clone();
            builder = builder.proxy(reqwest::Proxy::custom(move |url| {
                routing.get_proxy_url(url)
            }));
        } else {
            builder = builder.no_proxy();
        }

        if StringUtil::env_flag(env::TLS_NO_VERIFY) {
            tracing::warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder.build().context("Failed to create HTTP client")
    }

    /// Create a client using proxy settings from the environment.
    pub fn create_default_client(
        request_timeout: Duration,
        masker: &SecretMasker,
    ) -> Result<Client> {
        Self::create_client(&WebProxy::from_env(), request_timeout, masker)
    }
}
