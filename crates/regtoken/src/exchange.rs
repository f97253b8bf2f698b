// Exchange steps: each turns one credential into the next by calling the
// GitHub REST API through a `RetryingClient`.

use async_trait::async_trait;
use chrono::Utc;
use regtoken_common::{DecodeMode, RunnerScope, TokenError, TokenResult};
use serde::de::DeserializeOwned;
use url::Url;

use crate::credentials::{AppAssertion, Credential, InstallationToken, RegistrationToken};
use crate::transport::{ApiRequest, RetryingClient};

/// A named step of the exchange chain, consuming the previous step's output.
#[async_trait]
pub trait ExchangeStep: Send + Sync {
    type Input: Send + 'static;
    type Output: Send + 'static;

    fn name(&self) -> &'static str;

    /// Names of every step this value runs, in order.
    fn names(&self) -> Vec<&'static str> {
        vec![self.name()]
    }

    async fn run(&self, client: &RetryingClient, input: Self::Input) -> TokenResult<Self::Output>;
}

/// Runs `first`, then feeds its output to `second`. A failure in `first`
/// means `second` is never attempted.
pub struct Then<A, B> {
    first: A,
    second: B,
}

#[async_trait]
impl<A, B> ExchangeStep for Then<A, B>
where
    A: ExchangeStep,
    B: ExchangeStep<Input = A::Output>,
{
    type Input = A::Input;
    type Output = B::Output;

    fn name(&self) -> &'static str {
        self.second.name()
    }

    fn names(&self) -> Vec<&'static str> {
        let mut names = self.first.names();
        names.extend(self.second.names());
        names
    }

    async fn run(&self, client: &RetryingClient, input: Self::Input) -> TokenResult<Self::Output> {
        let intermediate = self.first.run(client, input).await?;
        self.second.run(client, intermediate).await
    }
}

pub trait ExchangeStepExt: ExchangeStep + Sized {
    fn then<B>(self, next: B) -> Then<Self, B>
    where
        B: ExchangeStep<Input = Self::Output>,
    {
        Then {
            first: self,
            second: next,
        }
    }
}

impl<T: ExchangeStep + Sized> ExchangeStepExt for T {}

// ---------------------------------------------------------------------------
// Installation access token
// ---------------------------------------------------------------------------

/// `POST /app/installations/{id}/access_tokens`, authorized with the App JWT.
pub struct InstallationTokenStep {
    api_base: Url,
    installation_id: u64,
    decode_mode: DecodeMode,
}

impl InstallationTokenStep {
    pub const NAME: &'static str = "installation-token";

    pub fn new(api_base: Url, installation_id: u64, decode_mode: DecodeMode) -> Self {
        Self {
            api_base,
            installation_id,
            decode_mode,
        }
    }

    pub fn url(&self) -> TokenResult<Url> {
        let id = self.installation_id.to_string();
        endpoint(
            &self.api_base,
            &["app", "installations", id.as_str(), "access_tokens"],
        )
    }
}

#[async_trait]
impl ExchangeStep for InstallationTokenStep {
    type Input = AppAssertion;
    type Output = InstallationToken;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, client: &RetryingClient, assertion: AppAssertion) -> TokenResult<InstallationToken> {
        let request = ApiRequest::post(
            Self::NAME,
            self.url()?,
            assertion.scheme(),
            assertion.secret(),
        );
        let body = client.execute(&request).await?;

        let token: InstallationToken = decode_body(Self::NAME, &body, self.decode_mode)?;
        client.masker().add_value(token.secret());
        check_issued(Self::NAME, &token, self.decode_mode)?;

        if token.permissions.organization_self_hosted_runners.is_none()
            && token.permissions.administration.is_none()
            && !token.secret().is_empty()
        {
            tracing::warn!(
                step = Self::NAME,
                "Installation token grants no runner administration permission; registration may be rejected"
            );
        }

        tracing::info!(
            step = Self::NAME,
            installation_id = self.installation_id,
            repository_selection = token.repository_selection.as_deref().unwrap_or("-"),
            "Obtained installation token {}",
            token.redacted()
        );
        Ok(token)
    }
}

// ---------------------------------------------------------------------------
// Runner registration token
// ---------------------------------------------------------------------------

/// `POST /orgs/{org}/actions/runners/registration-token` (or the repository
/// variant), authorized with the installation token.
pub struct RegistrationTokenStep {
    api_base: Url,
    scope: RunnerScope,
    decode_mode: DecodeMode,
}

impl RegistrationTokenStep {
    pub const NAME: &'static str = "registration-token";

    pub fn new(api_base: Url, scope: RunnerScope, decode_mode: DecodeMode) -> Self {
        Self {
            api_base,
            scope,
            decode_mode,
        }
    }

    pub fn url(&self) -> TokenResult<Url> {
        endpoint(&self.api_base, &self.scope.registration_token_segments())
    }
}

#[async_trait]
impl ExchangeStep for RegistrationTokenStep {
    type Input = InstallationToken;
    type Output = RegistrationToken;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(
        &self,
        client: &RetryingClient,
        installation: InstallationToken,
    ) -> TokenResult<RegistrationToken> {
        let request = ApiRequest::post(
            Self::NAME,
            self.url()?,
            installation.scheme(),
            installation.secret(),
        );
        let body = client.execute(&request).await?;

        let token: RegistrationToken = decode_body(Self::NAME, &body, self.decode_mode)?;
        client.masker().add_value(token.secret());
        check_issued(Self::NAME, &token, self.decode_mode)?;

        tracing::info!(
            step = Self::NAME,
            scope = %self.scope,
            "Obtained runner registration token {}",
            token.redacted()
        );
        Ok(token)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Append percent-encoded path segments to the API base.
fn endpoint(api_base: &Url, segments: &[&str]) -> TokenResult<Url> {
    let mut url = api_base.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| TokenError::InvalidUrl {
            url: api_base.to_string(),
            source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
        })?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

/// Decode a 201 body. In lenient mode a decode failure yields the default
/// (empty) credential instead of an error.
fn decode_body<T>(step: &'static str, body: &[u8], mode: DecodeMode) -> TokenResult<T>
where
    T: DeserializeOwned + Default,
{
    match serde_json::from_slice(body) {
        Ok(value) => Ok(value),
        Err(source) => match mode {
            DecodeMode::Strict => Err(TokenError::Decode { step, source }),
            DecodeMode::Lenient => {
                tracing::warn!(
                    step,
                    error = %source,
                    "Ignoring undecodable response body, continuing with an empty credential"
                );
                Ok(T::default())
            }
        },
    }
}

/// Reject empty or already-expired credentials in strict mode.
fn check_issued<C: Credential>(step: &'static str, credential: &C, mode: DecodeMode) -> TokenResult<()> {
    if credential.secret().is_empty() {
        return match mode {
            DecodeMode::Strict => Err(TokenError::InvalidCredential {
                step,
                reason: "response contained an empty token".into(),
            }),
            DecodeMode::Lenient => {
                tracing::warn!(step, "Response contained an empty token");
                Ok(())
            }
        };
    }

    if let Some(expires_at) = credential.expires_at() {
        let remaining = expires_at - Utc::now();
        if remaining <= chrono::Duration::zero() && mode == DecodeMode::Strict {
            return Err(TokenError::InvalidCredential {
                step,
                reason: format!("token already expired at {}", expires_at.to_rfc3339()),
            });
        }
        tracing::debug!(step, expires_in_secs = remaining.num_seconds(), "Credential lifetime");
    }

    Ok(())
}
