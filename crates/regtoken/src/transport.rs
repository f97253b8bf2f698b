// HTTP transport for the exchange steps.
//
// `Transport` performs exactly one attempt; `RetryingClient` wraps it with the
// bounded retry policy and the "201 or fail" status rule.

use async_trait::async_trait;
use regtoken_common::constants::GITHUB_V3_MEDIA_TYPE;
use regtoken_common::error::BoxError;
use regtoken_common::{RetrySettings, SecretMasker, TokenError, TokenResult};
use regtoken_sdk::StringUtil;
use reqwest::header::{ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Error bodies longer than this are cut before they are logged or returned.
const MAX_ERROR_BODY: usize = 1024;

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// One authenticated API call.
#[derive(Clone)]
pub struct ApiRequest {
    /// Name of the exchange step issuing the call, used in logs and errors.
    pub step: &'static str,
    pub method: Method,
    pub url: Url,
    /// Authorization scheme keyword, e.g. `Bearer` or `token`.
    pub scheme: &'static str,
    pub credential: String,
}

impl ApiRequest {
    pub fn post(step: &'static str, url: Url, scheme: &'static str, credential: &str) -> Self {
        Self {
            step,
            method: Method::POST,
            url,
            scheme,
            credential: credential.to_string(),
        }
    }

    /// Value of the `Authorization` header: `<scheme> <credential>`.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.scheme, self.credential)
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("step", &self.step)
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("scheme", &self.scheme)
            .field("credential", &StringUtil::redact(&self.credential))
            .finish()
    }
}

/// Status and fully-read body of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    /// `Retry-After` in seconds, when the server sent one.
    pub retry_after: Option<Duration>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Executes a single HTTP attempt. Errors are connection-level failures;
/// any HTTP status, including 4xx/5xx, is a successful `ApiResponse`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, BoxError>;
}

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, BoxError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .header(ACCEPT, GITHUB_V3_MEDIA_TYPE)
            .header(AUTHORIZATION, request.authorization())
            .send()
            .await?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        // Read to completion so the connection goes back to the pool.
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            retry_after,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub wait_min: Duration,
    pub wait_max: Duration,
}

impl RetryPolicy {
    /// 429 and 5xx (except 501 Not Implemented) are worth another attempt.
    pub fn is_retryable_status(status: u16) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            || ((500..=599).contains(&status) && status != StatusCode::NOT_IMPLEMENTED.as_u16())
    }

    /// Whether a connection-level failure is worth another attempt. Builder,
    /// redirect and certificate errors are final.
    pub fn is_retryable_error(error: &BoxError) -> bool {
        if let Some(err) = error.downcast_ref::<reqwest::Error>() {
            if err.is_builder() || err.is_redirect() {
                return false;
            }
        }

        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(&**error);
        while let Some(err) = current {
            if err.to_string().to_ascii_lowercase().contains("certificate") {
                return false;
            }
            current = err.source();
        }
        true
    }

    /// Wait before the attempt following `attempt` (1-based).
    ///
    /// Exponential from `wait_min`, clamped to `[wait_min, wait_max]`. A
    /// server `Retry-After` can lengthen the wait up to `wait_max`.
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let mut wait = self
            .wait_min
            .saturating_mul(1u32 << exponent)
            .clamp(self.wait_min, self.wait_max);

        if let Some(hint) = retry_after {
            wait = wait.max(hint.min(self.wait_max));
        }
        wait
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            wait_min: settings.wait_min,
            wait_max: settings.wait_max.max(settings.wait_min),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

// ---------------------------------------------------------------------------
// RetryingClient
// ---------------------------------------------------------------------------

/// Runs an `ApiRequest` under the retry policy and returns the body of the
/// 201 response.
#[derive(Clone)]
pub struct RetryingClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    masker: SecretMasker,
}

impl RetryingClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, masker: SecretMasker) -> Self {
        Self {
            transport,
            policy,
            masker,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Masker shared with the caller; steps register the credentials they obtain.
    pub fn masker(&self) -> &SecretMasker {
        &self.masker
    }

    /// Execute `request`.
    ///
    /// - 201: the body is returned.
    /// - retryable status or connection error: retried until `max_attempts`.
    /// - anything else, or a retryable status on the last attempt:
    ///   `UnexpectedStatus`. Connection errors that are final or occur on
    ///   the last attempt: `Network`.
    pub async fn execute(&self, request: &ApiRequest) -> TokenResult<Vec<u8>> {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::debug!(
                step = request.step,
                attempt,
                max_attempts,
                "{} {}",
                request.method,
                request.url
            );

            let retry_after = match self.transport.execute(request).await {
                Ok(response) if response.status == StatusCode::CREATED.as_u16() => {
                    return Ok(response.body);
                }
                Ok(response) => {
                    let retryable = RetryPolicy::is_retryable_status(response.status);
                    if !retryable || attempt >= max_attempts {
                        return Err(TokenError::UnexpectedStatus {
                            step: request.step,
                            status: response.status,
                            body: self.error_body(&response.body),
                        });
                    }
                    tracing::warn!(
                        step = request.step,
                        attempt,
                        status = response.status,
                        "Retryable HTTP status"
                    );
                    response.retry_after
                }
                Err(source) => {
                    if !RetryPolicy::is_retryable_error(&source) || attempt >= max_attempts {
                        return Err(TokenError::Network {
                            step: request.step,
                            attempts: attempt,
                            source,
                        });
                    }
                    tracing::warn!(
                        step = request.step,
                        attempt,
                        "Request failed: {}",
                        self.masker.mask_secrets(&source.to_string())
                    );
                    None
                }
            };

            let delay = self.policy.backoff(attempt, retry_after);
            tracing::info!(
                step = request.step,
                "Waiting {}s before attempt {}/{}",
                delay.as_secs(),
                attempt + 1,
                max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn error_body(&self, body: &[u8]) -> String {
        let text = String::from_utf8_lossy(body);
        let trimmed = text.trim();
        let cut: String = trimmed.chars().take(MAX_ERROR_BODY).collect();
        self.masker.mask_secrets(&cut)
    }
}

/// Scripted transport for tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replies with queued outcomes in order and records every request.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<ApiResponse, BoxError>>>,
        pub requests: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn reply(&self, status: u16, body: &str) -> &Self {
            self.replies
                .lock()
                .push_back(Ok(ApiResponse::new(status, body.as_bytes())));
            self
        }

        pub fn reply_with(&self, response: ApiResponse) -> &Self {
            self.replies.lock().push_back(Ok(response));
            self
        }

        pub fn fail(&self, message: &str) -> &Self {
            let err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, message.to_string());
            self.replies.lock().push_back(Err(Box::new(err)));
            self
        }

        pub fn fail_with(&self, err: BoxError) -> &Self {
            self.replies.lock().push_back(Err(err));
            self
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, BoxError> {
            self.requests
                .lock()
                .push((request.url.to_string(), request.authorization()));
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err("no scripted reply left".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedTransport;
    use super::*;
    use regtoken_common::HttpClientFactory;
    use regtoken_sdk::{Package, WebProxy};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn request() -> ApiRequest {
        ApiRequest::post(
            "installation-token",
            Url::parse("https://ghe.example.com/api/v3/app/installations/1/access_tokens").unwrap(),
            "Bearer",
            "eyJ.jwt.sig",
        )
    }

    fn client(transport: Arc<ScriptedTransport>) -> RetryingClient {
        RetryingClient::new(transport, RetryPolicy::default(), SecretMasker::new())
    }

    #[test]
    fn authorization_header_joins_scheme_and_credential() {
        assert_eq!(request().authorization(), "Bearer eyJ.jwt.sig");
        assert!(!format!("{:?}", request()).contains("eyJ.jwt.sig"));
    }

    #[test]
    fn retryable_statuses() {
        assert!(RetryPolicy::is_retryable_status(429));
        assert!(RetryPolicy::is_retryable_status(500));
        assert!(RetryPolicy::is_retryable_status(503));
        assert!(!RetryPolicy::is_retryable_status(501));
        assert!(!RetryPolicy::is_retryable_status(404));
        assert!(!RetryPolicy::is_retryable_status(200));
    }

    #[test]
    fn default_backoff_is_a_fixed_thirty_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 4);
        for attempt in 1..=5 {
            assert_eq!(policy.backoff(attempt, None), Duration::from_secs(30));
        }
    }

    #[test]
    fn backoff_grows_and_honors_retry_after_within_bounds() {
        let policy = RetryPolicy {
            max_attempts: 5,
            wait_min: Duration::from_secs(30),
            wait_max: Duration::from_secs(120),
        };
        assert_eq!(policy.backoff(1, None), Duration::from_secs(30));
        assert_eq!(policy.backoff(2, None), Duration::from_secs(60));
        assert_eq!(policy.backoff(3, None), Duration::from_secs(120));
        assert_eq!(policy.backoff(9, None), Duration::from_secs(120));
        // Retry-After below the floor does not shorten the wait.
        assert_eq!(policy.backoff(1, Some(Duration::from_secs(5))), Duration::from_secs(30));
        assert_eq!(policy.backoff(1, Some(Duration::from_secs(90))), Duration::from_secs(90));
        assert_eq!(policy.backoff(1, Some(Duration::from_secs(900))), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn created_returns_body() {
        let transport = ScriptedTransport::new();
        transport.reply(201, r#"{"token":"abc"}"#);

        let body = client(transport.clone()).execute(&request()).await.unwrap();
        assert_eq!(body, br#"{"token":"abc"}"#);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn other_success_codes_are_fatal() {
        let transport = ScriptedTransport::new();
        transport.reply(200, "{}");

        let err = client(transport.clone()).execute(&request()).await.unwrap_err();
        assert!(matches!(err, TokenError::UnexpectedStatus { status: 200, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_not_retried() {
        let transport = ScriptedTransport::new();
        transport.reply(404, r#"{"message":"Not Found"}"#).reply(201, "{}");

        let err = client(transport.clone()).execute(&request()).await.unwrap_err();
        match err {
            TokenError::UnexpectedStatus { step, status, body } => {
                assert_eq!(step, "installation-token");
                assert_eq!(status, 404);
                assert!(body.contains("Not Found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn two_network_failures_then_success() {
        let transport = ScriptedTransport::new();
        transport
            .fail("connection reset")
            .fail("connection reset")
            .reply(201, "ok");

        let start = tokio::time::Instant::now();
        let body = client(transport.clone()).execute(&request()).await.unwrap();

        assert_eq!(body, b"ok");
        assert_eq!(transport.calls(), 3);
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert!(start.elapsed() < Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn three_network_failures_then_success_on_fourth_attempt() {
        let transport = ScriptedTransport::new();
        transport
            .fail("connection reset")
            .fail("connection reset")
            .fail("connection reset")
            .reply(201, "ok");

        let start = tokio::time::Instant::now();
        let body = client(transport.clone()).execute(&request()).await.unwrap();

        assert_eq!(body, b"ok");
        assert_eq!(transport.calls(), 4);
        assert!(start.elapsed() >= Duration::from_secs(90));
        assert!(start.elapsed() < Duration::from_secs(91));
    }

    #[tokio::test(start_paused = true)]
    async fn fourth_network_failure_is_fatal() {
        let transport = ScriptedTransport::new();
        transport
            .fail("connection reset")
            .fail("connection reset")
            .fail("connection reset")
            .fail("connection reset")
            .reply(201, "never reached");

        let err = client(transport.clone()).execute(&request()).await.unwrap_err();
        match err {
            TokenError::Network { attempts, source, .. } => {
                assert_eq!(attempts, 4);
                assert_eq!(source.to_string(), "connection reset");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_status_on_last_attempt_is_unexpected_status() {
        let transport = ScriptedTransport::new();
        transport
            .reply(502, "")
            .reply(503, "")
            .reply(429, "")
            .reply(500, "boom");

        let err = client(transport.clone()).execute(&request()).await.unwrap_err();
        assert!(matches!(err, TokenError::UnexpectedStatus { status: 500, .. }));
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_is_honored() {
        for status in [429, 503] {
            let transport = ScriptedTransport::new();
            transport
                .reply_with(ApiResponse {
                    status,
                    retry_after: Some(Duration::from_secs(45)),
                    body: Vec::new(),
                })
                .reply(201, "ok");

            let policy = RetryPolicy {
                max_attempts: 3,
                wait_min: Duration::from_secs(30),
                wait_max: Duration::from_secs(60),
            };
            let start = tokio::time::Instant::now();
            RetryingClient::new(transport.clone(), policy, SecretMasker::new())
                .execute(&request())
                .await
                .unwrap();
            assert_eq!(transport.calls(), 2, "status {status}");
            assert!(start.elapsed() >= Duration::from_secs(45), "status {status}");
            assert!(start.elapsed() < Duration::from_secs(46), "status {status}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn certificate_failure_is_not_retried() {
        let transport = ScriptedTransport::new();
        transport
            .fail("invalid peer certificate: UnknownIssuer")
            .reply(201, "never reached");

        let err = client(transport.clone()).execute(&request()).await.unwrap_err();
        assert!(matches!(err, TokenError::Network { attempts: 1, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn request_build_error_is_not_retried() {
        let build_error = Client::new().get("not a url").build().unwrap_err();
        assert!(build_error.is_builder());

        let transport = ScriptedTransport::new();
        transport
            .fail_with(Box::new(build_error))
            .reply(201, "never reached");

        let err = client(transport.clone()).execute(&request()).await.unwrap_err();
        assert!(matches!(err, TokenError::Network { attempts: 1, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn plain_connection_errors_are_retryable() {
        let err: BoxError = Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert!(RetryPolicy::is_retryable_error(&err));
    }

    #[tokio::test(start_paused = true)]
    async fn error_body_is_masked() {
        let masker = SecretMasker::new();
        masker.add_value("ghs_leakedtokenvalue");
        let transport = ScriptedTransport::new();
        transport.reply(401, "bad credentials for ghs_leakedtokenvalue");

        let err = RetryingClient::new(transport, RetryPolicy::default(), masker)
            .execute(&request())
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("ghs_leakedtokenvalue"));
        assert!(err.to_string().contains("***"));
    }

    /// Serves one canned HTTP response on a loopback socket and hands back the
    /// raw request text.
    async fn serve_once(response: &'static str) -> (Url, tokio::task::JoinHandle<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut received = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
                if n == 0 || received.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&received).to_string()
        });
        let url = Url::parse(&format!("http://{addr}/api/v3/app/installations/7/access_tokens"))
            .unwrap();
        (url, handle)
    }

    #[tokio::test]
    async fn reqwest_transport_sends_pinned_headers() {
        let (url, server) = serve_once(
            "HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nRetry-After: 12\r\nContent-Length: 15\r\nConnection: close\r\n\r\n{\"token\":\"abc\"}",
        )
        .await;

        let client = HttpClientFactory::create_client(
            &WebProxy::from_values(None, None, None),
            Duration::from_secs(5),
            &SecretMasker::new(),
        )
        .unwrap();
        let transport = ReqwestTransport::new(client);
        let request = ApiRequest::post("installation-token", url, "Bearer", "eyJ.jwt.sig");

        let response = transport.execute(&request).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.retry_after, Some(Duration::from_secs(12)));
        assert_eq!(response.body, br#"{"token":"abc"}"#);

        let raw = server.await.unwrap().to_lowercase();
        assert!(raw.starts_with("post /api/v3/app/installations/7/access_tokens "));
        assert!(raw.contains("accept: application/vnd.github.v3+json"));
        assert!(raw.contains("authorization: bearer eyj.jwt.sig"));
        let user_agent = format!("user-agent: {}", Package::user_agent()).to_lowercase();
        assert!(raw.contains(&user_agent), "missing {user_agent} in {raw}");
    }
}
