// crates/network/src/client.rs
//! HTTP client wrapper with resilience

use crate::error::{NetworkError, NetworkResult};
use bookplayer_resilience::{with_retry, RetryPolicy};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, Url};
use std::time::Duration;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Maximum redirects to follow
    pub max_redirects: usize,
    /// Retry policy
    pub retry_policy: Option<RetryPolicy>,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("BookPlayer/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 10,
            retry_policy: Some(RetryPolicy::new(3).with_initial_delay(Duration::from_millis(100))),
            auth_token: None,
        }
    }
}

/// HTTP client with resilience features
#[derive(Clone)]
pub struct Client {
    inner: ReqwestClient,
    config: ClientConfig,
}

impl Client {
    /// Creates a new client with default configuration
    pub fn new() -> NetworkResult<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> NetworkResult<Self> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(NetworkError::Http)?;

        Ok(Self {
            inner: client,
            config,
        })
    }

    /// Returns the active configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Starts a request, attaching the bearer token when configured
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.inner.request(method, url);
        match &self.config.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Performs a GET request
    pub async fn get(&self, url: &str) -> NetworkResult<Response> {
        let url = Url::parse(url).map_err(|e| NetworkError::InvalidUrl(e.to_string()))?;
        self.send(|| self.request(Method::GET, url.clone())).await
    }

    /// Sends the request built by `build`, retrying retryable failures
    ///
    /// `build` is called once per attempt. Non-success statuses become
    /// [`NetworkError::Status`] carrying the response body as message.
    pub async fn send<F>(&self, build: F) -> NetworkResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let single_attempt = RetryPolicy::new(1);
        let policy = self.config.retry_policy.as_ref().unwrap_or(&single_attempt);
        let build = &build;

        with_retry(policy, NetworkError::is_retryable, || async move {
            let response = build().send().await.map_err(|e| {
                if e.is_timeout() {
                    NetworkError::Timeout
                } else {
                    NetworkError::Http(e)
                }
            })?;
            Self::check_status(response).await
        })
        .await
    }

    async fn check_status(response: Response) -> NetworkResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("Unknown").to_string()
        } else {
            body
        };
        Err(NetworkError::Status {
            status: status.as_u16(),
            message,
        })
    }
}
