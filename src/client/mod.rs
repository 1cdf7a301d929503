//! MongoDB Atlas Administration API client.
//!
//! [`AtlasClient`] sends JSON requests to the versioned v2 API, authenticates
//! them with whichever scheme the credentials select, and retries idempotent
//! requests that fail transiently.

pub mod auth;
pub mod user_agent;
pub mod wait;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT, WWW_AUTHENTICATE};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Credentials;
use crate::error::{ApiError, ProviderError};

pub use auth::{request_access_token, AccessToken, Auth, DigestChallenge};
pub use user_agent::UserAgentExtra;
pub use wait::{retry_while, wait_for_state, Pacing, StateChangeConf};

/// Media type selecting the API version this provider speaks.
pub const ATLAS_MEDIA_TYPE: &str = "application/vnd.atlas.2023-01-01+json";

/// Path prefix of the v2 API.
pub const API_PREFIX: &str = "/api/atlas/v2";

/// User-Agent sent before any per-operation suffix.
pub fn default_user_agent() -> String {
    format!("hemmer-provider-atlas/{}", env!("CARGO_PKG_VERSION"))
}

/// Retry behavior for transient failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero disables retries.
    pub max_retries: u32,
    /// Delay before the first retry, doubled on every attempt.
    pub initial_delay: Duration,
    /// Upper bound on the backoff delay.
    pub max_delay: Duration,
    /// Upper bound on a server supplied `Retry-After`.
    pub max_retry_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_retry_after: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Exponential backoff: 100ms, 200ms, 400ms, ... capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let capped_attempt = attempt.min(20);
        let delay = self.initial_delay.saturating_mul(1u32 << capped_attempt);
        delay.min(self.max_delay)
    }

    fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(after) => after.min(self.max_retry_after),
            None => self.backoff_delay(attempt),
        }
    }
}

/// Statuses retried on idempotent requests.
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

struct DigestState {
    challenge: DigestChallenge,
    nc: u32,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    auth: Auth,
    digest: Mutex<Option<DigestState>>,
    retry: RetryConfig,
}

/// Client for the Atlas Administration API.
///
/// Cloning is cheap; clones share the connection pool, the token cache and
/// the digest nonce.
#[derive(Clone)]
pub struct AtlasClient {
    inner: Arc<Inner>,
    extra: UserAgentExtra,
}

impl std::fmt::Debug for AtlasClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasClient")
            .field("base_url", &self.inner.base_url)
            .field("auth", &self.inner.auth)
            .field("extra", &self.extra)
            .finish()
    }
}

impl AtlasClient {
    /// Build a client for `base_url` authenticating with `credentials`.
    pub fn new(base_url: &str, credentials: &Credentials) -> Result<Self, ProviderError> {
        Self::with_auth(base_url, Auth::from_credentials(credentials))
    }

    /// Build a client with an explicit auth scheme.
    pub fn with_auth(base_url: &str, auth: Auth) -> Result<Self, ProviderError> {
        Url::parse(base_url)
            .map_err(|e| ProviderError::Configuration(format!("invalid base_url {:?}: {}", base_url, e)))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                auth,
                digest: Mutex::new(None),
                retry: RetryConfig::default(),
            }),
            extra: UserAgentExtra::default(),
        })
    }

    /// Replace the retry policy. Must be called before the client is cloned.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.retry = retry;
        }
        self
    }

    /// A handle whose requests carry `extra` in their User-Agent.
    pub fn scoped(&self, extra: &UserAgentExtra) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            extra: self.extra.combine(extra),
        }
    }

    /// The management API base URL.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// The User-Agent header this handle sends.
    pub fn user_agent(&self) -> String {
        self.extra.to_header_value(&default_user_agent())
    }

    /// `GET` a v2 API path.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let value = self.request(Method::GET, path, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `POST` a JSON body.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let value = self.request(Method::POST, path, Some(&body)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `PATCH` a JSON body.
    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let value = self.request(Method::PATCH, path, Some(&body)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `DELETE` a v2 API path, ignoring any response body.
    pub async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        self.request(Method::DELETE, path, None).await.map(|_| ())
    }

    /// Send a request and return the decoded body, `null` when empty.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ProviderError> {
        let url = Url::parse(&format!("{}{}{}", self.inner.base_url, API_PREFIX, path))
            .map_err(|e| ProviderError::InvalidRequest(format!("invalid path {:?}: {}", path, e)))?;

        let mut builder = self
            .inner
            .http
            .request(method.clone(), url.clone())
            .header(ACCEPT, ATLAS_MEDIA_TYPE)
            .header(USER_AGENT, self.user_agent());
        if let Some(body) = body {
            builder = builder
                .header(CONTENT_TYPE, ATLAS_MEDIA_TYPE)
                .body(serde_json::to_vec(body)?);
        }

        let retry = &self.inner.retry;
        let max_retries = if method == Method::POST { 0 } else { retry.max_retries };
        let started = Instant::now();

        let mut attempt = 0;
        loop {
            let response = self.send_authenticated(&builder, &method, &url).await?;
            let status = response.status().as_u16();
            debug!(
                method = %method,
                path = %url.path(),
                status,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "atlas request"
            );

            if is_retryable_status(status) && attempt < max_retries {
                let delay = retry.delay_for(attempt, parse_retry_after(response.headers()));
                warn!(
                    method = %method,
                    path = %url.path(),
                    status,
                    "request failed (attempt {}/{}), retrying in {:.1}s",
                    attempt + 1,
                    max_retries,
                    delay.as_secs_f32()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let text = response.text().await?;
            if !(200..300).contains(&status) {
                let err = ApiError::from_response(status, &text);
                if status == 404 {
                    debug!(method = %method, path = %url.path(), code = %err.error_code, "not found");
                } else {
                    warn!(method = %method, path = %url.path(), status, code = %err.error_code, detail = %err.detail, "atlas request failed");
                }
                return Err(err.into());
            }
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }
    }

    async fn send_authenticated(
        &self,
        builder: &RequestBuilder,
        method: &Method,
        url: &Url,
    ) -> Result<Response, ProviderError> {
        let clone = || {
            builder
                .try_clone()
                .ok_or_else(|| ProviderError::Internal("request body cannot be replayed".to_string()))
        };

        match &self.inner.auth {
            Auth::None => Ok(clone()?.send().await?),
            Auth::Bearer(token) => Ok(clone()?.bearer_auth(token).send().await?),
            Auth::ServiceAccount(account) => {
                let token = account.token(&self.inner.http, &self.inner.base_url).await?;
                Ok(clone()?.bearer_auth(token).send().await?)
            }
            Auth::Digest { username, password } => {
                let uri = match url.query() {
                    Some(q) => format!("{}?{}", url.path(), q),
                    None => url.path().to_string(),
                };

                let mut request = clone()?;
                if let Some(header) = self.next_digest_header(method, &uri, username, password)? {
                    request = request.header(AUTHORIZATION, header);
                }
                let response = request.send().await?;
                if response.status().as_u16() != 401 {
                    return Ok(response);
                }

                let Some(challenge) = response
                    .headers()
                    .get(WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(DigestChallenge::parse)
                else {
                    return Ok(response);
                };
                debug!(realm = %challenge.realm, "answering digest challenge");
                self.store_challenge(challenge);

                let header = self
                    .next_digest_header(method, &uri, username, password)?
                    .ok_or_else(|| ProviderError::Internal("digest challenge missing".to_string()))?;
                Ok(clone()?.header(AUTHORIZATION, header).send().await?)
            }
        }
    }

    fn store_challenge(&self, challenge: DigestChallenge) {
        let mut state = self.inner.digest.lock().unwrap_or_else(|e| e.into_inner());
        *state = Some(DigestState { challenge, nc: 0 });
    }

    fn next_digest_header(
        &self,
        method: &Method,
        uri: &str,
        username: &str,
        password: &str,
    ) -> Result<Option<String>, ProviderError> {
        let mut state = self.inner.digest.lock().unwrap_or_else(|e| e.into_inner());
        let Some(state) = state.as_mut() else {
            return Ok(None);
        };
        state.nc += 1;
        state
            .challenge
            .authorization(method.as_str(), uri, username, password, &auth::new_cnonce(), state.nc)
            .map(Some)
    }
}
