//! Request authentication.
//!
//! Three schemes are supported: a bearer token used as is, a service account
//! whose client credentials are exchanged for a bearer token, and programmatic
//! API keys sent with HTTP Digest (RFC 2617, MD5, `qop=auth`).

use std::time::{Duration, Instant};

use md5::{Digest as _, Md5};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{AuthMethod, Credentials};
use crate::error::{ApiError, ProviderError};

/// Path of the OAuth2 token endpoint, relative to the base URL.
pub const TOKEN_PATH: &str = "/api/oauth/token";

/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// A token issued for a service account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    /// The bearer token.
    pub access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
    /// Usually `Bearer`.
    #[serde(default)]
    pub token_type: String,
}

/// Exchange service account client credentials for a bearer token.
pub async fn request_access_token(
    http: &reqwest::Client,
    base_url: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<AccessToken, ProviderError> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), TOKEN_PATH);
    debug!(url = %url, client_id, "requesting service account token");

    let response = http
        .post(&url)
        .basic_auth(client_id, Some(client_secret))
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await?;

    let status = response.status().as_u16();
    let body = response.text().await?;
    if !(200..300).contains(&status) {
        return Err(ApiError::from_response(status, &body).into());
    }
    let token: AccessToken = serde_json::from_str(&body)?;
    if token.access_token.is_empty() {
        return Err(ProviderError::Configuration(
            "token endpoint returned an empty access token".to_string(),
        ));
    }
    Ok(token)
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// A service account with a cached token.
pub struct ServiceAccount {
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    /// Create a service account with an empty token cache.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            cached: Mutex::new(None),
        }
    }

    /// A valid token, fetched when the cached one is missing or about to expire.
    pub async fn token(&self, http: &reqwest::Client, base_url: &str) -> Result<String, ProviderError> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if Instant::now() < entry.refresh_at {
                return Ok(entry.token.clone());
            }
        }

        let fresh = request_access_token(http, base_url, &self.client_id, &self.client_secret).await?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            token: fresh.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(fresh.access_token)
    }
}

/// How a client authenticates.
pub enum Auth {
    /// No credentials.
    None,
    /// `Authorization: Bearer <token>`.
    Bearer(String),
    /// Client credentials exchanged for a bearer token.
    ServiceAccount(ServiceAccount),
    /// HTTP Digest with a programmatic API key.
    Digest {
        /// Public key, the digest username.
        username: String,
        /// Private key, the digest password.
        password: String,
    },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Bearer(_) => f.debug_tuple("Bearer").field(&"***").finish(),
            Auth::ServiceAccount(account) => f.debug_tuple("ServiceAccount").field(account).finish(),
            Auth::Digest { username, .. } => f
                .debug_struct("Digest")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

impl Auth {
    /// Pick the scheme for `credentials`.
    pub fn from_credentials(credentials: &Credentials) -> Self {
        match credentials.auth_method() {
            AuthMethod::AccessToken => Auth::Bearer(credentials.access_token.clone()),
            AuthMethod::ServiceAccount => Auth::ServiceAccount(ServiceAccount::new(
                credentials.client_id.clone(),
                credentials.client_secret.clone(),
            )),
            AuthMethod::Digest => Auth::Digest {
                username: credentials.public_key.clone(),
                password: credentials.private_key.clone(),
            },
            AuthMethod::Unknown => Auth::None,
        }
    }
}

/// A parsed `WWW-Authenticate: Digest ...` challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestChallenge {
    /// Protection space.
    pub realm: String,
    /// Server nonce.
    pub nonce: String,
    /// Opaque value echoed back verbatim.
    pub opaque: Option<String>,
    /// Offered quality of protection values.
    pub qop: Option<String>,
    /// Hash algorithm, only MD5 is supported.
    pub algorithm: Option<String>,
}

impl DigestChallenge {
    /// Parse a challenge header. Returns `None` for non-digest schemes.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let mut challenge = DigestChallenge::default();
        for part in split_params(params) {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "realm" => challenge.realm = value,
                "nonce" => challenge.nonce = value,
                "opaque" => challenge.opaque = Some(value),
                "qop" => challenge.qop = Some(value),
                "algorithm" => challenge.algorithm = Some(value),
                _ => {}
            }
        }

        if challenge.nonce.is_empty() {
            return None;
        }
        Some(challenge)
    }

    fn supports_auth_qop(&self) -> bool {
        self.qop
            .as_deref()
            .map(|q| q.split(',').any(|v| v.trim() == "auth"))
            .unwrap_or(false)
    }

    /// The `Authorization` header value answering this challenge.
    pub fn authorization(
        &self,
        method: &str,
        uri: &str,
        username: &str,
        password: &str,
        cnonce: &str,
        nc: u32,
    ) -> Result<String, ProviderError> {
        if let Some(algorithm) = &self.algorithm {
            if !algorithm.eq_ignore_ascii_case("md5") {
                return Err(ProviderError::Configuration(format!(
                    "unsupported digest algorithm {}",
                    algorithm
                )));
            }
        }

        let ha1 = md5_hex(&format!("{}:{}:{}", username, self.realm, password));
        let ha2 = md5_hex(&format!("{}:{}", method, uri));
        let nc = format!("{:08x}", nc);

        let mut header = format!(
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{}""#,
            username, self.realm, self.nonce, uri
        );
        if self.supports_auth_qop() {
            let response = md5_hex(&format!("{}:{}:{}:{}:auth:{}", ha1, self.nonce, nc, cnonce, ha2));
            header.push_str(&format!(
                r#", qop=auth, nc={}, cnonce="{}", response="{}""#,
                nc, cnonce, response
            ));
        } else {
            let response = md5_hex(&format!("{}:{}:{}", ha1, self.nonce, ha2));
            header.push_str(&format!(r#", response="{}""#, response));
        }
        if let Some(algorithm) = &self.algorithm {
            header.push_str(&format!(", algorithm={}", algorithm));
        }
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(r#", opaque="{}""#, opaque));
        }
        Ok(header)
    }
}

/// A fresh client nonce.
pub fn new_cnonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Split on commas that are not inside double quotes.
fn split_params(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in params.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(params[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = params[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}
