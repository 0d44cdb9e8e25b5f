//! Access tokens for the Google APIs from a service-account key file,
//! using the OAuth 2.0 JWT bearer grant.

use crate::publish::PublishError;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

const SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens this close to expiry are minted again.
const REFRESH_MARGIN_SECS: i64 = 60;

/// The fields of a downloaded service-account JSON key that the grant needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl ServiceAccountKey {
    pub async fn load(path: &Path) -> Result<Self, PublishError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            PublishError::Auth(format!("cannot read service account key {}: {e}", path.display()))
        })?;
        Self::parse(&content)
            .map_err(|e| PublishError::Auth(format!("{}: {e}", path.display())))
    }

    pub fn parse(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("invalid service account key: {e}"))
    }

    /// Signed RS256 assertion valid for one hour from `issued_at` (unix seconds).
    pub fn assertion(&self, issued_at: i64) -> Result<String, PublishError> {
        let claims = Claims {
            iss: &self.client_email,
            scope: SCOPES,
            aud: &self.token_uri,
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| PublishError::Auth(format!("unusable private key: {e}")))?;
        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| PublishError::Auth(format!("cannot sign assertion: {e}")))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    value: String,
    expires_at: i64,
}

/// Hands out bearer tokens, minting and caching them from the key file.
///
/// A non-empty `override_env` variable short-circuits the key file.
pub struct GoogleAuth {
    client: reqwest::Client,
    override_env: String,
    key_file: PathBuf,
    cached: Mutex<Option<CachedToken>>,
}

impl GoogleAuth {
    pub fn new(
        client: reqwest::Client,
        override_env: impl Into<String>,
        key_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            override_env: override_env.into(),
            key_file: key_file.into(),
            cached: Mutex::new(None),
        }
    }

    fn override_token(&self) -> Option<String> {
        std::env::var(&self.override_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
    }

    pub async fn access_token(&self) -> Result<String, PublishError> {
        if let Some(token) = self.override_token() {
            debug!("Using access token from {}", self.override_env);
            return Ok(token);
        }

        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached
            .as_ref()
            .filter(|token| token.expires_at - REFRESH_MARGIN_SECS > now)
        {
            return Ok(token.value.clone());
        }

        let key = ServiceAccountKey::load(&self.key_file).await?;
        let assertion = key.assertion(now)?;
        let response = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Auth(format!(
                "token exchange for {} returned {status}: {body}",
                key.client_email
            )));
        }
        let token: TokenResponse = response.json().await?;
        info!(
            "Obtained access token for {} (expires in {}s)",
            key.client_email, token.expires_in
        );
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + token.expires_in,
        });
        Ok(token.access_token)
    }
}
