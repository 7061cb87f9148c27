// 🔑 Service-Account Credentials
// Key file loading, OAuth2 JWT-bearer token exchange, secrets TOML rendering

use crate::error::{DotacaoError, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tokio::sync::Mutex;

/// Scopes requested for the ledger: spreadsheet read/write plus its drive
pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_key_type() -> String {
    "service_account".to_string()
}

/// Google service-account key, as downloaded from the cloud console
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default = "default_key_type")]
    pub key_type: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub auth_provider_x509_cert_url: String,
    #[serde(default)]
    pub client_x509_cert_url: String,
}

impl ServiceAccountKey {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            DotacaoError::Credentials(format!("{}: {}", path.display(), e))
        })?;
        serde_json::from_str(&data)
            .map_err(|e| DotacaoError::Credentials(format!("{}: {}", path.display(), e)))
    }

    /// Render as a `[gcp_service_account]` TOML section for the config file.
    pub fn to_secrets_toml(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Secrets<'a> {
            gcp_service_account: &'a ServiceAccountKey,
        }

        toml::to_string(&Secrets {
            gcp_service_account: self,
        })
        .map_err(|e| DotacaoError::Credentials(e.to_string()))
    }
}

// ============================================================================
// TOKEN EXCHANGE
// ============================================================================

#[derive(Debug, Serialize, PartialEq, Eq)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    TOKEN_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Mints and caches bearer tokens for one service account.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> Self {
        Self {
            key,
            http,
            cached: Mutex::new(None),
        }
    }

    /// Auth that hands out `token` until it expires, without any exchange
    #[cfg(test)]
    pub(crate) fn with_token(key: ServiceAccountKey, http: reqwest::Client, token: &str) -> Self {
        Self {
            key,
            http,
            cached: Mutex::new(Some(CachedToken {
                value: token.to_string(),
                expires_at: Utc::now() + Duration::seconds(TOKEN_LIFETIME_SECS),
            })),
        }
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    fn claims(&self, now: DateTime<Utc>) -> Claims {
        let iat = now.timestamp();
        Claims {
            iss: self.key.client_email.clone(),
            scope: SCOPES.join(" "),
            aud: self.key.token_uri.clone(),
            iat,
            exp: iat + TOKEN_LIFETIME_SECS,
        }
    }

    fn sign_assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| DotacaoError::Credentials(format!("private_key: {}", e)))?;

        let mut header = Header::new(Algorithm::RS256);
        if !self.key.private_key_id.is_empty() {
            header.kid = Some(self.key.private_key_id.clone());
        }

        encode(&header, &self.claims(now), &key)
            .map_err(|e| DotacaoError::Credentials(e.to_string()))
    }

    /// Current access token, refreshed shortly before it expires.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now {
                return Ok(token.value.clone());
            }
        }

        let assertion = self.sign_assertion(now)?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DotacaoError::Credentials(format!(
                "token exchange failed ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        tracing::debug!(expires_in = token.expires_in, "access token refreshed");

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + Duration::seconds(token.expires_in),
        });
        Ok(token.access_token)
    }
}
