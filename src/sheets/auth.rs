//! Google OAuth credentials for the Sheets client
//!
//! Loads a previously authorized token and renews it with the refresh token.
//! Obtaining the first token (consent flow) is done out of band.

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::ServiceError;

const SERVICE: &str = "google-oauth";

/// Refresh this long before the recorded expiry
const EXPIRY_MARGIN_MS: i64 = 60_000;

#[derive(Debug, Clone, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
}

/// Token file as written by the Google client libraries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Expiry as unix milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
}

impl StoredToken {
    fn is_expired(&self, now_ms: i64) -> bool {
        self.expiry_date
            .is_some_and(|expiry| now_ms >= expiry - EXPIRY_MARGIN_MS)
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
    token_type: Option<String>,
}

pub struct GoogleAuth {
    client: Client,
    secret: ClientSecret,
    token_url: String,
    token_path: PathBuf,
    token: RwLock<StoredToken>,
}

impl GoogleAuth {
    /// Load client secret and stored token; both files must exist
    pub fn load(
        client: Client,
        credentials_path: &Path,
        token_path: &Path,
        token_url: &str,
    ) -> Result<Self> {
        let raw = std::fs::read_to_string(credentials_path).with_context(|| {
            format!("Failed to read Google credentials {}", credentials_path.display())
        })?;
        let file: ClientSecretFile =
            serde_json::from_str(&raw).context("Failed to parse Google credentials")?;
        let secret = file
            .installed
            .or(file.web)
            .context("Google credentials have neither an `installed` nor a `web` section")?;

        let raw = std::fs::read_to_string(token_path).with_context(|| {
            format!(
                "Failed to read Google token {} (authorize the app first)",
                token_path.display()
            )
        })?;
        let token: StoredToken =
            serde_json::from_str(&raw).context("Failed to parse Google token")?;

        Ok(Self::new(client, secret, token, token_path.to_path_buf(), token_url))
    }

    pub fn new(
        client: Client,
        secret: ClientSecret,
        token: StoredToken,
        token_path: PathBuf,
        token_url: &str,
    ) -> Self {
        Self {
            client,
            secret,
            token_url: token_url.to_string(),
            token_path,
            token: RwLock::new(token),
        }
    }

    /// Current access token, renewed first when it is known to be expired
    pub async fn access_token(&self) -> Result<String, ServiceError> {
        {
            let token = self.token.read().await;
            if !token.is_expired(Utc::now().timestamp_millis()) {
                return Ok(token.access_token.clone());
            }
        }
        self.refresh().await?;
        Ok(self.token.read().await.access_token.clone())
    }

    pub async fn refresh(&self) -> Result<(), ServiceError> {
        let refresh_token = self
            .token
            .read()
            .await
            .refresh_token
            .clone()
            .ok_or_else(|| ServiceError::Auth {
                service: SERVICE,
                message: "stored token has no refresh_token".to_string(),
            })?;

        let params = [
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(ServiceError::transport(SERVICE))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Http {
                service: SERVICE,
                status: status.as_u16(),
                reason: None,
                retry_after: None,
                message,
            });
        }

        let body: RefreshResponse = response.json().await.map_err(ServiceError::decode(SERVICE))?;

        let snapshot = {
            let mut token = self.token.write().await;
            token.access_token = body.access_token;
            if body.refresh_token.is_some() {
                token.refresh_token = body.refresh_token;
            }
            if body.scope.is_some() {
                token.scope = body.scope;
            }
            if body.token_type.is_some() {
                token.token_type = body.token_type;
            }
            token.expiry_date = body
                .expires_in
                .map(|secs| Utc::now().timestamp_millis() + secs * 1000);
            token.clone()
        };

        info!("🔑 Google access token renewed");

        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => {
                if let Err(e) = tokio::fs::write(&self.token_path, json).await {
                    warn!(path = %self.token_path.display(), error = %e, "Failed to persist renewed token");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize renewed token"),
        }

        Ok(())
    }
}
