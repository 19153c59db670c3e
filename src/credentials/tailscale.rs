use crate::app_config::Tailscale;
use crate::credentials::CredentialError;
use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::{Client, Response, header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::{Debug, Formatter};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Tailscale limits key descriptions to 50 characters.
const MAX_DESCRIPTION_LEN: usize = 50;
const JOIN_KEY_PREFIX: &str = "tskey-auth-";

#[derive(Clone, Deserialize)]
pub struct JoinKey {
    id: String,
    key: String,
}

impl JoinKey {
    pub fn new(id: impl Into<String>, key: impl Into<String>) -> Self {
        JoinKey {
            id: id.into(),
            key: key.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Debug for JoinKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinKey").field("id", &self.id).field("key", &"***").finish()
    }
}

#[async_trait]
pub trait JoinKeyIssuer: Debug + Send + Sync {
    async fn create_join_key(&self, description: &str) -> Result<JoinKey, CredentialError>;

    async fn revoke_join_key(&self, key_id: &str) -> Result<(), CredentialError>;
}

pub fn new_client(config: &Tailscale) -> Result<Client, CredentialError> {
    if config.tailnet().trim().is_empty() {
        return Err(CredentialError::Config("no tailnet configured".to_string()));
    }
    if config.api_key().expose().trim().is_empty() {
        return Err(CredentialError::Config("no Tailscale API key configured".to_string()));
    }

    let mut headers = header::HeaderMap::new();
    let mut authorization = HeaderValue::from_str(&format!("Bearer {}", config.api_key().expose()))
        .map_err(|e| CredentialError::Config(format!("invalid Tailscale API key: {}", e)))?;
    authorization.set_sensitive(true);
    headers.insert(header::AUTHORIZATION, authorization);

    let client = Client::builder()
        .default_headers(headers)
        .timeout(config.request_timeout())
        .build()
        .map_err(CredentialError::from)?;
    Ok(client)
}

#[derive(Debug, Clone)]
pub struct TailscaleClient {
    client: Client,
    keys_url: String,
    tag: String,
    key_expiry: Duration,
}

impl TailscaleClient {
    pub fn new(client: Client, config: &Tailscale) -> Self {
        TailscaleClient {
            client,
            keys_url: format!("{}/api/v2/tailnet/{}/keys", config.api_url(), config.tailnet()),
            tag: config.tag().to_string(),
            key_expiry: config.key_expiry(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateKeyRequest<'a> {
    capabilities: serde_json::Value,
    expiry_seconds: u64,
    description: &'a str,
}

#[async_trait]
impl JoinKeyIssuer for TailscaleClient {
    #[instrument(skip(self))]
    async fn create_join_key(&self, description: &str) -> Result<JoinKey, CredentialError> {
        debug!("🔗 Requesting join key...");

        let description: String = description.chars().take(MAX_DESCRIPTION_LEN).collect();
        let body = CreateKeyRequest {
            capabilities: json!({
                "devices": {
                    "create": {
                        "reusable": false,
                        "ephemeral": false,
                        "preauthorized": true,
                        "tags": [self.tag],
                    }
                }
            }),
            expiry_seconds: self.key_expiry.as_secs(),
            description: &description,
        };

        let response = self.client.post(&self.keys_url).json(&body).send().await?;
        let join_key: JoinKey = ensure_success(response).await?.json().await?;

        if !join_key.key.starts_with(JOIN_KEY_PREFIX) {
            if let Err(e) = self.revoke_join_key(&join_key.id).await {
                warn!(key_id = join_key.id, "⚠️ Unable to revoke join key of the wrong kind: {}", e);
            }
            return Err(CredentialError::Upstream {
                status: None,
                body: format!("join key {} has an unexpected format", join_key.id),
            });
        }

        info!(key_id = join_key.id, "🔗 Requesting join key... OK");
        Ok(join_key)
    }

    #[instrument(skip(self))]
    async fn revoke_join_key(&self, key_id: &str) -> Result<(), CredentialError> {
        let response = self.client.delete(format!("{}/{}", self.keys_url, key_id)).send().await?;
        ensure_success(response).await?;

        info!("🗑️ Revoked join key");
        Ok(())
    }
}

async fn ensure_success(response: Response) -> Result<Response, CredentialError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(CredentialError::Upstream {
        status: Some(status.as_u16()),
        body,
    })
}
