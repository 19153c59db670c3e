mod auth_token;
mod tailscale;

pub use auth_token::{AuthTokenIssuer, CustomTokenSigner, DeviceClaims};
pub use tailscale::{JoinKey, JoinKeyIssuer, TailscaleClient, new_client};

use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("credential configuration error: {0}")]
    Config(String),
    #[error("upstream rejected the request ({status:?}): {body}")]
    Upstream { status: Option<u16>, body: String },
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

pub struct CredentialBundle {
    auth_token: String,
    join_key: JoinKey,
}

impl CredentialBundle {
    pub fn new(auth_token: impl Into<String>, join_key: JoinKey) -> Self {
        CredentialBundle {
            auth_token: auth_token.into(),
            join_key,
        }
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub fn join_key(&self) -> &JoinKey {
        &self.join_key
    }
}

impl Debug for CredentialBundle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("auth_token", &"***")
            .field("join_key", &self.join_key)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CredentialIssuer {
    auth_tokens: Arc<dyn AuthTokenIssuer>,
    join_keys: Arc<dyn JoinKeyIssuer>,
}

impl CredentialIssuer {
    pub fn new(auth_tokens: Arc<dyn AuthTokenIssuer>, join_keys: Arc<dyn JoinKeyIssuer>) -> Self {
        CredentialIssuer { auth_tokens, join_keys }
    }

    /// The token is signed locally before the remote join key is requested, so a signing failure
    /// never leaves an orphaned key behind.
    #[instrument(skip_all, fields(device_id = %claims.device_id))]
    pub async fn issue(&self, claims: &DeviceClaims) -> Result<CredentialBundle, CredentialError> {
        let auth_token = self.auth_tokens.issue(claims).await?;
        let join_key = self
            .join_keys
            .create_join_key(&format!("provision {}", claims.serial.hostname()))
            .await?;

        info!(key_id = join_key.id(), "🔐 Issued device credentials");
        Ok(CredentialBundle::new(auth_token, join_key))
    }

    /// Best effort: a key that cannot be revoked still expires on its own.
    pub async fn revoke(&self, bundle: &CredentialBundle) {
        let key_id = bundle.join_key.id();
        if let Err(e) = self.join_keys.revoke_join_key(key_id).await {
            warn!(key_id, "⚠️ Unable to revoke join key: {}", e);
        }
    }
}
