use crate::api::ApiState;
use crate::app_config::Secret;
use crate::provisioning::ProvisioningError;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

pub async fn require_device_token(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Result<Response, ProvisioningError> {
    authorize(request.headers(), &state.device_update_token)?;
    Ok(next.run(request).await)
}

pub async fn require_admin_token(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Result<Response, ProvisioningError> {
    authorize(request.headers(), &state.admin_token)?;
    Ok(next.run(request).await)
}

fn authorize(headers: &HeaderMap, expected: &Secret) -> Result<(), ProvisioningError> {
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match provided {
        Some(token) if !token.is_empty() && bool::from(token.as_bytes().ct_eq(expected.expose().as_bytes())) => Ok(()),
        Some(_) => {
            warn!("🚫 Rejected request with an invalid access token");
            Err(ProvisioningError::Unauthorized("invalid access token".to_string()))
        }
        None => {
            warn!("🚫 Rejected request without an access token");
            Err(ProvisioningError::Unauthorized("missing access token".to_string()))
        }
    }
}
