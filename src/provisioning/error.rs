use crate::credentials::CredentialError;
use crate::domain::{DeviceId, DomainError};
use crate::registry::RegistryError;
use crate::script::RenderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisioningError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("upstream error ({status:?}): {body}")]
    Upstream { status: Option<u16>, body: String },
    #[error("device '{0}' not found")]
    NotFound(DeviceId),
    #[error("store error: {0}")]
    Store(String),
}

impl From<CredentialError> for ProvisioningError {
    fn from(error: CredentialError) -> Self {
        match error {
            CredentialError::Config(reason) => ProvisioningError::Config(reason),
            CredentialError::Upstream { status, body } => ProvisioningError::Upstream { status, body },
            CredentialError::Request(e) => ProvisioningError::Upstream {
                status: e.status().map(|status| status.as_u16()),
                body: e.to_string(),
            },
        }
    }
}

impl From<RenderError> for ProvisioningError {
    fn from(error: RenderError) -> Self {
        ProvisioningError::Config(error.to_string())
    }
}

impl From<DomainError> for ProvisioningError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::EmptySerial | DomainError::InvalidHash => ProvisioningError::Validation(error.to_string()),
            DomainError::NotApproved | DomainError::IllegalTransition { .. } => ProvisioningError::Unauthorized(error.to_string()),
        }
    }
}

impl From<RegistryError> for ProvisioningError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NotFound(id) => ProvisioningError::NotFound(id),
            RegistryError::Domain(e) => e.into(),
            RegistryError::StaleInstance(_) => ProvisioningError::Unauthorized(error.to_string()),
            RegistryError::Store(_) | RegistryError::ClaimConflict(_) | RegistryError::Contended(_) => {
                ProvisioningError::Store(error.to_string())
            }
        }
    }
}
