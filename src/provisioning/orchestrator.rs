use crate::credentials::{CredentialIssuer, DeviceClaims};
use crate::domain::{DeviceHash, DeviceId, DeviceRecord, ProvisioningStatus};
use crate::provisioning::ProvisioningError;
use crate::rate_limit::{RateLimitDecision, RateLimitPermit, RateLimiter};
use crate::registry::{DeviceRegistry, ProvisioningClaim, Registration, RegistryError, StatusReport};
use crate::script::{ProvisioningScript, ScriptGenerator};
use chrono::Utc;
use tracing::{error, info, instrument, warn};

#[derive(PartialEq, Debug, Clone)]
pub enum DeviceStatus {
    Approved { script_url: String },
    Waiting(ProvisioningStatus),
}

#[derive(Debug, Clone)]
pub struct ProvisioningOrchestrator {
    registry: DeviceRegistry,
    rate_limiter: RateLimiter,
    credentials: CredentialIssuer,
    scripts: ScriptGenerator,
    public_url: String,
}

impl ProvisioningOrchestrator {
    pub fn new(
        registry: DeviceRegistry,
        rate_limiter: RateLimiter,
        credentials: CredentialIssuer,
        scripts: ScriptGenerator,
        public_url: &str,
    ) -> Self {
        ProvisioningOrchestrator {
            registry,
            rate_limiter,
            credentials,
            scripts,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    #[instrument(skip(self))]
    pub async fn register(&self, raw_serial: &str) -> Result<Registration, ProvisioningError> {
        Ok(self.registry.register(raw_serial).await?)
    }

    #[instrument(skip(self))]
    pub async fn check_status(&self, id: &DeviceId) -> Result<DeviceStatus, ProvisioningError> {
        require_device_id(id)?;
        let record = self.registry.check_status(id).await?;

        if record.approved_for_provisioning {
            info!("✅ Device is approved, handing out the script URL");
            return Ok(DeviceStatus::Approved {
                script_url: format!("{}/provision?device_hash={}", self.public_url, record.hash.as_str()),
            });
        }

        Ok(DeviceStatus::Waiting(record.status()))
    }

    /// Validates the hash, applies both rate limits, checks the approval, claims the provisioning
    /// slot and only then issues credentials and renders the script. Anything failing after the
    /// claim rolls it back so the device can try again.
    #[instrument(skip(self))]
    pub async fn fetch_provisioning_script(&self, raw_hash: &str, ip: &str) -> Result<ProvisioningScript, ProvisioningError> {
        let hash = DeviceHash::parse(raw_hash)?;

        if let RateLimitDecision::Denied { retry_after_secs } = self.rate_limiter.check_ip(ip).await {
            return Err(ProvisioningError::RateLimited { retry_after_secs });
        }

        let Some(device) = self.registry.find_by_hash(&hash).await? else {
            warn!(hash_prefix = hash.prefix(), "🚫 Unknown device hash");
            return Err(ProvisioningError::Unauthorized("unknown device".to_string()));
        };

        if !device.approved_for_provisioning {
            warn!(device_id = %device.id, "🚫 Script requested before approval");
            self.registry.mark_approval_pending(&device.id).await?;
            return Err(ProvisioningError::Unauthorized("device provisioning has not been approved".to_string()));
        }

        let permit = match self.rate_limiter.check_device(&device.id).await {
            RateLimitDecision::Allowed(permit) => permit,
            RateLimitDecision::Denied { retry_after_secs } => {
                return Err(ProvisioningError::RateLimited { retry_after_secs });
            }
        };

        info!(device_id = %device.id, "📜 Generating provisioning script...");
        let claim = match self.registry.claim_provisioning(device, ip, Utc::now()).await {
            Ok(claim) => claim,
            Err(RegistryError::ClaimConflict(_)) => {
                self.rate_limiter.release(&permit).await;
                return Err(ProvisioningError::RateLimited {
                    retry_after_secs: self.rate_limiter.device_interval().as_secs().max(1),
                });
            }
            Err(e) => {
                self.rate_limiter.release(&permit).await;
                return Err(e.into());
            }
        };

        match self.issue_and_render(&claim).await {
            Ok(script) => {
                info!(device_id = %claim.record.id, "📜 Generating provisioning script... OK");
                Ok(script)
            }
            Err(e) => {
                error!(device_id = %claim.record.id, "❌ Generating provisioning script failed: {}", e);
                self.roll_back(claim, &permit).await;
                Err(e)
            }
        }
    }

    #[instrument(skip(self, report))]
    pub async fn report_status(&self, id: &DeviceId, report: StatusReport) -> Result<DeviceRecord, ProvisioningError> {
        require_device_id(id)?;
        Ok(self.registry.report_status(id, report).await?)
    }

    #[instrument(skip(self))]
    pub async fn set_approval(&self, id: &DeviceId, approved: bool) -> Result<DeviceRecord, ProvisioningError> {
        require_device_id(id)?;
        Ok(self.registry.set_approval(id, approved).await?)
    }

    async fn issue_and_render(&self, claim: &ProvisioningClaim) -> Result<ProvisioningScript, ProvisioningError> {
        let device = &claim.record;
        let claims = DeviceClaims {
            serial: device.serial.clone(),
            provisioning_instance_uuid: claim.instance_uuid,
            device_id: device.id.clone(),
        };

        let bundle = self.credentials.issue(&claims).await?;

        match self.scripts.generate(device, claim.instance_uuid, &bundle, Utc::now()) {
            Ok(script) => Ok(script),
            Err(e) => {
                self.credentials.revoke(&bundle).await;
                Err(e.into())
            }
        }
    }

    async fn roll_back(&self, claim: ProvisioningClaim, permit: &RateLimitPermit) {
        let device_id = claim.record.id.clone();
        if let Err(e) = self.registry.release_claim(claim).await {
            error!(device_id = %device_id, "❌ Unable to release provisioning claim: {}", e);
        }
        self.rate_limiter.release(permit).await;
    }
}

fn require_device_id(id: &DeviceId) -> Result<(), ProvisioningError> {
    if id.as_str().trim().is_empty() {
        return Err(ProvisioningError::Validation("deviceId is required".to_string()));
    }
    Ok(())
}
