use crate::domain::{DeviceHash, DeviceId, DeviceRecord, DomainError, ProvisioningSnapshot, ProvisioningStatus, Serial};
use crate::registry::store::{DeviceStore, StoreError};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    store: Arc<dyn DeviceStore>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Registration {
    pub device_id: DeviceId,
    pub status: ProvisioningStatus,
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct ProvisioningClaim {
    pub record: DeviceRecord,
    pub instance_uuid: Uuid,
    snapshot: ProvisioningSnapshot,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct StatusReport {
    pub provisioning_status: Option<String>,
    pub instance_uuid: Option<Uuid>,
    pub state: Option<Map<String, Value>>,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("device '{0}' not found")]
    NotFound(DeviceId),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("provisioning slot of device '{0}' was claimed concurrently")]
    ClaimConflict(DeviceId),
    #[error("reported provisioning instance does not match the current one of device '{0}'")]
    StaleInstance(DeviceId),
    #[error("device '{0}' kept changing, gave up after {MAX_WRITE_ATTEMPTS} attempts")]
    Contended(String),
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        DeviceRegistry { store }
    }

    #[instrument(skip(self))]
    pub async fn register(&self, raw_serial: &str) -> Result<Registration, RegistryError> {
        let serial = Serial::sanitize(raw_serial)?;
        info!(serial = %serial, "📝 Registering device...");

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let now = Utc::now();

            if let Some(mut existing) = self.store.find_by_serial(&serial).await? {
                existing.reset_for_registration(now)?;
                match self.store.compare_and_swap(existing).await {
                    Ok(record) => {
                        info!(device_id = %record.id, "📝 Registering device... OK, reset existing record");
                        return Ok(Registration {
                            status: record.status(),
                            device_id: record.id,
                            created: false,
                        });
                    }
                    Err(StoreError::VersionConflict { .. }) => {
                        debug!("Existing record changed while resetting, retrying");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            match self.store.insert(DeviceRecord::new(DeviceId::generate(), serial.clone(), now)).await {
                Ok(record) => {
                    info!(device_id = %record.id, "📝 Registering device... OK, created new record");
                    return Ok(Registration {
                        status: record.status(),
                        device_id: record.id,
                        created: true,
                    });
                }
                Err(StoreError::DuplicateSerial(_)) => {
                    debug!("Serial registered concurrently, retrying as a reset");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistryError::Contended(serial.to_string()))
    }

    /// Reads a record by id and touches its `lastSeen`. Failing to touch is logged, not fatal.
    #[instrument(skip(self))]
    pub async fn check_status(&self, id: &DeviceId) -> Result<DeviceRecord, RegistryError> {
        let now = Utc::now();
        match self
            .modify(id, |record| {
                record.last_seen = Some(now);
                Ok(())
            })
            .await
        {
            Ok(record) => Ok(record),
            Err(RegistryError::Contended(_)) => {
                warn!(device_id = %id, "⚠️ Could not update lastSeen, record is contended");
                self.store.get(id).await?.ok_or_else(|| RegistryError::NotFound(id.clone()))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn find_by_hash(&self, hash: &DeviceHash) -> Result<Option<DeviceRecord>, RegistryError> {
        Ok(self.store.find_by_hash(hash).await?)
    }

    #[instrument(skip(self))]
    pub async fn mark_approval_pending(&self, id: &DeviceId) -> Result<DeviceRecord, RegistryError> {
        let record = self
            .modify(id, |record| {
                if !record.status().is_terminal() {
                    record.transition_to(ProvisioningStatus::ApprovalPendingRequestReceived)?;
                }
                Ok(())
            })
            .await?;
        Ok(record)
    }

    /// Atomically moves the record the caller looked at to `script_generated`. The write is
    /// conditional on the stored version. When that moved on, the claim is retried on the fresh
    /// record as long as its provisioning slot is still the one observed.
    #[instrument(skip(self, observed), fields(device_id = %observed.id, version = observed.version()))]
    pub async fn claim_provisioning(&self, observed: DeviceRecord, ip: &str, now: DateTime<Utc>) -> Result<ProvisioningClaim, RegistryError> {
        let id = observed.id.clone();
        let mut current = observed.clone();

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut record = current;
            let (instance_uuid, snapshot) = record.claim_provisioning(ip, now)?;

            match self.store.compare_and_swap(record).await {
                Ok(record) => {
                    debug!(instance_uuid = %instance_uuid, "Claimed provisioning slot");
                    return Ok(ProvisioningClaim {
                        record,
                        instance_uuid,
                        snapshot,
                    });
                }
                Err(StoreError::VersionConflict { .. }) => {
                    let fresh = self.store.get(&id).await?.ok_or_else(|| RegistryError::NotFound(id.clone()))?;
                    if !fresh.same_provisioning_slot(&observed) {
                        warn!("⚠️ Provisioning slot was claimed concurrently");
                        return Err(RegistryError::ClaimConflict(id));
                    }
                    debug!("Record changed outside the provisioning slot, retrying the claim");
                    current = fresh;
                }
                Err(StoreError::Missing(id)) => return Err(RegistryError::NotFound(id)),
                Err(e) => return Err(e.into()),
            }
        }

        warn!("⚠️ Record kept changing, giving up the claim");
        Err(RegistryError::ClaimConflict(id))
    }

    /// Undoes a claim whose issuance failed. If the record moved on in the meantime the newer
    /// state wins and the claim is left as is.
    #[instrument(skip_all, fields(device_id = %claim.record.id))]
    pub async fn release_claim(&self, claim: ProvisioningClaim) -> Result<(), RegistryError> {
        let mut record = claim.record;
        record.restore(claim.snapshot)?;

        match self.store.compare_and_swap(record).await {
            Ok(_) => {
                info!("↩️ Released provisioning claim");
                Ok(())
            }
            Err(StoreError::VersionConflict { .. }) => {
                warn!("⚠️ Record changed after the claim, leaving it untouched");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn set_approval(&self, id: &DeviceId, approved: bool) -> Result<DeviceRecord, RegistryError> {
        let record = self
            .modify(id, |record| {
                if approved {
                    record.approve();
                } else {
                    record.revoke()?;
                }
                Ok(())
            })
            .await?;
        info!(device_id = %id, approved, status = %record.status(), "🔐 Updated approval");
        Ok(record)
    }

    /// Merges a device-reported progress update. Only `provisioning_complete` moves the status;
    /// any other progress message is recorded as the last reported status.
    #[instrument(skip(self, report))]
    pub async fn report_status(&self, id: &DeviceId, report: StatusReport) -> Result<DeviceRecord, RegistryError> {
        let now = Utc::now();
        let record = self.modify(id, |record| apply_report(record, &report, now)).await?;
        info!(device_id = %id, status = %record.status(), "📡 Recorded status report");
        Ok(record)
    }

    async fn modify<F>(&self, id: &DeviceId, mut change: F) -> Result<DeviceRecord, RegistryError>
    where
        F: FnMut(&mut DeviceRecord) -> Result<(), RegistryError>,
    {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut record = self.store.get(id).await?.ok_or_else(|| RegistryError::NotFound(id.clone()))?;
            change(&mut record)?;

            match self.store.compare_and_swap(record).await {
                Ok(record) => return Ok(record),
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(StoreError::Missing(id)) => return Err(RegistryError::NotFound(id)),
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistryError::Contended(id.to_string()))
    }
}

fn apply_report(record: &mut DeviceRecord, report: &StatusReport, now: DateTime<Utc>) -> Result<(), RegistryError> {
    if let Some(instance_uuid) = report.instance_uuid {
        if record.provisioning_instance_uuid != Some(instance_uuid) {
            return Err(RegistryError::StaleInstance(record.id.clone()));
        }
    }

    let reported = report.provisioning_status.as_deref().unwrap_or("unknown");
    if let Ok(status) = reported.parse::<ProvisioningStatus>() {
        if status != ProvisioningStatus::ProvisioningComplete {
            return Err(DomainError::IllegalTransition {
                from: record.status(),
                to: status,
            }
            .into());
        }
        record.transition_to(ProvisioningStatus::ProvisioningComplete)?;
        record.commissioned = true;
        record.state.insert("service_status".to_string(), Value::from("starting"));
        record.state.insert("connectivity_status".to_string(), Value::from("connecting"));
    }

    record.last_reported_status = Some(reported.to_string());
    record.last_reported_at = Some(now);

    if let Some(state) = &report.state {
        for (key, value) in state.iter().filter(|(key, _)| key.as_str() != "lastUpdate") {
            record.state.insert(key.clone(), value.clone());
        }
    }
    record.state.insert("lastUpdate".to_string(), Value::from(now.to_rfc3339()));

    Ok(())
}
