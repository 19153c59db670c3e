use crate::domain::device_hash::DeviceHash;
use crate::domain::serial::{Serial, is_identifier_safe};
use crate::domain::{DomainError, ProvisioningStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn generate() -> Self {
        DeviceId(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_identifier_safe(&self) -> bool {
        is_identifier_safe(&self.0)
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        DeviceId(value)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        DeviceId(value.to_string())
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub serial: Serial,
    pub hash: DeviceHash,
    pub friendly_name: String,
    pub approved_for_provisioning: bool,
    provisioning_status: ProvisioningStatus,
    pub provisioning_instance_uuid: Option<Uuid>,
    pub commissioned: bool,
    pub state: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_provision_request: Option<DateTime<Utc>>,
    #[serde(rename = "lastProvisionIP")]
    pub last_provision_ip: Option<String>,
    pub last_reported_status: Option<String>,
    pub last_reported_at: Option<DateTime<Utc>>,
    pub(crate) version: u64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ProvisioningSnapshot {
    status: ProvisioningStatus,
    instance_uuid: Option<Uuid>,
    last_provision_request: Option<DateTime<Utc>>,
    last_provision_ip: Option<String>,
}

impl DeviceRecord {
    pub fn new(id: DeviceId, serial: Serial, now: DateTime<Utc>) -> Self {
        let hash = serial.hash();
        let friendly_name = format!("Device {}", serial);

        DeviceRecord {
            id,
            serial,
            hash,
            friendly_name,
            approved_for_provisioning: false,
            provisioning_status: ProvisioningStatus::AwaitingApproval,
            provisioning_instance_uuid: None,
            commissioned: false,
            state: Map::new(),
            created_at: now,
            last_seen: Some(now),
            last_provision_request: None,
            last_provision_ip: None,
            last_reported_status: None,
            last_reported_at: None,
            version: 0,
        }
    }

    pub fn status(&self) -> ProvisioningStatus {
        self.provisioning_status
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// The only place the provisioning status is written.
    pub fn transition_to(&mut self, next: ProvisioningStatus) -> Result<(), DomainError> {
        if !self.provisioning_status.can_transition_to(next) {
            return Err(DomainError::IllegalTransition {
                from: self.provisioning_status,
                to: next,
            });
        }

        if next == ProvisioningStatus::ScriptGenerated && !self.approved_for_provisioning {
            return Err(DomainError::NotApproved);
        }

        self.provisioning_status = next;
        Ok(())
    }

    pub fn reset_for_registration(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition_to(ProvisioningStatus::AwaitingApproval)?;
        self.approved_for_provisioning = false;
        self.last_provision_request = None;
        self.last_seen = Some(now);
        Ok(())
    }

    pub fn claim_provisioning(&mut self, ip: &str, now: DateTime<Utc>) -> Result<(Uuid, ProvisioningSnapshot), DomainError> {
        let snapshot = self.snapshot();
        self.transition_to(ProvisioningStatus::ScriptGenerated)?;

        let instance_uuid = Uuid::new_v4();
        self.provisioning_instance_uuid = Some(instance_uuid);
        self.last_provision_request = Some(now);
        self.last_provision_ip = Some(ip.to_string());

        Ok((instance_uuid, snapshot))
    }

    pub fn same_provisioning_slot(&self, other: &DeviceRecord) -> bool {
        self.approved_for_provisioning == other.approved_for_provisioning
            && self.provisioning_status == other.provisioning_status
            && self.provisioning_instance_uuid == other.provisioning_instance_uuid
    }

    pub fn restore(&mut self, snapshot: ProvisioningSnapshot) -> Result<(), DomainError> {
        self.transition_to(snapshot.status)?;
        self.provisioning_instance_uuid = snapshot.instance_uuid;
        self.last_provision_request = snapshot.last_provision_request;
        self.last_provision_ip = snapshot.last_provision_ip;
        Ok(())
    }

    /// Approval only flips the flag, the status follows on the next script request.
    pub fn approve(&mut self) {
        self.approved_for_provisioning = true;
    }

    pub fn revoke(&mut self) -> Result<(), DomainError> {
        self.approved_for_provisioning = false;
        if self.provisioning_status.is_terminal() {
            return Ok(());
        }
        self.transition_to(ProvisioningStatus::AwaitingApproval)
    }

    fn snapshot(&self) -> ProvisioningSnapshot {
        ProvisioningSnapshot {
            status: self.provisioning_status,
            instance_uuid: self.provisioning_instance_uuid,
            last_provision_request: self.last_provision_request,
            last_provision_ip: self.last_provision_ip.clone(),
        }
    }
}
