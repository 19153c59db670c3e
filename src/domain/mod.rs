pub mod device;
mod device_hash;
mod provisioning_status;
mod serial;

pub use device::{DeviceId, DeviceRecord, ProvisioningSnapshot};
pub use device_hash::DeviceHash;
pub use provisioning_status::ProvisioningStatus;
pub use serial::{Serial, is_identifier_safe};

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("serial is empty after removing control characters")]
    EmptySerial,
    #[error("device hash must be 64 hexadecimal characters")]
    InvalidHash,
    #[error("illegal provisioning status transition from '{from}' to '{to}'")]
    IllegalTransition { from: ProvisioningStatus, to: ProvisioningStatus },
    #[error("device is not approved for provisioning")]
    NotApproved,
}
