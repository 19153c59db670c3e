mod registry;
mod store;

pub use registry::{DeviceRegistry, ProvisioningClaim, Registration, RegistryError, StatusReport};
pub use store::{DeviceStore, MemoryDeviceStore, StoreError};
