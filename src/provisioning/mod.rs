mod error;
mod orchestrator;

pub use error::ProvisioningError;
pub use orchestrator::{DeviceStatus, ProvisioningOrchestrator};

#[cfg(test)]
pub use orchestrator::tests::Fixture;
