use crate::domain::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

const HASH_LEN: usize = 64;

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceHash(String);

impl DeviceHash {
    /// Accepts exactly 64 hex digits in either case and normalizes them to lowercase.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        if value.len() != HASH_LEN || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidHash);
        }

        Ok(DeviceHash(value.to_ascii_lowercase()))
    }

    pub(super) fn from_digest(hex_digest: String) -> Self {
        DeviceHash(hex_digest)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn prefix(&self) -> &str {
        &self.0[..8]
    }
}

impl TryFrom<String> for DeviceHash {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DeviceHash::parse(&value)
    }
}

impl From<DeviceHash> for String {
    fn from(hash: DeviceHash) -> Self {
        hash.0
    }
}

impl Display for DeviceHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
