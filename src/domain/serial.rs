use crate::domain::DomainError;
use crate::domain::device_hash::DeviceHash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter};

const MAX_HOSTNAME_LEN: usize = 63;

#[derive(PartialEq, Eq, Hash, Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Serial(String);

impl Serial {
    pub fn sanitize(raw: &str) -> Result<Self, DomainError> {
        let stripped: String = raw.chars().filter(|c| !c.is_control()).collect();
        let trimmed = stripped.trim();

        if trimmed.is_empty() {
            return Err(DomainError::EmptySerial);
        }

        Ok(Serial(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn hash(&self) -> DeviceHash {
        let digest = Sha256::digest(self.0.as_bytes());
        DeviceHash::from_digest(hex::encode(digest))
    }

    /// A hostname-safe rendition of the serial. Characters outside the allow-list become dashes,
    /// a serial without any usable character falls back to a prefix of its hash.
    pub fn hostname(&self) -> String {
        let mapped: String = self
            .0
            .chars()
            .map(|c| if is_identifier_char(c) { c } else { '-' })
            .collect();
        let trimmed = mapped.trim_matches(|c| c == '-' || c == '_');

        if trimmed.is_empty() {
            return format!("device-{}", &self.hash().as_str()[..12]);
        }

        let label: String = trimmed.chars().take(MAX_HOSTNAME_LEN).collect();
        label.trim_end_matches(|c| c == '-' || c == '_').to_string()
    }
}

pub fn is_identifier_safe(value: &str) -> bool {
    !value.is_empty() && value.chars().all(is_identifier_char)
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl TryFrom<String> for Serial {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Serial::sanitize(&value)
    }
}

impl From<Serial> for String {
    fn from(serial: Serial) -> Self {
        serial.0
    }
}

impl Display for Serial {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
