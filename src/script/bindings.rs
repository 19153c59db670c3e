use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

#[derive(Clone)]
pub struct ScriptBindings {
    pub device_id: String,
    pub serial: String,
    pub hostname: String,
    pub provisioning_instance_uuid: String,
    pub auth_token: String,
    pub join_key: String,
    pub api_key: String,
    pub project_id: String,
    pub auth_domain: String,
    pub docker_image: String,
    pub update_status_url: String,
    pub status_token: String,
    pub container_name: String,
    pub generated_at: DateTime<Utc>,
}

impl ScriptBindings {
    pub const NAMES: [&'static str; 14] = [
        "DEVICE_ID",
        "SERIAL",
        "HOSTNAME",
        "PROVISIONING_INSTANCE_UUID",
        "AUTH_TOKEN",
        "JOIN_KEY",
        "API_KEY",
        "PROJECT_ID",
        "AUTH_DOMAIN",
        "DOCKER_IMAGE",
        "UPDATE_STATUS_URL",
        "STATUS_TOKEN",
        "CONTAINER_NAME",
        "GENERATED_AT",
    ];

    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        let values = [
            self.device_id.clone(),
            self.serial.clone(),
            self.hostname.clone(),
            self.provisioning_instance_uuid.clone(),
            self.auth_token.clone(),
            self.join_key.clone(),
            self.api_key.clone(),
            self.project_id.clone(),
            self.auth_domain.clone(),
            self.docker_image.clone(),
            self.update_status_url.clone(),
            self.status_token.clone(),
            self.container_name.clone(),
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ];

        Self::NAMES.into_iter().zip(values).collect()
    }
}

impl Debug for ScriptBindings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptBindings")
            .field("device_id", &self.device_id)
            .field("serial", &self.serial)
            .field("hostname", &self.hostname)
            .field("provisioning_instance_uuid", &self.provisioning_instance_uuid)
            .field("docker_image", &self.docker_image)
            .field("generated_at", &self.generated_at)
            .finish_non_exhaustive()
    }
}
