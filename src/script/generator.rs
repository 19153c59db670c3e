use crate::app_config::{Script, Secret};
use crate::credentials::CredentialBundle;
use crate::domain::DeviceRecord;
use crate::script::{RenderError, ScriptBindings, ScriptTemplate};
use chrono::{DateTime, Utc};
use std::fmt::{Debug, Formatter};
use tracing::{debug, instrument};
use uuid::Uuid;

const PROVISION_TEMPLATE: &str = include_str!("../../templates/provision.sh");

#[derive(PartialEq, Clone)]
pub struct ProvisioningScript {
    pub body: String,
    pub filename: String,
}

impl Debug for ProvisioningScript {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningScript")
            .field("filename", &self.filename)
            .field("len", &self.body.len())
            .finish()
    }
}

#[derive(Clone)]
pub struct ScriptGenerator {
    template: ScriptTemplate,
    docker_image: String,
    update_status_url: String,
    api_key: String,
    project_id: String,
    auth_domain: String,
    container_name: String,
    status_token: Secret,
}

impl ScriptGenerator {
    pub fn from_config(script: &Script, status_token: &Secret) -> Result<Self, RenderError> {
        Self::with_template(PROVISION_TEMPLATE, script, status_token)
    }

    pub fn with_template(source: &str, script: &Script, status_token: &Secret) -> Result<Self, RenderError> {
        let template = ScriptTemplate::parse(source)?;
        if let Some(unknown) = template.placeholders().find(|name| !ScriptBindings::NAMES.contains(name)) {
            return Err(RenderError::Unknown(unknown.to_string()));
        }

        Ok(ScriptGenerator {
            template,
            docker_image: script.docker_image().to_string(),
            update_status_url: script.update_status_url().to_string(),
            api_key: script.api_key().to_string(),
            project_id: script.project_id().to_string(),
            auth_domain: script.auth_domain(),
            container_name: script.container_name().to_string(),
            status_token: status_token.clone(),
        })
    }

    #[instrument(skip_all, fields(device_id = %device.id))]
    pub fn generate(
        &self,
        device: &DeviceRecord,
        instance_uuid: Uuid,
        credentials: &CredentialBundle,
        generated_at: DateTime<Utc>,
    ) -> Result<ProvisioningScript, RenderError> {
        if !device.id.is_identifier_safe() {
            return Err(RenderError::UnsafeIdentifier(device.id.to_string()));
        }

        let hostname = device.serial.hostname();
        let bindings = ScriptBindings {
            device_id: device.id.to_string(),
            serial: device.serial.as_str().to_string(),
            hostname: hostname.clone(),
            provisioning_instance_uuid: instance_uuid.to_string(),
            auth_token: credentials.auth_token().to_string(),
            join_key: credentials.join_key().key().to_string(),
            api_key: self.api_key.clone(),
            project_id: self.project_id.clone(),
            auth_domain: self.auth_domain.clone(),
            docker_image: self.docker_image.clone(),
            update_status_url: self.update_status_url.clone(),
            status_token: self.status_token.expose().to_string(),
            container_name: self.container_name.clone(),
            generated_at,
        };

        let body = self.template.render(&bindings.to_map())?;
        debug!(bytes = body.len(), "📜 Rendered provisioning script");

        Ok(ProvisioningScript {
            body,
            filename: format!("provision-{}.sh", hostname),
        })
    }
}

impl Debug for ScriptGenerator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptGenerator")
            .field("docker_image", &self.docker_image)
            .field("update_status_url", &self.update_status_url)
            .field("container_name", &self.container_name)
            .finish_non_exhaustive()
    }
}
