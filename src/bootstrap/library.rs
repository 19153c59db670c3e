use crate::bootstrap::{BootstrapError, BootstrapScriptStore};
use crate::domain::is_identifier_safe;
use crate::script::shell_quote;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct BootstrapLibrary {
    store: Arc<dyn BootstrapScriptStore>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct BootstrapScript {
    pub tag: String,
    pub content: String,
}

impl BootstrapScript {
    pub fn filename(&self) -> String {
        format!("register-{}.sh", self.tag)
    }
}

impl BootstrapLibrary {
    pub fn new(store: Arc<dyn BootstrapScriptStore>) -> Self {
        BootstrapLibrary { store }
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, tag: Option<&str>) -> Result<BootstrapScript, BootstrapError> {
        let Some(tag) = tag.map(str::trim).filter(|tag| !tag.is_empty()) else {
            warn!("⚠️ Bootstrap script requested without a tag");
            return Err(BootstrapError::MissingTag);
        };

        if !is_identifier_safe(tag) {
            warn!(tag, "⚠️ Bootstrap script requested with an invalid tag");
            return Err(BootstrapError::InvalidTag(tag.to_string()));
        }

        info!(tag, "📦 Serving bootstrap script...");
        let Some(content) = self.store.get(tag).await? else {
            error!(tag, "❌ Bootstrap script not found");
            return Err(BootstrapError::NotFound(tag.to_string()));
        };

        if content.trim().is_empty() {
            error!(tag, "❌ Bootstrap script has no content");
            return Err(BootstrapError::Empty(tag.to_string()));
        }

        info!(tag, bytes = content.len(), "📦 Serving bootstrap script... OK");
        Ok(BootstrapScript {
            tag: tag.to_string(),
            content,
        })
    }
}

/// A script that tells the operator on the device why the download failed and exits non-zero.
pub fn error_script(tag: &str, reason: &str, now: DateTime<Utc>) -> String {
    let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let rule = "=".repeat(68);

    format!(
        "#!/bin/bash\n\
         # BOOTSTRAP FAILED at {timestamp}\n\
         # Could not retrieve bootstrap script from the cloud.\n\
         echo \"{rule}\"\n\
         echo \"ERROR: Failed to download registration script.\"\n\
         echo \"Timestamp: {timestamp}\"\n\
         echo \"Requested Tag:\" {tag}\n\
         echo \"Reason:\" {reason}\n\
         echo \"Please check the tag and server status.\"\n\
         echo \"{rule}\"\n\
         exit 1\n",
        tag = shell_quote(tag),
        reason = shell_quote(reason),
    )
}
