use crate::bootstrap::{BootstrapError, MemoryBootstrapStore};
use crate::domain::is_identifier_safe;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

const EXTENSION: &str = "sh";

/// Reads every `<tag>.sh` in `directory`. A missing directory yields an empty store, files whose
/// stem is not a valid tag are skipped.
#[instrument]
pub async fn load_scripts_from(directory: &Path) -> Result<MemoryBootstrapStore, BootstrapError> {
    info!("📁 Loading bootstrap scripts...");
    if !fs::try_exists(directory).await.unwrap_or(false) {
        warn!("⚠️ Bootstrap script directory does not exist, serving none");
        return Ok(MemoryBootstrapStore::default());
    }

    let io_error = |source: std::io::Error| BootstrapError::Io {
        source,
        path: directory.to_path_buf(),
    };
    let mut entries = fs::read_dir(directory).await.map_err(io_error)?;
    let mut scripts = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            continue;
        }

        let Some(tag) = path.file_stem().and_then(|stem| stem.to_str()).filter(|tag| is_identifier_safe(tag)) else {
            warn!("⚠️ Skipping '{}', its name is not a valid tag", path.display());
            continue;
        };

        let content = fs::read_to_string(&path).await.map_err(|source| BootstrapError::Io {
            source,
            path: path.clone(),
        })?;
        scripts.push((tag.to_string(), content));
    }

    let store = MemoryBootstrapStore::from_iter(scripts);
    info!("📁 Loading bootstrap scripts... OK, {} loaded", store.len());
    Ok(store)
}
