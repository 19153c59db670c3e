mod library;
mod loader;
mod store;

pub use library::{BootstrapLibrary, BootstrapScript, error_script};
pub use loader::load_scripts_from;
pub use store::{BootstrapScriptStore, MemoryBootstrapStore};

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("a 'tag' query parameter is required")]
    MissingTag,
    #[error("tag '{0}' may only contain ASCII letters, digits, dashes and underscores")]
    InvalidTag(String),
    #[error("no bootstrap script with tag '{0}'")]
    NotFound(String),
    #[error("bootstrap script '{0}' has no content")]
    Empty(String),
    #[error("unable to read '{path}': {source}")]
    Io { source: io::Error, path: PathBuf },
}
