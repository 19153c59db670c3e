mod bindings;
mod generator;
mod quote;
mod template;

pub use bindings::ScriptBindings;
pub use generator::{ProvisioningScript, ScriptGenerator};
pub use quote::shell_quote;
pub use template::ScriptTemplate;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RenderError {
    #[error("unterminated placeholder starting at byte {offset}")]
    Unterminated { offset: usize },
    #[error("invalid placeholder name '{0}'")]
    InvalidPlaceholder(String),
    #[error("template uses unknown placeholder '{0}'")]
    Unknown(String),
    #[error("no value bound for placeholder '{0}'")]
    Unbound(String),
    #[error("device id '{0}' is not safe to embed")]
    UnsafeIdentifier(String),
}
