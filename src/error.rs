use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced to callers. Lookups never fail; only construction and
/// registry access do.
#[derive(Error, Debug)]
pub enum I18nError {
    /// Invalid or incomplete configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The session was constructed outside a tokio runtime
    #[error("No tokio runtime is available; create the session from within a runtime context")]
    MissingRuntime,

    /// The registry was accessed before `initialize`
    #[error("The i18n session is not initialized; call `Registry::initialize` first")]
    NotInitialized,
}
