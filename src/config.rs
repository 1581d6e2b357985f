//! Session configuration
/// Config file loader
mod loader;
/// Configuration types and validation
mod types;

pub use loader::load_from_path;
pub use types::{
    ConfigError,
    DEFAULT_STORAGE_KEY,
    I18nConfig,
    ValidationError,
};
