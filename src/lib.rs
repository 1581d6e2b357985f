//! i18n-resolver
//!
//! Runtime translation resolver: per-language bundles loaded on demand,
//! `{{N}}` templates, fallback-language lookup and push-updated handles.

pub mod bundle;
pub mod config;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod persist;
pub mod reactive;
pub mod registry;
pub mod resolve;
pub mod session;
pub mod template;

#[cfg(test)]
mod test_utils;

pub use bundle::{
    BundleStore,
    ChangeDetection,
    LanguageBundle,
    TranslationData,
    flatten_json,
};
pub use config::I18nConfig;
pub use error::I18nError;
pub use fetch::{
    FetchError,
    FsFetcher,
    HttpFetcher,
    TranslationFetcher,
};
pub use loader::{
    LoadState,
    RetryPolicy,
};
pub use persist::{
    FileStore,
    LanguageStore,
    MemoryStore,
};
pub use reactive::TranslationSignal;
pub use registry::Registry;
pub use session::{
    ChangeSubscription,
    I18nSession,
    SessionDeps,
};
pub use template::{
    Template,
    compile,
};
