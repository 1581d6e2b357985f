use std::path::PathBuf;

use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

use crate::bundle::ChangeDetection;
use crate::loader::RetryPolicy;

/// Storage key used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "csp-lang";

/// One rejected configuration field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    /// camelCase field name, with an index for list items (`languageSupported[1]`)
    pub field: String,
    /// What is wrong and how to fix it
    pub reason: String,
}

impl ValidationError {
    /// Creates an error for `field`.
    #[must_use]
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { field: field.into(), reason: reason.into() }
    }
}

/// Why a configuration could not be used.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// One or more fields were rejected by [`I18nConfig::validate`]
    #[error("Invalid i18n configuration: {}", join_problems(.0))]
    Invalid(Vec<ValidationError>),

    /// The configuration file exists but could not be read
    #[error("Cannot read i18n configuration {}: {source}", path.display())]
    Read {
        /// Configuration file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not a valid JSON configuration
    #[error("{} is not a valid i18n configuration: {source}", path.display())]
    Parse {
        /// Configuration file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
}

/// Renders every problem on one line, separated by `; `.
fn join_problems(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Session configuration. Omitted fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct I18nConfig {
    /// Base path or URL for bundle fetches; `{assetsUrl}/{lang}.json`.
    pub assets_url: String,

    /// Used when no persisted preference exists or it is unsupported.
    pub default_language: String,

    /// Language consulted on a miss. Defaults to the computed default language.
    pub fallback_language: Option<String>,

    /// Ordered list of selectable languages.
    /// Empty means a single-element list containing the default language.
    pub language_supported: Vec<String>,

    /// Persistence key for the chosen language.
    pub storage_key: String,

    /// When set, nested bundle JSON is flattened into keys joined by this separator.
    pub key_separator: Option<String>,

    /// How a reloaded bundle is compared with the stored one.
    pub change_detection: ChangeDetection,

    /// Whether a failed load is fetched again on next access.
    pub retry: RetryPolicy,
}

impl Default for I18nConfig {
    fn default() -> Self {
        Self {
            assets_url: String::new(),
            default_language: "en".to_string(),
            fallback_language: None,
            language_supported: Vec::new(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            key_separator: None,
            change_detection: ChangeDetection::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl I18nConfig {
    /// Creates a configuration with the given assets URL and defaults elsewhere.
    #[must_use]
    pub fn new(assets_url: impl Into<String>) -> Self {
        Self { assets_url: assets_url.into(), ..Self::default() }
    }

    /// # Errors
    /// - Required field is empty
    /// - Empty language code
    /// - Invalid separator
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.assets_url.trim().is_empty() {
            errors.push(ValidationError::new(
                "assetsUrl",
                "The assets URL is required. Example: \"/assets/i18n\"",
            ));
        }

        if self.default_language.trim().is_empty() {
            errors.push(ValidationError::new(
                "defaultLanguage",
                "The default language cannot be empty. Example: \"en\"",
            ));
        }

        if let Some(fallback) = &self.fallback_language
            && fallback.trim().is_empty()
        {
            errors.push(ValidationError::new(
                "fallbackLanguage",
                "The fallback language cannot be empty. Specify a language code, or remove this field",
            ));
        }

        for (index, lang) in self.language_supported.iter().enumerate() {
            if lang.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("languageSupported[{index}]"),
                    "Language codes cannot be empty",
                ));
            }
        }

        if self.storage_key.is_empty() {
            errors.push(ValidationError::new(
                "storageKey",
                "The storage key cannot be empty. Example: \"csp-lang\"",
            ));
        }

        if let Some(sep) = &self.key_separator
            && sep.is_empty()
        {
            errors.push(ValidationError::new(
                "keySeparator",
                "The separator cannot be empty. Please specify a separator (e.g., \".\"), or remove this field",
            ));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
