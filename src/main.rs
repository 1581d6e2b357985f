//! `i18n-lookup <config.json> <lang> <key> [args...]`
//!
//! Loads the bundles for `lang` and its fallback, then prints the resolved
//! translation. Arguments that parse as JSON are passed as JSON values,
//! everything else as strings.

use std::io::Write as _;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use i18n_resolver::config::{
    ConfigError,
    load_from_path,
};
use i18n_resolver::fetch::is_remote_url;
use i18n_resolver::{
    FetchError,
    FsFetcher,
    HttpFetcher,
    I18nError,
    MemoryStore,
    Registry,
    SessionDeps,
    TranslationFetcher,
};
use serde_json::Value;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Command failures, reported on stderr.
#[derive(Error, Debug)]
enum CliError {
    /// Wrong number of arguments
    #[error("usage: i18n-lookup <config.json> <lang> <key> [args...]")]
    Usage,

    /// Configuration path does not exist
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),

    /// Requested language is not configured
    #[error("Language {lang:?} is not supported (supported: {supported:?})")]
    Unsupported {
        /// Requested language
        lang: String,
        /// Configured languages
        supported: Vec<String>,
    },

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// HTTP client setup failure
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Session construction failure
    #[error(transparent)]
    Session(#[from] I18nError),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(text) => {
            if writeln!(std::io::stdout().lock(), "{text}").is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            tracing::error!("{error}");
            ExitCode::FAILURE
        }
    }
}

/// Resolves one key as described by the command line.
async fn run(args: &[String]) -> Result<String, CliError> {
    let [config_path, lang, key, rest @ ..] = args else {
        return Err(CliError::Usage);
    };

    let config_path = Path::new(config_path);
    let config = load_from_path(config_path)?
        .ok_or_else(|| CliError::ConfigNotFound(config_path.display().to_string()))?;

    let fetcher: Arc<dyn TranslationFetcher> = if is_remote_url(&config.assets_url) {
        Arc::new(HttpFetcher::new()?)
    } else {
        Arc::new(FsFetcher)
    };

    let registry = Registry::global();
    let session = registry.initialize(config, SessionDeps::new(fetcher, Arc::new(MemoryStore::default())))?;
    if !session.is_supported(lang) {
        return Err(CliError::Unsupported { lang: lang.clone(), supported: session.get_language_support() });
    }

    session.set_language(lang);
    futures::join!(session.wait_until_loaded(lang), session.wait_until_loaded(session.fallback_lang()));

    let args: Vec<Value> = rest.iter().map(|arg| parse_arg(arg)).collect();
    let text = session.get(key, &args);
    registry.reset();
    Ok(text)
}

/// Parses a command-line argument as JSON, falling back to a plain string.
fn parse_arg(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}
