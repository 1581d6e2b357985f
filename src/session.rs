//! The public localization session.
//!
//! [`I18nSession`] owns the language state, the bundle store, the loader and
//! the handle cache. A language change persists the choice, loads the bundle
//! and refreshes every observed handle; a bundle change refreshes the handles
//! and notifies the registered callbacks.

use std::collections::HashMap;
use std::panic::{
    AssertUnwindSafe,
    catch_unwind,
};
use std::sync::atomic::{
    AtomicBool,
    AtomicU64,
    Ordering,
};
use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    OnceLock,
    PoisonError,
    RwLock,
    Weak,
};

use futures::stream::BoxStream;
use serde_json::Value;
use tokio::sync::watch;

use crate::bundle::BundleStore;
use crate::config::{
    ConfigError,
    I18nConfig,
};
use crate::error::I18nError;
use crate::fetch::TranslationFetcher;
use crate::loader::{
    ChangeHook,
    LoadFuture,
    LoadState,
    Loader,
};
use crate::persist::LanguageStore;
use crate::reactive::{
    Projection,
    TranslationSignal,
};

/// Collaborators injected into a session.
#[derive(Debug, Clone)]
pub struct SessionDeps {
    /// Bundle transport
    pub fetcher: Arc<dyn TranslationFetcher>,
    /// Language preference storage
    pub storage: Arc<dyn LanguageStore>,
}

impl SessionDeps {
    /// Bundles the transport and the preference storage.
    #[must_use]
    pub const fn new(fetcher: Arc<dyn TranslationFetcher>, storage: Arc<dyn LanguageStore>) -> Self {
        Self { fetcher, storage }
    }
}

/// Callback fired with the language whose bundle changed.
type ChangeCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// A localization session. Cloning shares the same session.
#[derive(Clone)]
pub struct I18nSession {
    /// Shared state
    inner: Arc<SessionInner>,
}

/// Session state shared by clones and by the loader's change hook.
struct SessionInner {
    /// Validated configuration
    config: I18nConfig,
    /// Current language; receivers are the projection and `current_lang_signal` callers
    current_lang: watch::Sender<String>,
    /// Fixed at construction
    fallback_lang: String,
    /// Replaced wholesale by `set_language_support`
    supported: RwLock<Vec<String>>,
    /// Loaded bundles
    store: Arc<BundleStore>,
    /// Bundle loader
    loader: Loader,
    /// Reactive handle cache
    projection: Projection,
    /// Language preference storage
    storage: Arc<dyn LanguageStore>,
    /// Registration order is kept
    callbacks: Mutex<Vec<(u64, ChangeCallback)>>,
    /// Id for the next `on_changed_language` registration
    next_callback_id: AtomicU64,
    /// Set by `dispose`
    disposed: AtomicBool,
}

/// Locks a mutex, ignoring poisoning.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl I18nSession {
    /// Creates a session.
    ///
    /// The initial language is the persisted choice (or, when nothing is
    /// persisted, the configured default) if supported, else the first
    /// supported language.
    /// Loading of the initial and fallback bundles starts immediately.
    ///
    /// # Errors
    /// - [`I18nError::Config`] when the configuration is invalid
    /// - [`I18nError::MissingRuntime`] outside a tokio runtime
    pub fn new(config: I18nConfig, deps: SessionDeps) -> Result<Self, I18nError> {
        config.validate().map_err(ConfigError::Invalid)?;
        let SessionDeps { fetcher, storage } = deps;

        let preferred = storage
            .get(&config.storage_key)
            .unwrap_or_else(|| config.default_language.clone());
        let supported = if config.language_supported.is_empty() {
            vec![config.default_language.clone()]
        } else {
            config.language_supported.clone()
        };
        let initial_lang = if supported.contains(&preferred) {
            preferred
        } else {
            supported.first().cloned().unwrap_or_else(|| config.default_language.clone())
        };
        let fallback_lang =
            config.fallback_language.clone().unwrap_or_else(|| initial_lang.clone());

        let store = Arc::new(BundleStore::new(config.change_detection));
        let (current_lang, current_rx) = watch::channel(initial_lang.clone());
        let projection =
            Projection::new(Arc::clone(&store), current_rx, Some(fallback_lang.clone()));

        let session_ref: Arc<OnceLock<Weak<SessionInner>>> = Arc::default();
        let hook: ChangeHook = {
            let session_ref = Arc::clone(&session_ref);
            Arc::new(move |lang: &str| {
                if let Some(inner) = session_ref.get().and_then(Weak::upgrade) {
                    inner.handle_bundle_change(lang);
                }
            })
        };
        let loader = Loader::new(&config, fetcher, Arc::clone(&store), hook)?;

        tracing::debug!(
            lang = %initial_lang,
            fallback = %fallback_lang,
            ?supported,
            "Creating i18n session"
        );

        let inner = Arc::new(SessionInner {
            config,
            current_lang,
            fallback_lang,
            supported: RwLock::new(supported),
            store,
            loader,
            projection,
            storage,
            callbacks: Mutex::new(Vec::new()),
            next_callback_id: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        });
        let _ = session_ref.set(Arc::downgrade(&inner));

        inner.apply_language(&initial_lang);
        Ok(Self { inner })
    }

    /// Switches the current language.
    ///
    /// Unsupported codes are ignored with a warning; setting the current
    /// language again does nothing, as does any call after [`Self::dispose`].
    pub fn set_language(&self, lang: &str) {
        if self.is_disposed() {
            tracing::debug!(lang, "Session disposed; ignoring language change");
            return;
        }
        if !self.is_supported(lang) {
            tracing::warn!(lang, supported = ?self.get_language_support(), "Unsupported language; ignoring");
            return;
        }

        let changed = self.inner.current_lang.send_if_modified(|current| {
            if current.as_str() == lang {
                false
            } else {
                lang.clone_into(current);
                true
            }
        });
        if changed {
            tracing::debug!(lang, "Language changed");
            self.inner.apply_language(lang);
        }
    }

    /// Replaces the supported-language list. An empty list is ignored with a warning.
    pub fn set_language_support<I, S>(&self, langs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let langs: Vec<String> = langs.into_iter().map(Into::into).collect();
        if langs.is_empty() {
            tracing::warn!("Empty supported-language list; keeping the current one");
            return;
        }
        *self.inner.supported.write().unwrap_or_else(PoisonError::into_inner) = langs;
    }

    /// Copy of the supported-language list.
    #[must_use]
    pub fn get_language_support(&self) -> Vec<String> {
        self.inner.supported.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns true if `lang` is in the supported-language list.
    #[must_use]
    pub fn is_supported(&self, lang: &str) -> bool {
        self.inner
            .supported
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|supported| supported == lang)
    }

    /// Language currently used for lookups.
    #[must_use]
    pub fn get_current_lang(&self) -> String {
        self.inner.current_lang.borrow().clone()
    }

    /// Language consulted when the current bundle misses a key.
    #[must_use]
    pub fn fallback_lang(&self) -> &str {
        &self.inner.fallback_lang
    }

    /// Configuration the session was built from.
    #[must_use]
    pub fn config(&self) -> &I18nConfig {
        &self.inner.config
    }

    /// Resolves `key` against the bundles loaded so far. Never triggers a load.
    #[must_use]
    pub fn get(&self, key: &str, args: &[Value]) -> String {
        self.inner.projection.resolve(key, args)
    }

    /// Push-updated translation; identical `(key, args)` share one handle.
    #[must_use]
    pub fn get_signal(&self, key: &str, args: &[Value]) -> TranslationSignal {
        self.inner.projection.signal(key, args)
    }

    /// Stream of distinct translations, starting with the current one.
    #[must_use]
    pub fn get_observable(&self, key: &str, args: &[Value]) -> BoxStream<'static, String> {
        self.inner.projection.observable(key, args)
    }

    /// Subscribes to the current language.
    #[must_use]
    pub fn current_lang_signal(&self) -> watch::Receiver<String> {
        self.inner.current_lang.subscribe()
    }

    /// Subscribes to the bundle store revision, bumped on each content change.
    #[must_use]
    pub fn bundle_revision(&self) -> watch::Receiver<u64> {
        self.inner.store.revision()
    }

    /// Returns true if `key` exists in the current or the fallback bundle.
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        let current = self.get_current_lang();
        [current.as_str(), self.fallback_lang()]
            .into_iter()
            .any(|lang| self.inner.store.get(lang).is_some_and(|bundle| bundle.get(key).is_some()))
    }

    /// String entries of a loaded bundle.
    #[must_use]
    pub fn translations_for(&self, lang: &str) -> Option<HashMap<String, String>> {
        self.inner.store.get(lang).map(|bundle| bundle.to_strings())
    }

    /// Returns true once a bundle for `lang` is stored, even an empty one from a failed load.
    #[must_use]
    pub fn is_loaded(&self, lang: &str) -> bool {
        self.inner.store.has(lang)
    }

    /// Load state of `lang`.
    #[must_use]
    pub fn load_state(&self, lang: &str) -> LoadState {
        self.inner.loader.load_state(lang)
    }

    /// Awaitable load of `lang`, shared with any load already in flight.
    #[must_use]
    pub fn wait_until_loaded(&self, lang: &str) -> LoadFuture {
        self.inner.loader.fetch_and_cache(lang)
    }

    /// Forgets cached requests so that the next language change fetches again.
    pub fn clear_request_cache(&self) {
        self.inner.loader.clear_requests();
    }

    /// Registers a callback fired with the language code whenever bundle data changes.
    ///
    /// A panicking callback is logged and does not affect the others.
    pub fn on_changed_language<F>(&self, callback: F) -> ChangeSubscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = self.inner.next_callback_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.callbacks).push((id, Arc::new(callback)));
        ChangeSubscription { id, session: Arc::downgrade(&self.inner) }
    }

    /// Releases loads, bundles, cached handles and callbacks. Safe to call twice.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.loader.dispose();
        self.inner.store.clear();
        self.inner.projection.clear();
        lock(&self.inner.callbacks).clear();
        tracing::debug!("i18n session disposed");
    }

    /// Returns true after [`Self::dispose`].
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl SessionInner {
    /// Effects of a language change: persist, load, refresh.
    fn apply_language(&self, lang: &str) {
        self.storage.set(&self.config.storage_key, lang);
        self.loader.ensure_loaded(lang);
        self.loader.ensure_loaded(&self.fallback_lang);
        self.projection.refresh();
    }

    /// Effects of a bundle change: refresh handles, notify callbacks.
    fn handle_bundle_change(&self, lang: &str) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        self.projection.refresh();

        let callbacks: Vec<ChangeCallback> =
            lock(&self.callbacks).iter().map(|(_, callback)| Arc::clone(callback)).collect();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(lang))).is_err() {
                tracing::warn!(lang, "Language change callback panicked");
            }
        }
    }
}

impl std::fmt::Debug for I18nSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("I18nSession")
            .field("current_lang", &self.get_current_lang())
            .field("fallback_lang", &self.inner.fallback_lang)
            .field("supported", &self.get_language_support())
            .field("loaded", &self.inner.store.languages())
            .field("callbacks", &lock(&self.inner.callbacks).len())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`I18nSession::on_changed_language`].
#[derive(Debug)]
pub struct ChangeSubscription {
    /// Registration id
    id: u64,
    /// Owning session
    session: Weak<SessionInner>,
}

impl ChangeSubscription {
    /// Deregisters the callback. Dropping the subscription without calling this keeps it registered.
    pub fn revoke(&self) {
        if let Some(inner) = self.session.upgrade() {
            lock(&inner.callbacks).retain(|(id, _)| *id != self.id);
        }
    }
}
