//! Per-language bundle loading.
//!
//! Each language goes through `Unrequested -> InFlight -> Loaded`. The request
//! cache is keyed by language code and holds a [`Shared`] future, so every
//! concurrent caller for the same language awaits the same fetch. A transport
//! failure is logged and loaded as an empty bundle; the request stays cached
//! (no retry) unless [`RetryPolicy::OnNextAccess`] is configured or the cache
//! is cleared.

use std::collections::{
    HashMap,
    HashSet,
};
use std::sync::atomic::{
    AtomicBool,
    Ordering,
};
use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    PoisonError,
    Weak,
};

use futures::FutureExt;
use futures::future::{
    BoxFuture,
    Shared,
};
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::bundle::{
    BundleStore,
    LanguageBundle,
    TranslationData,
    flatten_json,
};
use crate::config::I18nConfig;
use crate::error::I18nError;
use crate::fetch::{
    TranslationFetcher,
    bundle_url,
};

/// What to do with a language whose load failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RetryPolicy {
    /// Keep the empty bundle until the request cache is cleared.
    #[default]
    Never,
    /// Fetch again the next time the language is requested.
    OnNextAccess,
}

/// Load state of one language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Not stored and no request cached
    Unrequested,
    /// A fetch is running
    InFlight,
    /// A bundle is stored (empty if the fetch failed)
    Loaded,
}

/// Outcome of one bundle load.
#[derive(Debug, Clone)]
pub struct BundleLoadResult {
    /// Language code
    pub lang: String,
    /// Bundle built from the response (empty on failure)
    pub bundle: Arc<LanguageBundle>,
    /// The transport failed and `bundle` is the empty substitute
    pub failed: bool,
    /// The store was updated with `bundle`
    pub changed: bool,
}

/// Called with the language code after a load changed the store.
pub type ChangeHook = Arc<dyn Fn(&str) + Send + Sync>;

/// A deduplicated, cloneable load.
pub type LoadFuture = Shared<BoxFuture<'static, BundleLoadResult>>;

/// Loads bundles into a [`BundleStore`].
#[derive(Clone)]
pub struct Loader {
    /// Shared with in-flight loads
    inner: Arc<LoaderInner>,
}

/// State shared between the loader handle and in-flight loads.
struct LoaderInner {
    /// Base of `{assets_url}/{lang}.json`
    assets_url: String,
    /// Flatten nested bundles with this separator
    key_separator: Option<String>,
    /// Failed-load policy
    retry: RetryPolicy,
    /// Bundle transport
    fetcher: Arc<dyn TranslationFetcher>,
    /// Destination of completed loads
    store: Arc<BundleStore>,
    /// Runtime captured at construction, used to drive loads
    runtime: Handle,
    /// Fired after a load changed the store
    on_change: ChangeHook,
    /// Request cache, keyed by language code
    requests: Mutex<HashMap<String, LoadFuture>>,
    /// Languages this loader has fetched at least once, cleared cache included
    fetched: Mutex<HashSet<String>>,
    /// Spawned drivers, aborted on dispose
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Set by dispose; late results are dropped
    closed: AtomicBool,
}

/// Locks a mutex, ignoring poisoning.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Loader {
    /// Creates a loader bound to the current tokio runtime.
    ///
    /// # Errors
    /// [`I18nError::MissingRuntime`] when called outside a runtime.
    pub fn new(
        config: &I18nConfig,
        fetcher: Arc<dyn TranslationFetcher>,
        store: Arc<BundleStore>,
        on_change: ChangeHook,
    ) -> Result<Self, I18nError> {
        let runtime = Handle::try_current().map_err(|_| I18nError::MissingRuntime)?;

        Ok(Self {
            inner: Arc::new(LoaderInner {
                assets_url: config.assets_url.clone(),
                key_separator: config.key_separator.clone(),
                retry: config.retry,
                fetcher,
                store,
                runtime,
                on_change,
                requests: Mutex::new(HashMap::new()),
                fetched: Mutex::new(HashSet::new()),
                tasks: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Starts loading `lang` in the background unless a request for it is cached.
    ///
    /// A bundle placed in the store directly, without ever being fetched by
    /// this loader, also counts as loaded. After [`Self::clear_requests`] the
    /// next call fetches again.
    pub fn ensure_loaded(&self, lang: &str) {
        if self.is_closed() {
            return;
        }
        if self.inner.store.has(lang) && !lock(&self.inner.fetched).contains(lang) {
            return;
        }

        let (load, created) = self.request(lang);
        if created {
            let handle = self.inner.runtime.spawn(async move {
                load.await;
            });
            let mut tasks = lock(&self.inner.tasks);
            tasks.retain(|task| !task.is_finished());
            tasks.push(handle);
        }
    }

    /// Returns the shared load for `lang`, starting one if none is cached.
    ///
    /// The returned future merges the result into the store when it completes,
    /// so awaiting it guarantees the store reflects the load. After
    /// [`Self::dispose`] it resolves immediately without fetching.
    pub fn fetch_and_cache(&self, lang: &str) -> LoadFuture {
        if self.is_closed() {
            return futures::future::ready(BundleLoadResult {
                lang: lang.to_string(),
                bundle: Arc::default(),
                failed: false,
                changed: false,
            })
            .boxed()
            .shared();
        }
        self.request(lang).0
    }

    /// Current state of `lang`.
    #[must_use]
    pub fn load_state(&self, lang: &str) -> LoadState {
        match lock(&self.inner.requests).get(lang) {
            Some(load) if load.peek().is_none() => LoadState::InFlight,
            Some(_) => LoadState::Loaded,
            None if self.inner.store.has(lang) => LoadState::Loaded,
            None => LoadState::Unrequested,
        }
    }

    /// Forgets every cached request so the next access fetches again.
    pub fn clear_requests(&self) {
        lock(&self.inner.requests).clear();
    }

    /// Stops delivering results and aborts background loads.
    pub fn dispose(&self) {
        self.inner.closed.store(true, Ordering::Release);
        for task in lock(&self.inner.tasks).drain(..) {
            task.abort();
        }
        self.clear_requests();
    }

    /// Returns true after [`Self::dispose`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Looks up or creates the request for `lang`. The flag is true when a new request was created.
    fn request(&self, lang: &str) -> (LoadFuture, bool) {
        let mut requests = lock(&self.inner.requests);

        if let Some(existing) = requests.get(lang) {
            let failed = existing.peek().is_some_and(|result| result.failed);
            if !(failed && self.inner.retry == RetryPolicy::OnNextAccess) {
                return (existing.clone(), false);
            }
            tracing::debug!(lang, "Retrying failed bundle load");
        }

        let load = self.inner.start_load(Arc::downgrade(&self.inner), lang);
        requests.insert(lang.to_string(), load.clone());
        lock(&self.inner.fetched).insert(lang.to_string());
        (load, true)
    }
}

impl LoaderInner {
    /// Builds the load future for `lang`. It holds only a weak reference back to the loader.
    fn start_load(&self, this: Weak<Self>, lang: &str) -> LoadFuture {
        let fetcher = Arc::clone(&self.fetcher);
        let url = bundle_url(&self.assets_url, lang);
        let key_separator = self.key_separator.clone();
        let lang = lang.to_string();

        async move {
            tracing::debug!(%lang, %url, "Loading translation bundle");
            let (data, failed) = match fetcher.fetch_json(&url).await {
                Ok(data) => (data, false),
                Err(error) => {
                    tracing::warn!(%lang, %url, %error, "Failed to load translations; using an empty bundle");
                    (TranslationData::new(), true)
                }
            };

            let data = match key_separator {
                Some(separator) => flatten_json(&Value::Object(data), &separator),
                None => data,
            };
            let bundle = Arc::new(LanguageBundle::from_data(data));
            let changed = this.upgrade().is_some_and(|inner| inner.merge(&lang, &bundle));

            BundleLoadResult { lang, bundle, failed, changed }
        }
        .boxed()
        .shared()
    }

    /// Stores a completed load and fires the change hook when it changed the store.
    fn merge(&self, lang: &str, bundle: &Arc<LanguageBundle>) -> bool {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(lang, "Loader disposed; dropping loaded bundle");
            return false;
        }

        let changed = self.store.merge(lang, Arc::clone(bundle));
        if changed {
            tracing::debug!(lang, keys = bundle.len(), "Translation bundle updated");
            (self.on_change)(lang);
        }
        changed
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("assets_url", &self.inner.assets_url)
            .field("key_separator", &self.inner.key_separator)
            .field("retry", &self.inner.retry)
            .field("fetcher", &self.inner.fetcher)
            .field("requests", &"<HashMap<String, LoadFuture>>")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use googletest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::test_utils::MockFetcher;

    /// Loader plus the number of times its change hook fired.
    struct Harness {
        loader: Loader,
        store: Arc<BundleStore>,
        fetcher: Arc<MockFetcher>,
        changes: Arc<AtomicUsize>,
    }

    fn harness(config: &I18nConfig, fetcher: MockFetcher) -> Harness {
        let fetcher = Arc::new(fetcher);
        let store = Arc::new(BundleStore::new(config.change_detection));
        let changes = Arc::new(AtomicUsize::new(0));
        let hook: ChangeHook = {
            let changes = Arc::clone(&changes);
            Arc::new(move |_: &str| {
                changes.fetch_add(1, Ordering::SeqCst);
            })
        };
        let loader = Loader::new(config, fetcher.clone(), Arc::clone(&store), hook).unwrap();
        Harness { loader, store, fetcher, changes }
    }

    fn config() -> I18nConfig {
        I18nConfig::new("/i18n")
    }

    #[tokio::test]
    async fn ensure_loaded_fetches_and_merges() {
        let h = harness(
            &config(),
            MockFetcher::new().with_response("/i18n/en.json", json!({"welcome": "Welcome"})),
        );

        assert_that!(h.loader.load_state("en"), eq(LoadState::Unrequested));

        h.loader.ensure_loaded("en");
        let result = h.loader.fetch_and_cache("en").await;

        assert_that!(result.failed, eq(false));
        assert_that!(result.changed, eq(true));
        assert_that!(h.loader.load_state("en"), eq(LoadState::Loaded));
        assert_that!(h.store.get("en").unwrap().render("welcome", &[]), some(eq("Welcome")));
        assert_that!(h.changes.load(Ordering::SeqCst), eq(1));
        assert_that!(h.fetcher.calls(), elements_are![eq("/i18n/en.json")]);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let fetcher = MockFetcher::new().with_response("/i18n/vi.json", json!({"a": "A"}));
        let gate = fetcher.gate();
        let h = harness(&config(), fetcher);

        h.loader.ensure_loaded("vi");
        h.loader.ensure_loaded("vi");
        let first = h.loader.fetch_and_cache("vi");
        let second = h.loader.fetch_and_cache("vi");
        tokio::task::yield_now().await;

        assert_that!(h.loader.load_state("vi"), eq(LoadState::InFlight));

        gate.add_permits(8);
        let (first, second) = futures::join!(first, second);

        assert_that!(h.fetcher.call_count("/i18n/vi.json"), eq(1));
        assert_that!(Arc::ptr_eq(&first.bundle, &second.bundle), eq(true));
        assert_that!(h.changes.load(Ordering::SeqCst), eq(1));
    }

    #[tokio::test]
    async fn failure_degrades_to_empty_bundle_without_retry() {
        let h = harness(&config(), MockFetcher::new());

        h.loader.ensure_loaded("vi");
        let result = h.loader.fetch_and_cache("vi").await;

        assert_that!(result.failed, eq(true));
        assert_that!(result.bundle.is_empty(), eq(true));
        assert_that!(h.store.has("vi"), eq(true));

        h.loader.ensure_loaded("vi");
        h.loader.fetch_and_cache("vi").await;

        assert_that!(h.fetcher.call_count("/i18n/vi.json"), eq(1));
    }

    #[tokio::test]
    async fn retry_on_next_access_fetches_again() {
        let config = I18nConfig { retry: RetryPolicy::OnNextAccess, ..config() };
        let h = harness(&config, MockFetcher::new());

        h.loader.ensure_loaded("vi");
        h.loader.fetch_and_cache("vi").await;
        h.fetcher.set_response("/i18n/vi.json", json!({"a": "A"}));

        h.loader.ensure_loaded("vi");
        let result = h.loader.fetch_and_cache("vi").await;

        assert_that!(h.fetcher.call_count("/i18n/vi.json"), eq(2));
        assert_that!(result.failed, eq(false));
        assert_that!(h.store.get("vi").unwrap().render("a", &[]), some(eq("A")));
    }

    #[tokio::test]
    async fn unchanged_reload_does_not_fire_hook() {
        let h = harness(
            &config(),
            MockFetcher::new().with_response("/i18n/en.json", json!({"a": "A"})),
        );

        h.loader.fetch_and_cache("en").await;
        h.loader.clear_requests();
        let result = h.loader.fetch_and_cache("en").await;

        assert_that!(h.fetcher.call_count("/i18n/en.json"), eq(2));
        assert_that!(result.changed, eq(false));
        assert_that!(h.changes.load(Ordering::SeqCst), eq(1));
    }

    #[tokio::test]
    async fn ensure_loaded_skips_stored_language() {
        let h = harness(&config(), MockFetcher::new());
        h.store.set("en", Arc::new(LanguageBundle::default()));

        h.loader.ensure_loaded("en");

        assert_that!(h.fetcher.calls(), is_empty());
        assert_that!(h.loader.load_state("en"), eq(LoadState::Loaded));
    }

    #[tokio::test]
    async fn dispose_drops_late_results() {
        let fetcher = MockFetcher::new().with_response("/i18n/en.json", json!({"a": "A"}));
        let gate = fetcher.gate();
        let h = harness(&config(), fetcher);

        let pending = h.loader.fetch_and_cache("en");
        h.loader.dispose();
        gate.add_permits(1);
        let result = pending.await;

        assert_that!(result.changed, eq(false));
        assert_that!(h.store.has("en"), eq(false));
        assert_that!(h.changes.load(Ordering::SeqCst), eq(0));
        assert_that!(h.loader.load_state("en"), eq(LoadState::Unrequested));

        h.loader.ensure_loaded("en");
        assert_that!(h.loader.load_state("en"), eq(LoadState::Unrequested));
    }

    #[tokio::test]
    async fn fetch_after_dispose_is_ready_without_transport() {
        let h = harness(
            &config(),
            MockFetcher::new().with_response("/i18n/vi.json", json!({"a": "A"})),
        );
        h.loader.dispose();

        let result = h.loader.fetch_and_cache("vi").await;

        assert_that!(result.changed, eq(false));
        assert_that!(result.bundle.is_empty(), eq(true));
        assert_that!(h.fetcher.calls(), is_empty());
        assert_that!(h.loader.load_state("vi"), eq(LoadState::Unrequested));
    }

    #[tokio::test]
    async fn cleared_requests_make_failed_language_loadable_again() {
        let h = harness(&config(), MockFetcher::new());
        h.loader.ensure_loaded("vi");
        let failed = h.loader.fetch_and_cache("vi").await;
        assert_that!(failed.failed, eq(true));

        h.fetcher.set_response("/i18n/vi.json", json!({"a": "A"}));
        h.loader.ensure_loaded("vi");
        h.loader.fetch_and_cache("vi").await;
        assert_that!(h.fetcher.call_count("/i18n/vi.json"), eq(1));

        h.loader.clear_requests();
        h.loader.ensure_loaded("vi");
        let result = h.loader.fetch_and_cache("vi").await;

        assert_that!(h.fetcher.call_count("/i18n/vi.json"), eq(2));
        assert_that!(result.failed, eq(false));
        assert_that!(h.store.get("vi").unwrap().render("a", &[]), some(eq("A")));
    }

    #[tokio::test]
    async fn key_separator_flattens_nested_bundles() {
        let config = I18nConfig { key_separator: Some(".".to_string()), ..config() };
        let h = harness(
            &config,
            MockFetcher::new().with_response("/i18n/en.json", json!({"home": {"title": "Home"}})),
        );

        h.loader.fetch_and_cache("en").await;

        assert_that!(h.store.get("en").unwrap().render("home.title", &[]), some(eq("Home")));
    }

    #[googletest::test]
    fn new_outside_runtime_fails() {
        let result = Loader::new(
            &config(),
            Arc::new(MockFetcher::new()),
            Arc::new(BundleStore::default()),
            Arc::new(|_: &str| {}),
        );

        expect_that!(matches!(result, Err(I18nError::MissingRuntime)), eq(true));
    }
}
