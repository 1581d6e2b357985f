//! Reactive translation handles.
//!
//! A [`Projection`] exposes resolution results as push-updated values backed by
//! `tokio::sync::watch`. Handles are cached by `(key, args)`; whenever the
//! current language or a bundle changes, [`Projection::refresh`] recomputes
//! every observed handle and evicts the ones nobody holds anymore.

use std::collections::HashMap;
use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    PoisonError,
};

use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use tokio::sync::watch;

use crate::bundle::BundleStore;
use crate::resolve::resolve;

/// Separator between the key and the serialised arguments in a cache key.
const CACHE_KEY_SEPARATOR: char = '\u{1f}';

/// Derives the handle cache key for `(key, args)`.
///
/// Arguments are serialised as a JSON array so that `["a,b"]` and `["a", "b"]`
/// never collide.
#[must_use]
pub fn cache_key(key: &str, args: &[Value]) -> String {
    let args = serde_json::to_string(args).unwrap_or_default();
    format!("{key}{CACHE_KEY_SEPARATOR}{args}")
}

/// A read-only, push-updated translation.
#[derive(Debug, Clone)]
pub struct TranslationSignal {
    /// Subscription to one cached handle
    receiver: watch::Receiver<String>,
}

impl TranslationSignal {
    /// Current value.
    #[must_use]
    pub fn get(&self) -> String {
        self.receiver.borrow().clone()
    }

    /// Waits for the next value. Returns `None` once the session is disposed.
    pub async fn changed(&mut self) -> Option<String> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Waits until the value satisfies `predicate` (checked immediately first).
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&str) -> bool) -> Option<String> {
        self.receiver.wait_for(|value| predicate(value)).await.ok().map(|value| value.clone())
    }

    /// Returns true if both signals are backed by the same cached handle.
    #[must_use]
    pub fn shares_handle_with(&self, other: &Self) -> bool {
        self.receiver.same_channel(&other.receiver)
    }

    /// Returns false once the owning session dropped the handle.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.receiver.has_changed().is_ok()
    }

    /// Converts into a stream that yields the current value, then each distinct new value.
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, String> {
        futures::stream::unfold((self.receiver, None::<String>), |(mut receiver, last)| async move {
            loop {
                if last.is_some() && receiver.changed().await.is_err() {
                    return None;
                }
                let value = receiver.borrow_and_update().clone();
                if last.as_ref() != Some(&value) {
                    return Some((value.clone(), (receiver, Some(value))));
                }
            }
        })
        .boxed()
    }
}

/// One cached derived value.
#[derive(Debug)]
struct CachedHandle {
    /// Translation key
    key: String,
    /// Placeholder arguments
    args: Vec<Value>,
    /// Publishes the resolved text
    sender: watch::Sender<String>,
}

/// Resolution exposed as cached reactive handles.
#[derive(Debug)]
pub struct Projection {
    /// Bundles to resolve against
    store: Arc<BundleStore>,
    /// Current language, owned by the session
    current_lang: watch::Receiver<String>,
    /// Language consulted on a miss
    fallback_lang: Option<String>,
    /// Cache key → handle
    handles: Mutex<HashMap<String, CachedHandle>>,
}

impl Projection {
    /// Creates an empty handle cache over `store`, following `current_lang`.
    #[must_use]
    pub fn new(
        store: Arc<BundleStore>,
        current_lang: watch::Receiver<String>,
        fallback_lang: Option<String>,
    ) -> Self {
        Self { store, current_lang, fallback_lang, handles: Mutex::new(HashMap::new()) }
    }

    /// Locks the handle cache, ignoring poisoning.
    fn handles(&self) -> MutexGuard<'_, HashMap<String, CachedHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves against the current state without creating a handle.
    #[must_use]
    pub fn resolve(&self, key: &str, args: &[Value]) -> String {
        let current = self.current_lang.borrow().clone();
        resolve(&self.store, key, &current, self.fallback_lang.as_deref(), args)
    }

    /// Returns the cached handle for `(key, args)`, creating it on first use.
    pub fn signal(&self, key: &str, args: &[Value]) -> TranslationSignal {
        let mut handles = self.handles();
        let cache_key = cache_key(key, args);

        if let Some(handle) = handles.get(&cache_key) {
            return TranslationSignal { receiver: handle.sender.subscribe() };
        }

        let (sender, receiver) = watch::channel(self.resolve(key, args));
        handles.insert(cache_key, CachedHandle { key: key.to_string(), args: args.to_vec(), sender });
        TranslationSignal { receiver }
    }

    /// Stream variant of [`Self::signal`].
    pub fn observable(&self, key: &str, args: &[Value]) -> BoxStream<'static, String> {
        self.signal(key, args).into_stream()
    }

    /// Recomputes every observed handle and evicts unobserved ones.
    ///
    /// Handles whose resolved text did not change emit nothing. Returns the
    /// number of handles kept.
    pub fn refresh(&self) -> usize {
        let mut handles = self.handles();
        // Read under the lock so concurrent refreshes apply in language order.
        let current = self.current_lang.borrow().clone();
        let fallback = self.fallback_lang.as_deref();
        let before = handles.len();

        handles.retain(|_, handle| {
            if handle.sender.receiver_count() == 0 {
                return false;
            }
            let next = resolve(&self.store, &handle.key, &current, fallback, &handle.args);
            handle.sender.send_if_modified(|value| {
                if *value == next {
                    false
                } else {
                    *value = next;
                    true
                }
            });
            true
        });

        tracing::debug!(
            lang = %current,
            kept = handles.len(),
            evicted = before - handles.len(),
            "Refreshed translation handles"
        );
        handles.len()
    }

    /// Drops every handle; outstanding signals stop updating and streams end.
    pub fn clear(&self) {
        self.handles().clear();
    }

    /// Number of cached handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles().len()
    }

    /// Returns true if no handle is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles().is_empty()
    }
}
