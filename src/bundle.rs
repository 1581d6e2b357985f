//! In-memory translation bundles, one per language.

use std::collections::HashMap;
use std::sync::{
    Arc,
    OnceLock,
    PoisonError,
    RwLock,
    RwLockReadGuard,
    RwLockWriteGuard,
};

use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Map,
    Value,
};
use tokio::sync::watch;

use crate::template::{
    Template,
    compile,
};

/// Raw bundle data as it arrives from the wire: a flat JSON object.
pub type TranslationData = Map<String, Value>;

/// A single key's value within one language's bundle.
///
/// The raw value is compiled into a [`Template`] on first use and the compiled
/// form is kept for the lifetime of the entry.
#[derive(Debug)]
pub struct TranslationEntry {
    /// Value as loaded.
    raw: Value,
    /// Compiled template; `None` inside the cell when the raw value is not a string.
    compiled: OnceLock<Option<Template>>,
}

impl TranslationEntry {
    /// Creates an uncompiled entry.
    #[must_use]
    pub const fn new(raw: Value) -> Self {
        Self { raw, compiled: OnceLock::new() }
    }

    /// Returns the compiled template, compiling it on first access.
    ///
    /// Non-string values have no template.
    pub fn template(&self) -> Option<&Template> {
        self.compiled.get_or_init(|| self.raw.as_str().map(compile)).as_ref()
    }

    /// Returns true once [`Self::template`] has been called.
    #[must_use]
    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    /// Raw value as loaded.
    #[must_use]
    pub const fn raw(&self) -> &Value {
        &self.raw
    }
}

/// All translations of one language.
#[derive(Debug, Default)]
pub struct LanguageBundle {
    /// Key to entry.
    entries: HashMap<String, TranslationEntry>,
}

impl LanguageBundle {
    /// Builds a bundle from raw data. Keys are taken verbatim; nested objects are not flattened.
    #[must_use]
    pub fn from_data(data: TranslationData) -> Self {
        let entries =
            data.into_iter().map(|(key, value)| (key, TranslationEntry::new(value))).collect();
        Self { entries }
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TranslationEntry> {
        self.entries.get(key)
    }

    /// Renders `key` with `args`.
    ///
    /// Returns `None` when the key is absent. An entry that is present but not a
    /// string renders as the key itself.
    #[must_use]
    pub fn render(&self, key: &str, args: &[Value]) -> Option<String> {
        let entry = self.entries.get(key)?;
        Some(entry.template().map_or_else(|| key.to_string(), |template| template.render(args)))
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the bundle has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the string-valued entries.
    #[must_use]
    pub fn to_strings(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .filter_map(|(key, entry)| entry.raw.as_str().map(|s| (key.clone(), s.to_string())))
            .collect()
    }

    /// Returns true if both bundles hold the same keys with the same raw values.
    fn same_content(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|(key, entry)| {
                other.entries.get(key).is_some_and(|theirs| theirs.raw == entry.raw)
            })
    }
}

/// Strategy used to decide whether freshly loaded data differs from the stored bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeDetection {
    /// Compare key counts only. Cheap, but misses edits that keep the count.
    KeyCount,
    /// Compare key counts and every raw value.
    #[default]
    Content,
}

impl ChangeDetection {
    /// Returns true if `next` should replace `previous`.
    #[must_use]
    pub fn differs(self, previous: Option<&Arc<LanguageBundle>>, next: &Arc<LanguageBundle>) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        if Arc::ptr_eq(previous, next) {
            return false;
        }
        match self {
            Self::KeyCount => previous.len() != next.len(),
            Self::Content => !previous.same_content(next),
        }
    }
}

/// Language code to bundle mapping owned by one session.
///
/// Bundles are replaced wholesale, so a reader holding an `Arc<LanguageBundle>`
/// never observes a partially populated bundle. Every replacement bumps the
/// store revision.
#[derive(Debug)]
pub struct BundleStore {
    /// Language code to bundle.
    bundles: RwLock<HashMap<String, Arc<LanguageBundle>>>,
    /// Strategy for [`Self::merge`].
    change_detection: ChangeDetection,
    /// Incremented on every content change.
    revision: watch::Sender<u64>,
}

impl Default for BundleStore {
    fn default() -> Self {
        Self::new(ChangeDetection::default())
    }
}

impl BundleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(change_detection: ChangeDetection) -> Self {
        Self {
            bundles: RwLock::new(HashMap::new()),
            change_detection,
            revision: watch::Sender::new(0),
        }
    }

    /// Read lock that survives poisoning; the map is only ever replaced entry-wise.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<LanguageBundle>>> {
        self.bundles.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write lock that survives poisoning.
    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<LanguageBundle>>> {
        self.bundles.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the bundle for `lang`.
    #[must_use]
    pub fn get(&self, lang: &str) -> Option<Arc<LanguageBundle>> {
        self.read().get(lang).cloned()
    }

    /// Replaces the bundle for `lang` unconditionally.
    pub fn set(&self, lang: &str, bundle: Arc<LanguageBundle>) {
        self.write().insert(lang.to_string(), bundle);
        self.revision.send_modify(|revision| *revision += 1);
    }

    /// Replaces the bundle for `lang` only if the configured [`ChangeDetection`]
    /// reports a difference. Returns whether the store changed.
    pub fn merge(&self, lang: &str, bundle: Arc<LanguageBundle>) -> bool {
        let changed = {
            let mut bundles = self.write();
            let changed = self.change_detection.differs(bundles.get(lang), &bundle);
            if changed {
                bundles.insert(lang.to_string(), bundle);
            }
            changed
        };

        if changed {
            self.revision.send_modify(|revision| *revision += 1);
        } else {
            tracing::debug!(lang, "Loaded bundle is unchanged; keeping the stored one");
        }
        changed
    }

    /// Returns true if a bundle for `lang` is stored.
    #[must_use]
    pub fn has(&self, lang: &str) -> bool {
        self.read().contains_key(lang)
    }

    /// Stored language codes, sorted.
    #[must_use]
    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<_> = self.read().keys().cloned().collect();
        languages.sort();
        languages
    }

    /// Removes every bundle.
    pub fn clear(&self) {
        let was_empty = {
            let mut bundles = self.write();
            let was_empty = bundles.is_empty();
            bundles.clear();
            was_empty
        };
        if !was_empty {
            self.revision.send_modify(|revision| *revision += 1);
        }
    }

    /// Subscribes to the content revision counter.
    #[must_use]
    pub fn revision(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Strategy used by [`Self::merge`].
    #[must_use]
    pub const fn change_detection(&self) -> ChangeDetection {
        self.change_detection
    }
}

/// Flatten a nested JSON object into dot-separated keys.
///
/// String leaves keep their value; other scalars are kept as JSON values and
/// array elements are addressed as `key[index]`.
///
/// # Examples
/// ```
/// use serde_json::json;
/// use i18n_resolver::bundle::flatten_json;
///
/// let json = json!({
///     "home": {
///         "title": "Home",
///         "subtitle": "Welcome back"
///     }
/// });
///
/// let flattened = flatten_json(&json, ".");
/// assert_eq!(flattened.get("home.title"), Some(&json!("Home")));
/// ```
#[must_use]
pub fn flatten_json(json: &Value, separator: &str) -> TranslationData {
    let mut result = TranslationData::new();
    flatten_json_value(json, separator, None, &mut result);
    result
}

/// Recursive step of [`flatten_json`].
fn flatten_json_value(
    json: &Value,
    separator: &str,
    prefix: Option<&str>,
    result: &mut TranslationData,
) {
    match json {
        Value::Object(map) => {
            for (key, value) in map {
                let full_key =
                    prefix.map_or_else(|| key.clone(), |p| format!("{p}{separator}{key}"));
                flatten_json_value(value, separator, Some(&full_key), result);
            }
        }
        Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                let full_key =
                    prefix.map_or_else(|| format!("[{index}]"), |p| format!("{p}[{index}]"));
                flatten_json_value(value, separator, Some(&full_key), result);
            }
        }
        _ => {
            if let Some(key) = prefix {
                result.insert(key.to_string(), json.clone());
            }
        }
    }
}
