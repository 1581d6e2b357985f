//! Storage for the user's language choice.

use std::collections::HashMap;
use std::path::{
    Path,
    PathBuf,
};
use std::sync::{
    Mutex,
    PoisonError,
};

use serde_json::{
    Map,
    Value,
};

/// Key-value storage that survives across sessions.
///
/// Implementations must not fail loudly: a broken store only means the
/// preference is forgotten.
pub trait LanguageStore: Send + Sync + std::fmt::Debug {
    /// Returns the stored value for `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`.
    fn set(&self, key: &str, value: &str);
}

/// Process-local store, mostly for tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Stored values
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates a store pre-populated with one value.
    #[must_use]
    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::default();
        store.set(key, value);
        store
    }
}

impl LanguageStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }
}

/// Stores values in a flat JSON object file.
#[derive(Debug)]
pub struct FileStore {
    /// JSON file path
    path: PathBuf,
    /// Serialises read-modify-write cycles within the process
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Creates a store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole file; a missing or unreadable file counts as empty.
    fn read_all(&self) -> Map<String, Value> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Map::new(),
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "Failed to read language store");
                return Map::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                tracing::warn!(path = %self.path.display(), "Language store is not a JSON object; ignoring it");
                Map::new()
            }
        }
    }

    /// Writes the whole file.
    fn write_all(&self, values: &Map<String, Value>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, content)
    }
}

impl LanguageStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_all().get(key).and_then(Value::as_str).map(str::to_string)
    }

    fn set(&self, key: &str, value: &str) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut values = self.read_all();
        values.insert(key.to_string(), Value::String(value.to_string()));
        if let Err(error) = self.write_all(&values) {
            tracing::warn!(path = %self.path.display(), %error, "Failed to persist language choice");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use googletest::prelude::*;
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    #[rstest]
    fn memory_store_round_trip() {
        let store = MemoryStore::default();

        assert_that!(store.get("csp-lang"), none());

        store.set("csp-lang", "vi");

        assert_that!(store.get("csp-lang"), some(eq("vi")));
    }

    #[rstest]
    fn memory_store_with_value() {
        let store = MemoryStore::with_value("csp-lang", "en");

        assert_that!(store.get("csp-lang"), some(eq("en")));
    }

    /// `FileStore`: 存在しないファイルは空として扱う
    #[rstest]
    fn file_store_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("prefs.json"));

        assert_that!(store.get("csp-lang"), none());
    }

    /// `FileStore`: 書き込んだ値はプレーンな文字列として保存される
    #[rstest]
    fn file_store_persists_plain_string() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("prefs.json");
        let store = FileStore::new(&path);

        store.set("csp-lang", "vi");

        assert_that!(store.get("csp-lang"), some(eq("vi")));
        let reopened = FileStore::new(&path);
        assert_that!(reopened.get("csp-lang"), some(eq("vi")));

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_that!(raw.get("csp-lang"), some(eq(&Value::String("vi".to_string()))));
    }

    /// `FileStore`: 他のキーは保持される
    #[rstest]
    fn file_store_keeps_other_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prefs.json");
        fs::write(&path, r#"{"theme": "dark"}"#).unwrap();
        let store = FileStore::new(&path);

        store.set("csp-lang", "en");

        assert_that!(store.get("theme"), some(eq("dark")));
        assert_that!(store.get("csp-lang"), some(eq("en")));
    }

    /// `FileStore`: 壊れたファイルは無視する
    #[rstest]
    fn file_store_ignores_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prefs.json");
        fs::write(&path, "invalid json").unwrap();
        let store = FileStore::new(&path);

        assert_that!(store.get("csp-lang"), none());

        store.set("csp-lang", "vi");

        assert_that!(store.get("csp-lang"), some(eq("vi")));
    }
}
