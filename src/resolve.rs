//! Key resolution with language fallback.

use serde_json::Value;

use crate::bundle::BundleStore;

/// Resolves `key` to display text.
///
/// Tries the current language, then the fallback language (when set and
/// different), and finally returns the key itself. Never fails.
#[must_use]
pub fn resolve(
    store: &BundleStore,
    key: &str,
    current_lang: &str,
    fallback_lang: Option<&str>,
    args: &[Value],
) -> String {
    if let Some(text) = lookup(store, current_lang, key, args) {
        return text;
    }

    if let Some(fallback) = fallback_lang.filter(|lang| !lang.is_empty() && *lang != current_lang)
        && let Some(text) = lookup(store, fallback, key, args)
    {
        return text;
    }

    key.to_string()
}

/// Renders `key` from one language's bundle, if both exist.
fn lookup(store: &BundleStore, lang: &str, key: &str, args: &[Value]) -> Option<String> {
    store.get(lang)?.render(key, args)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use googletest::prelude::*;
    use rstest::*;
    use serde_json::json;

    use super::*;
    use crate::bundle::{
        LanguageBundle,
        TranslationData,
    };

    fn store_with(bundles: &[(&str, Value)]) -> BundleStore {
        let store = BundleStore::default();
        for (lang, value) in bundles {
            let data: TranslationData = value.as_object().cloned().unwrap_or_default();
            store.set(lang, Arc::new(LanguageBundle::from_data(data)));
        }
        store
    }

    #[fixture]
    fn store() -> BundleStore {
        store_with(&[
            ("en", json!({"welcome": "Welcome", "greet": "Hello, {{0}}!", "only_en": "English"})),
            ("vi", json!({"welcome": "Chào mừng", "greet": "Xin chào, {{0}}!"})),
        ])
    }

    #[rstest]
    fn current_language_hit(store: BundleStore) {
        assert_that!(resolve(&store, "welcome", "vi", Some("en"), &[]), eq("Chào mừng"));
    }

    #[rstest]
    fn current_language_renders_args(store: BundleStore) {
        assert_that!(resolve(&store, "greet", "vi", Some("en"), &[json!("An")]), eq("Xin chào, An!"));
    }

    #[rstest]
    fn falls_back_when_key_missing(store: BundleStore) {
        assert_that!(resolve(&store, "only_en", "vi", Some("en"), &[]), eq("English"));
    }

    #[rstest]
    fn falls_back_when_bundle_missing(store: BundleStore) {
        assert_that!(resolve(&store, "greet", "fr", Some("en"), &[json!("Jo")]), eq("Hello, Jo!"));
    }

    #[rstest]
    #[case::both_miss("nope", "vi", Some("en"))]
    #[case::no_fallback("only_en", "vi", None)]
    #[case::fallback_equals_current("only_en", "vi", Some("vi"))]
    #[case::empty_fallback("only_en", "vi", Some(""))]
    #[case::nothing_loaded("welcome", "fr", Some("de"))]
    fn key_is_last_resort(
        store: BundleStore,
        #[case] key: &str,
        #[case] current: &str,
        #[case] fallback: Option<&str>,
    ) {
        assert_that!(resolve(&store, key, current, fallback, &[]), eq(key));
    }

    #[googletest::test]
    fn non_string_entry_renders_key_without_fallback() {
        let store = store_with(&[("vi", json!({"n": 1})), ("en", json!({"n": "One"}))]);

        expect_that!(resolve(&store, "n", "vi", Some("en"), &[]), eq("n"));
    }

    #[googletest::test]
    fn empty_current_bundle_uses_fallback() {
        let store = store_with(&[("vi", json!({})), ("en", json!({"welcome": "Welcome"}))]);

        expect_that!(resolve(&store, "welcome", "vi", Some("en"), &[]), eq("Welcome"));
    }
}
