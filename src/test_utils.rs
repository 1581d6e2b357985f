//! テスト用ユーティリティ
//!
//! 複数のテストモジュールで使用される共通のヘルパーを提供します。
#![cfg(test)]
#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{
    Arc,
    Mutex,
};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::bundle::TranslationData;
use crate::config::I18nConfig;
use crate::fetch::{
    FetchError,
    TranslationFetcher,
};
use crate::persist::MemoryStore;
use crate::session::{
    I18nSession,
    SessionDeps,
};

/// In-memory transport that records every requested URL.
///
/// URLs without a registered response fail with a 404 status.
#[derive(Debug, Default)]
pub(crate) struct MockFetcher {
    /// URL → response body
    responses: Mutex<HashMap<String, Value>>,
    /// Requested URLs in call order
    calls: Mutex<Vec<String>>,
    /// When set, every fetch waits for a permit before answering
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a response body for `url`.
    pub(crate) fn with_response(self, url: &str, body: Value) -> Self {
        self.set_response(url, body);
        self
    }

    /// Replaces the response body for `url`.
    pub(crate) fn set_response(&self, url: &str, body: Value) {
        self.responses.lock().unwrap().insert(url.to_string(), body);
    }

    /// Holds every later fetch until permits are added to the returned semaphore.
    pub(crate) fn gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|called| *called == url).count()
    }
}

impl TranslationFetcher for MockFetcher {
    fn fetch_json(&self, url: &str) -> BoxFuture<'static, Result<TranslationData, FetchError>> {
        self.calls.lock().unwrap().push(url.to_string());
        let response = self.responses.lock().unwrap().get(url).cloned();
        let gate = self.gate.lock().unwrap().clone();
        let url = url.to_string();

        async move {
            if let Some(gate) = gate {
                // Permits are returned on drop, so one permit releases every waiter in turn.
                let _permit = gate.acquire().await;
            }
            match response {
                Some(Value::Object(map)) => Ok(map),
                Some(_) => Err(FetchError::NotAnObject { url }),
                None => Err(FetchError::Status { url, status: 404 }),
            }
        }
        .boxed()
    }
}

/// Test session wired to in-memory collaborators.
pub(crate) struct TestSession {
    pub(crate) session: I18nSession,
    pub(crate) fetcher: Arc<MockFetcher>,
    pub(crate) storage: Arc<MemoryStore>,
}

/// Creates a session for `config` with a mock transport and memory storage.
pub(crate) fn create_session(
    config: I18nConfig,
    fetcher: MockFetcher,
    storage: MemoryStore,
) -> TestSession {
    let fetcher = Arc::new(fetcher);
    let storage = Arc::new(storage);
    let session = I18nSession::new(
        config,
        SessionDeps::new(fetcher.clone(), storage.clone()),
    )
    .unwrap();
    TestSession { session, fetcher, storage }
}

/// The `/i18n` configuration with English and Vietnamese used across tests.
pub(crate) fn en_vi_config() -> I18nConfig {
    I18nConfig {
        default_language: "en".to_string(),
        fallback_language: Some("en".to_string()),
        language_supported: vec!["en".to_string(), "vi".to_string()],
        ..I18nConfig::new("/i18n")
    }
}
