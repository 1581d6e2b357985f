//! Process-wide access to one shared session.

use std::sync::{
    PoisonError,
    RwLock,
};

use crate::config::I18nConfig;
use crate::error::I18nError;
use crate::session::{
    I18nSession,
    SessionDeps,
};

/// The process-wide registry returned by [`Registry::global`].
static GLOBAL: Registry = Registry::new();

/// Holds at most one initialized session.
#[derive(Debug, Default)]
pub struct Registry {
    /// The initialized session, if any
    session: RwLock<Option<I18nSession>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self { session: RwLock::new(None) }
    }

    /// The process-wide registry.
    #[must_use]
    pub const fn global() -> &'static Self {
        &GLOBAL
    }

    /// Creates the session on first call. Later calls log a warning, ignore
    /// their arguments and return the existing session.
    ///
    /// # Errors
    /// Propagates [`I18nSession::new`] failures; the registry stays uninitialized.
    pub fn initialize(&self, config: I18nConfig, deps: SessionDeps) -> Result<I18nSession, I18nError> {
        let mut slot = self.session.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = slot.as_ref() {
            tracing::warn!("i18n session is already initialized; ignoring the new configuration");
            return Ok(existing.clone());
        }

        let session = I18nSession::new(config, deps)?;
        *slot = Some(session.clone());
        drop(slot);
        tracing::debug!(lang = %session.get_current_lang(), "i18n session initialized");
        Ok(session)
    }

    /// Returns the initialized session.
    ///
    /// # Errors
    /// [`I18nError::NotInitialized`] before [`Self::initialize`].
    pub fn use_session(&self) -> Result<I18nSession, I18nError> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(I18nError::NotInitialized)
    }

    /// Returns true between `initialize` and `reset`.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.session.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Disposes and forgets the session so that `initialize` can run again.
    pub fn reset(&self) {
        let previous = self.session.write().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(session) = previous {
            session.dispose();
        }
    }
}
