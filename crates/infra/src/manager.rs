//! Per-host preference manager.
//!
//! A manager is the facade the embedding host talks to: it owns one
//! service + provider pair for its host and hands out preference
//! collections keyed by (subject id, privacy). Managers are ordinary owned
//! objects with an explicit lifecycle; the host constructs one per service
//! host, drives [`PreferencesManager::tick`] from its periodic loop and
//! calls [`PreferencesManager::on_connect`] after (re)connecting to a
//! server, since server-side state may have changed out of band.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use webprefs_core::{CircuitBreakerSnapshot, PreferenceSet, Preferences, Provider, ProviderConfig};
use webprefs_domain::{PrefsError, Result, Session, SubjectId};

use crate::auth::SessionAuthenticator;
use crate::offline::OfflinePreferences;
use crate::service::{ServiceConfig, WebPreferencesService};

/// Configuration for a [`PreferencesManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub service: ServiceConfig,
    pub provider: ProviderConfig,
    /// Directory for offline stores; offline collections stay memory-only
    /// when unset.
    pub offline_dir: Option<PathBuf>,
}

impl ManagerConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            service: ServiceConfig::new(host),
            provider: ProviderConfig::default(),
            offline_dir: None,
        }
    }

    pub fn provider(mut self, provider: ProviderConfig) -> Self {
        self.provider = provider;
        self
    }

    pub fn offline_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.offline_dir = Some(dir.into());
        self
    }
}

type SetKey = (String, bool);

/// Central registry for the preference collections of one service host.
pub struct PreferencesManager {
    session: Option<Session>,
    provider: Arc<Provider>,
    offline_dir: Option<PathBuf>,
    sets: Mutex<HashMap<SetKey, Arc<dyn Preferences>>>,
}

impl PreferencesManager {
    /// Build the service and spawn its provider on the current runtime.
    pub fn new(
        config: ManagerConfig,
        session: Option<Session>,
        authenticator: Arc<dyn SessionAuthenticator>,
    ) -> Result<Self> {
        let service =
            WebPreferencesService::new(config.service, session.clone(), authenticator)?;
        let provider = Provider::spawn(Arc::new(service), config.provider)
            .map_err(|err| PrefsError::Internal(err.to_string()))?;

        Ok(Self {
            session,
            provider: Arc::new(provider),
            offline_dir: config.offline_dir,
            sets: Mutex::new(HashMap::new()),
        })
    }

    /// Get or create the preference collection for a subject.
    ///
    /// Collections for any subject other than the session's own profile
    /// are read-only for their whole lifetime, as are all collections when
    /// the manager has no session.
    pub fn preferences(&self, id: &str, private: bool) -> Result<Arc<dyn Preferences>> {
        let id = SubjectId::parse(id)?;
        let read_only =
            self.session.as_ref().map(|session| session.profile_id() != &id).unwrap_or(true);

        let mut sets = self.sets.lock();
        let key = (id.as_str().to_string(), private);
        if let Some(existing) = sets.get(&key) {
            return Ok(existing.clone());
        }

        debug!(%id, private, read_only, "creating preference collection");
        let set: Arc<dyn Preferences> =
            PreferenceSet::new(self.provider.clone(), id, private, read_only);
        sets.insert(key, set.clone());
        Ok(set)
    }

    /// Preference collection for the session's own profile, or `None` when
    /// the manager has no session (use an offline collection instead).
    pub fn local_preferences(&self, private: bool) -> Option<Arc<dyn Preferences>> {
        let id = self.session.as_ref()?.profile_id().as_str().to_string();
        self.preferences(&id, private).ok()
    }

    /// Get or create a local offline collection for a subject, file-backed
    /// when an offline directory is configured.
    pub fn offline_preferences(
        &self,
        id: SubjectId,
        private: bool,
        read_only: bool,
    ) -> Arc<dyn Preferences> {
        let mut sets = self.sets.lock();
        let key = (id.as_str().to_string(), private);
        if let Some(existing) = sets.get(&key) {
            return existing.clone();
        }

        debug!(%id, private, read_only, "creating offline preference collection");
        let set: Arc<dyn Preferences> = match &self.offline_dir {
            Some(dir) => Arc::new(OfflinePreferences::with_store(dir, id, private, read_only)),
            None => Arc::new(OfflinePreferences::memory(id, private, read_only)),
        };
        sets.insert(key, set.clone());
        set
    }

    /// Advance every collection by one host tick.
    pub fn tick(&self) {
        for set in self.collections() {
            set.on_tick();
        }
    }

    /// Schedule a full resynchronization of every collection.
    pub fn on_connect(&self) {
        for set in self.collections() {
            set.poll();
        }
    }

    pub fn is_active(&self) -> bool {
        self.provider.is_active()
    }

    pub fn breaker_snapshot(&self) -> CircuitBreakerSnapshot {
        self.provider.breaker_snapshot()
    }

    fn collections(&self) -> Vec<Arc<dyn Preferences>> {
        self.sets.lock().values().cloned().collect()
    }
}
