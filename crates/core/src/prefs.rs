//! Per-subject preference sets.
//!
//! A [`PreferenceSet`] is the caller-facing cache: reads and writes are
//! synchronous and non-blocking, while a per-key state machine (requested,
//! pending, dirty) decides on each host tick whether a batch should be
//! flushed to the [`Provider`]. The value cache is a concurrent map read
//! without the state lock; a stale read is accepted, documented behavior.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};
use webprefs_domain::constants::{
    ERROR_SUSPEND_TICKS, REQUEST_TIMEOUT_TICKS, TIMER_HALTED, UPDATE_INTERVAL_TICKS,
};
use webprefs_domain::validation::{validate_entry, validate_key};
use webprefs_domain::{FailureReason, PrefsError, Result, SubjectId};

use crate::ports::PreferenceClient;
use crate::provider::Provider;

/// Public contract of a preference collection.
///
/// Reads never fail for "value not yet available": absence is the signal
/// that a fetch has been scheduled. Only malformed input or writing to a
/// read-only collection errors synchronously.
pub trait Preferences: Send + Sync {
    /// Stable identifier of the subject these preferences belong to.
    fn id(&self) -> &SubjectId;

    fn is_private(&self) -> bool;

    fn is_read_only(&self) -> bool;

    /// Whether a value for `key` is currently cached. Shares `get`'s side
    /// effect of scheduling a fetch for missing keys.
    fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Cached value for `key`, scheduling a fetch when absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// As [`Self::get`], substituting `default` for absence.
    fn get_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self.get(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// Write a value. No-op when the value is unchanged.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key by writing the empty string.
    fn remove(&self, key: &str) -> Result<()> {
        self.set(key, "")
    }

    /// Mark a key wanted without reading it.
    fn request(&self, key: &str) -> Result<()>;

    /// Mark several keys wanted. Short-circuits to the single-key path
    /// when exactly one key is given.
    fn request_keys(&self, keys: &[&str]) -> Result<()>;

    /// Schedule a refresh of every cached key (full resynchronization,
    /// used after (re)connecting to a service).
    fn poll(&self);

    /// Flush dirty keys to the provider now; `force` marks every cached
    /// key dirty first.
    fn commit(&self, force: bool);

    /// Advance timers by one host tick. The caller supplies a monotonic
    /// periodic tick; the reference host ticks every 50 ms.
    fn on_tick(&self);
}

/// Diagnostic snapshot of a set's scheduling state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStateSnapshot {
    pub requested: HashSet<String>,
    pub pending: HashSet<String>,
    pub dirty: HashSet<String>,
    pub needs_sync: bool,
    pub update_timer: i32,
    pub timeout_timer: i32,
}

struct SyncState {
    /// Keys a consumer wants but that have not been sent to the service.
    requested: HashSet<String>,
    /// Keys sent to the service, awaiting a response.
    pending: HashSet<String>,
    /// Keys written locally, not yet acknowledged as persisted.
    dirty: HashSet<String>,
    /// Set whenever any key-state set gains an entry; cleared once a batch
    /// is dispatched.
    needs_sync: bool,
    /// Ticks until the next sync attempt; negative means halted for good.
    update_timer: i32,
    /// Ticks until the in-flight batch is presumed lost; zero disarms.
    timeout_timer: i32,
}

impl SyncState {
    fn new() -> Self {
        Self {
            requested: HashSet::new(),
            pending: HashSet::new(),
            dirty: HashSet::new(),
            needs_sync: false,
            // First tick triggers an immediate update pass.
            update_timer: 1,
            timeout_timer: 0,
        }
    }

    /// Add a key to the request set unless it is already in flight.
    /// Returns whether a sync is now wanted for it.
    fn add_requested(&mut self, key: &str) -> bool {
        if self.pending.contains(key) {
            return false;
        }
        self.requested.insert(key.to_string());
        true
    }
}

/// Write-back cached preference collection bound to one (id, privacy)
/// pair.
///
/// Construction yields an `Arc` because the set registers itself as the
/// completion callback for the requests it submits.
pub struct PreferenceSet {
    id: SubjectId,
    is_private: bool,
    is_read_only: bool,
    values: DashMap<String, String>,
    state: Mutex<SyncState>,
    provider: Arc<Provider>,
    weak: Weak<PreferenceSet>,
}

impl PreferenceSet {
    pub fn new(
        provider: Arc<Provider>,
        id: SubjectId,
        is_private: bool,
        is_read_only: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            id,
            is_private,
            is_read_only,
            values: DashMap::new(),
            state: Mutex::new(SyncState::new()),
            provider,
            weak: weak.clone(),
        })
    }

    /// Snapshot of the scheduling state, for diagnostics and tests.
    pub fn sync_state(&self) -> SyncStateSnapshot {
        let state = self.state.lock();
        SyncStateSnapshot {
            requested: state.requested.clone(),
            pending: state.pending.clone(),
            dirty: state.dirty.clone(),
            needs_sync: state.needs_sync,
            update_timer: state.update_timer,
            timeout_timer: state.timeout_timer,
        }
    }

    fn client(&self) -> Option<Arc<dyn PreferenceClient>> {
        self.weak.upgrade().map(|set| set as Arc<dyn PreferenceClient>)
    }

    /// Periodic sync pass: runs when the update timer expires.
    fn update(&self) {
        let Some(client) = self.client() else { return };

        {
            let mut state = self.state.lock();
            state.update_timer = UPDATE_INTERVAL_TICKS;

            if !state.needs_sync || !self.provider.is_active() {
                return;
            }
            state.needs_sync = false;

            if !state.requested.is_empty() {
                debug!(
                    id = %self.id,
                    count = state.requested.len(),
                    "submitting a request for requested preferences"
                );
                let keys: HashSet<String> = state.requested.iter().cloned().collect();
                if self.provider.submit_get(client, self.id.clone(), keys, self.is_private) {
                    state.timeout_timer = REQUEST_TIMEOUT_TICKS;
                    let moved: Vec<String> = state.requested.drain().collect();
                    state.pending.extend(moved);
                } else {
                    state.needs_sync = true;
                }
            }
        }

        self.commit(false);
    }

    /// The in-flight batch is presumed lost: reclaim its keys and suspend.
    fn handle_timeout(&self) {
        let mut state = self.state.lock();
        state.update_timer = ERROR_SUSPEND_TICKS;

        let lost: Vec<String> = state.pending.drain().collect();
        warn!(id = %self.id, count = lost.len(), "request batch timed out; requeueing keys");
        state.requested.extend(lost);
        state.needs_sync = true;
    }

    /// Suspend syncing after a failed exchange, scaled by severity.
    /// Permanent failures halt the set until process restart.
    fn apply_failure_backoff(&self, state: &mut SyncState, reason: FailureReason) {
        if reason.is_permanent() {
            debug!(id = %self.id, %reason, "halting preference updates permanently");
            state.update_timer = TIMER_HALTED;
            return;
        }

        let suspend = ERROR_SUSPEND_TICKS * reason.severity().max(1) as i32;
        debug!(id = %self.id, %reason, suspend, "suspending preference updates");
        state.update_timer = suspend;
    }

    /// Both failure paths converge on the request set: the keys fall back
    /// to a future read-reconciliation rather than being re-marked dirty,
    /// so a failed local write may later be superseded by whatever the
    /// service returns for those keys.
    fn fail_keys(&self, keys: HashSet<String>, reason: FailureReason) {
        let mut state = self.state.lock();
        state.timeout_timer = 0;
        self.apply_failure_backoff(&mut state, reason);

        for key in keys {
            state.pending.remove(&key);
            state.requested.insert(key);
        }
        state.needs_sync = true;
    }
}

impl Preferences for PreferenceSet {
    fn id(&self) -> &SubjectId {
        &self.id
    }

    fn is_private(&self) -> bool {
        self.is_private
    }

    fn is_read_only(&self) -> bool {
        self.is_read_only
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;

        // The cache read deliberately bypasses the state lock.
        let cached = self.values.get(key).map(|value| value.value().clone());

        if cached.is_none() {
            let mut state = self.state.lock();
            if state.add_requested(key) {
                state.needs_sync = true;
            }
        }

        Ok(cached)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.is_read_only {
            return Err(PrefsError::ReadOnly(self.id.to_string()));
        }
        validate_entry(key, value)?;

        let mut state = self.state.lock();

        let unchanged = self.values.get(key).map(|current| *current == value).unwrap_or(false);
        if unchanged {
            return Ok(());
        }

        self.values.insert(key.to_string(), value.to_string());
        state.dirty.insert(key.to_string());
        // A pending write supersedes a pending read.
        state.requested.remove(key);
        state.needs_sync = true;
        Ok(())
    }

    fn request(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        let mut state = self.state.lock();
        if state.add_requested(key) {
            state.needs_sync = true;
        }
        Ok(())
    }

    fn request_keys(&self, keys: &[&str]) -> Result<()> {
        match keys {
            [] => Ok(()),
            [key] => self.request(key),
            keys => {
                for key in keys {
                    validate_key(key)?;
                }
                let mut state = self.state.lock();
                let mut wanted = false;
                for key in keys {
                    wanted |= state.add_requested(key);
                }
                if wanted {
                    state.needs_sync = true;
                }
                Ok(())
            }
        }
    }

    fn poll(&self) {
        let mut state = self.state.lock();
        let cached: Vec<String> = self.values.iter().map(|entry| entry.key().clone()).collect();
        for key in cached {
            if !state.pending.contains(&key) {
                state.requested.insert(key);
            }
        }
        state.needs_sync = true;
    }

    fn commit(&self, force: bool) {
        let Some(client) = self.client() else { return };

        let mut state = self.state.lock();

        // Permanent error condition
        if state.update_timer < 0 {
            return;
        }

        if force {
            for entry in self.values.iter() {
                state.dirty.insert(entry.key().clone());
            }
        }

        if state.dirty.is_empty() {
            return;
        }

        let outgoing: HashMap<String, String> = state
            .dirty
            .iter()
            .filter_map(|key| {
                self.values.get(key).map(|value| (key.clone(), value.value().clone()))
            })
            .collect();

        debug!(id = %self.id, count = outgoing.len(), "submitting a SET for dirty preferences");
        if self.provider.submit_set(client, self.id.clone(), outgoing, self.is_private) {
            state.dirty.clear();
        } else {
            state.needs_sync = true;
        }
    }

    fn on_tick(&self) {
        let mut update_due = false;
        let mut timeout_due = false;

        {
            let mut state = self.state.lock();
            if state.update_timer > 0 {
                state.update_timer -= 1;
                update_due = state.update_timer < 1;
            }
            if state.timeout_timer > 0 {
                state.timeout_timer -= 1;
                timeout_due = state.timeout_timer < 1;
            }
        }

        if update_due {
            self.update();
        }
        if timeout_due {
            self.handle_timeout();
        }
    }
}

impl PreferenceClient for PreferenceSet {
    fn on_get_success(&self, id: &SubjectId, values: HashMap<String, String>) {
        if id != &self.id {
            warn!(id = %id, own = %self.id, "dropping unsolicited get response");
            return;
        }

        let mut state = self.state.lock();
        state.timeout_timer = 0;

        // A completed fetch supersedes any concurrent local intent for
        // these keys; a late response after a timeout merges harmlessly.
        for (key, value) in values {
            state.dirty.remove(&key);
            state.pending.remove(&key);
            state.requested.remove(&key);
            self.values.insert(key, value);
        }
    }

    fn on_set_success(&self, id: &SubjectId, keys: HashSet<String>) {
        if id != &self.id {
            warn!(id = %id, own = %self.id, "dropping unsolicited set response");
            return;
        }

        let mut state = self.state.lock();
        state.timeout_timer = 0;

        for key in &keys {
            state.dirty.remove(key);
            state.requested.remove(key);
        }
        state.needs_sync = !state.dirty.is_empty() || !state.requested.is_empty();
    }

    fn on_get_failed(&self, id: &SubjectId, keys: HashSet<String>, reason: FailureReason) {
        if id != &self.id {
            warn!(id = %id, own = %self.id, "dropping unsolicited get failure");
            return;
        }
        self.fail_keys(keys, reason);
    }

    fn on_set_failed(&self, id: &SubjectId, keys: HashSet<String>, reason: FailureReason) {
        if id != &self.id {
            warn!(id = %id, own = %self.id, "dropping unsolicited set failure");
            return;
        }
        self.fail_keys(keys, reason);
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use webprefs_domain::{PrefsRequest, ServiceResponse};

    use super::*;
    use crate::config::ProviderConfig;
    use crate::ports::{DispatchError, RequestDispatcher};

    /// Dispatcher that never completes; these tests only exercise the
    /// local, pre-network side of the state machine.
    struct NullDispatcher;

    #[async_trait]
    impl RequestDispatcher for NullDispatcher {
        async fn dispatch(
            &self,
            _request: &PrefsRequest,
        ) -> std::result::Result<ServiceResponse, DispatchError> {
            std::future::pending().await
        }
    }

    fn subject() -> SubjectId {
        SubjectId::parse("069a79f444e94726a5befca90e38aaf5").expect("valid id")
    }

    fn new_set(read_only: bool) -> Arc<PreferenceSet> {
        let provider = Provider::spawn(Arc::new(NullDispatcher), ProviderConfig::default())
            .expect("provider spawns");
        PreferenceSet::new(Arc::new(provider), subject(), false, read_only)
    }

    #[tokio::test]
    async fn set_then_get_is_visible_before_any_network_interaction() {
        let prefs = new_set(false);
        prefs.set("a.b", "1").expect("valid write");
        assert_eq!(prefs.get("a.b").expect("valid key"), Some("1".to_string()));
    }

    #[tokio::test]
    async fn absent_get_requests_the_key_exactly_once() {
        let prefs = new_set(false);

        assert_eq!(prefs.get("missing").expect("valid key"), None);
        assert_eq!(prefs.get("missing").expect("valid key"), None);

        let state = prefs.sync_state();
        assert_eq!(state.requested, HashSet::from(["missing".to_string()]));
        assert!(state.needs_sync);
    }

    #[tokio::test]
    async fn read_only_sets_reject_writes_without_mutating() {
        let prefs = new_set(true);

        let err = prefs.set("k", "v").expect_err("read-only");
        assert!(matches!(err, PrefsError::ReadOnly(_)));

        // The failed write left no trace, not even a scheduled fetch.
        let state = prefs.sync_state();
        assert!(state.dirty.is_empty());
        assert!(!state.needs_sync);
    }

    #[tokio::test]
    async fn rewriting_an_unchanged_value_is_a_no_op() {
        let prefs = new_set(false);
        prefs.set("k", "v").expect("valid write");

        // Pretend the first write was acknowledged.
        prefs.on_set_success(&subject(), HashSet::from(["k".to_string()]));
        assert!(prefs.sync_state().dirty.is_empty());

        prefs.set("k", "v").expect("valid write");
        let state = prefs.sync_state();
        assert!(state.dirty.is_empty(), "unchanged value must not re-dirty the key");
        assert!(!state.needs_sync);
    }

    #[tokio::test]
    async fn a_write_supersedes_a_pending_read() {
        let prefs = new_set(false);
        assert_eq!(prefs.get("k").expect("valid key"), None);
        assert!(prefs.sync_state().requested.contains("k"));

        prefs.set("k", "v").expect("valid write");
        let state = prefs.sync_state();
        assert!(!state.requested.contains("k"));
        assert!(state.dirty.contains("k"));
    }

    #[tokio::test]
    async fn invalid_keys_and_values_error_synchronously() {
        let prefs = new_set(false);

        assert!(matches!(prefs.get("NOT VALID"), Err(PrefsError::InvalidKey(_))));
        assert!(matches!(prefs.set("NOT VALID", "v"), Err(PrefsError::InvalidKey(_))));
        assert!(matches!(
            prefs.set("k", &"x".repeat(256)),
            Err(PrefsError::InvalidValue { .. })
        ));
        assert!(matches!(prefs.request("NOT VALID"), Err(PrefsError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn remove_writes_the_empty_string() {
        let prefs = new_set(false);
        prefs.set("k", "v").expect("valid write");
        prefs.remove("k").expect("valid remove");
        assert_eq!(prefs.get("k").expect("valid key"), Some(String::new()));
    }

    #[tokio::test]
    async fn get_or_substitutes_the_default() {
        let prefs = new_set(false);
        assert_eq!(prefs.get_or("missing", "fallback").expect("valid key"), "fallback");
        prefs.set("missing", "real").expect("valid write");
        assert_eq!(prefs.get_or("missing", "fallback").expect("valid key"), "real");
    }

    #[tokio::test]
    async fn request_keys_registers_every_key() {
        let prefs = new_set(false);
        prefs.request_keys(&["a", "b", "c"]).expect("valid keys");
        assert_eq!(
            prefs.sync_state().requested,
            HashSet::from(["a".to_string(), "b".to_string(), "c".to_string()])
        );

        // The single-element form takes the single-key path.
        prefs.request_keys(&["d"]).expect("valid key");
        assert!(prefs.sync_state().requested.contains("d"));

        // Empty input is a no-op.
        prefs.request_keys(&[]).expect("no keys");
    }

    #[tokio::test]
    async fn poll_schedules_a_refresh_of_every_cached_key() {
        let prefs = new_set(false);
        prefs.set("a", "1").expect("valid write");
        prefs.set("b", "2").expect("valid write");

        prefs.poll();

        let state = prefs.sync_state();
        assert_eq!(state.requested, HashSet::from(["a".to_string(), "b".to_string()]));
        assert!(state.needs_sync);
    }

    #[tokio::test]
    async fn unsolicited_callbacks_are_dropped() {
        let prefs = new_set(false);
        let other = SubjectId::parse("ffffffffffffffffffffffffffffffff").expect("valid id");

        prefs.on_get_success(
            &other,
            HashMap::from([("k".to_string(), "v".to_string())]),
        );
        assert_eq!(prefs.get("k").expect("valid key"), None);
    }
}
