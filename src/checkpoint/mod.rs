//! Cycle checkpoint store
//!
//! Typed view over the per-token state document. Holds run progress, the
//! participant count records, sealed secrets, generated shares and pool
//! identifiers. Every failure here is fatal to a run: progress is only ever
//! read back from what was saved, never inferred.
//!
//! Progress uses two keys:
//! - `cycle` - last fully completed cycle
//! - `cycle_in_progress` - cycle whose swaps may have started
//!
//! A run resumes at the interrupted cycle if there is one, otherwise right
//! after the last completed cycle.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::keystore::ParticipantRole;

pub use store::{JsonFileStore, KeyValueStore, MemoryStore};

const KEY_CYCLE: &str = "cycle";
const KEY_CYCLE_IN_PROGRESS: &str = "cycle_in_progress";
const KEY_UPDATED_AT: &str = "updated_at";
const KEY_SHARES: &str = "shares";
const KEY_POOL_ID: &str = "pool_id";
const KEY_LP_MINT: &str = "lp_mint";
pub(crate) const KEY_MINT: &str = "mint";

fn count_key(role: ParticipantRole) -> String {
    format!("count:{}", role)
}

pub(crate) fn secret_key(role: ParticipantRole, index: u32) -> String {
    format!("secret:{}:{}", role, index)
}

/// Provisioned participant count for one role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCount {
    /// Count before the most recent provisioning
    pub previous: u32,
    /// Count after the most recent provisioning
    pub current: u32,
}

/// Snapshot of run progress
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Checkpoint {
    pub last_completed: Option<u32>,
    pub in_progress: Option<u32>,
    pub participant_counts: BTreeMap<ParticipantRole, RoleCount>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// First cycle a new run should execute
    pub fn resume_index(&self) -> u32 {
        match (self.last_completed, self.in_progress) {
            (completed, Some(started)) if completed.map_or(true, |c| started > c) => started,
            (Some(completed), _) => completed + 1,
            (None, _) => 0,
        }
    }
}

/// Liquidity pool identifiers recorded by the pool setup task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetadata {
    pub pool_id: Option<String>,
    pub lp_mint: Option<String>,
}

/// Typed checkpoint layer over a key-value store
pub struct CheckpointStore<S: KeyValueStore> {
    store: S,
    /// When false, progress is tracked in memory only (dry runs)
    persist_progress: bool,
}

impl<S: KeyValueStore> CheckpointStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            persist_progress: true,
        }
    }

    /// Stop writing cycle progress (dry runs)
    pub fn without_progress_writes(mut self) -> Self {
        self.persist_progress = false;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    /// Flush staged values
    pub fn save(&mut self) -> Result<()> {
        self.store.save().map_err(|e| match e {
            Error::Checkpoint(_) => e,
            other => Error::Checkpoint(other.to_string()),
        })
    }

    fn read_index(&self, key: &str) -> Result<Option<u32>> {
        match self.store.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| Error::Checkpoint(format!("{} is not a cycle index: {}", key, value))),
        }
    }

    /// Load the full progress snapshot
    pub fn checkpoint(&self) -> Result<Checkpoint> {
        let mut participant_counts = BTreeMap::new();
        for role in ParticipantRole::ALL {
            if let Some(count) = self.role_count(role)? {
                participant_counts.insert(role, count);
            }
        }

        let updated_at = match self.store.get(KEY_UPDATED_AT).and_then(Value::as_str) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| Error::Checkpoint(format!("Invalid updated_at: {}", e)))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(Checkpoint {
            last_completed: self.read_index(KEY_CYCLE)?,
            in_progress: self.read_index(KEY_CYCLE_IN_PROGRESS)?,
            participant_counts,
            updated_at,
        })
    }

    /// First cycle index the next run should execute
    pub fn resume_index(&self) -> Result<u32> {
        let checkpoint = self.checkpoint()?;
        let index = checkpoint.resume_index();

        match (checkpoint.last_completed, checkpoint.in_progress) {
            (_, Some(started)) if started == index => {
                info!("Cycle {} was interrupted, resuming it", started)
            }
            (Some(completed), _) => info!("Last completed cycle {}, resuming at {}", completed, index),
            _ => info!("No checkpoint found, starting at cycle 0"),
        }

        Ok(index)
    }

    /// Mark `index` as started and save before any of its swaps are dispatched
    pub fn begin_cycle(&mut self, index: u32) -> Result<()> {
        if !self.persist_progress {
            debug!("Dry run: not persisting start of cycle {}", index);
            return Ok(());
        }

        self.store.set(KEY_CYCLE_IN_PROGRESS, json!(index));
        self.store.set(KEY_UPDATED_AT, json!(Utc::now().to_rfc3339()));
        self.save()?;
        debug!("Checkpoint: cycle {} started", index);
        Ok(())
    }

    /// Mark `index` as completed and save before the next cycle begins
    pub fn complete_cycle(&mut self, index: u32) -> Result<()> {
        if !self.persist_progress {
            debug!("Dry run: not persisting completion of cycle {}", index);
            return Ok(());
        }

        self.store.set(KEY_CYCLE, json!(index));
        self.store.remove(KEY_CYCLE_IN_PROGRESS);
        self.store.set(KEY_UPDATED_AT, json!(Utc::now().to_rfc3339()));
        self.save()?;
        debug!("Checkpoint: cycle {} completed", index);
        Ok(())
    }

    /// Provisioned count record for a role
    pub fn role_count(&self, role: ParticipantRole) -> Result<Option<RoleCount>> {
        match self.store.get(&count_key(role)) {
            None | Some(Value::Null) => Ok(None),
            // Bare numbers are accepted as a count with no history
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(|current| Some(RoleCount { previous: current, current }))
                .ok_or_else(|| Error::Checkpoint(format!("Invalid count for {}: {}", role, n))),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| Error::Checkpoint(format!("Invalid count for {}: {}", role, e))),
        }
    }

    /// Stage a count record (call `save` to persist)
    pub fn set_role_count(&mut self, role: ParticipantRole, count: RoleCount) {
        self.store.set(&count_key(role), json!(count));
    }

    pub(crate) fn sealed(&self, key: &str) -> Result<Option<String>> {
        match self.store.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(Error::Checkpoint(format!(
                "{} should hold a sealed string, found {}",
                key, other
            ))),
        }
    }

    pub(crate) fn has_sealed(&self, key: &str) -> bool {
        self.store.exists(key)
    }

    pub(crate) fn set_sealed(&mut self, key: &str, sealed: String) {
        self.store.set(key, Value::String(sealed));
    }

    /// Previously generated participant shares
    pub fn shares(&self) -> Result<Option<Vec<f64>>> {
        match self.store.get(KEY_SHARES) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| Error::Checkpoint(format!("Invalid shares: {}", e))),
        }
    }

    /// Persist generated shares
    pub fn save_shares(&mut self, shares: &[f64]) -> Result<()> {
        self.store.set(KEY_SHARES, json!(shares));
        self.save()
    }

    /// Pool identifiers, if the pool setup task recorded them
    pub fn pool_metadata(&self) -> PoolMetadata {
        let read = |key: &str| {
            self.store
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        PoolMetadata {
            pool_id: read(KEY_POOL_ID),
            lp_mint: read(KEY_LP_MINT),
        }
    }

    /// Record pool identifiers
    pub fn save_pool_metadata(&mut self, metadata: &PoolMetadata) -> Result<()> {
        for (key, value) in [(KEY_POOL_ID, &metadata.pool_id), (KEY_LP_MINT, &metadata.lp_mint)] {
            match value {
                Some(v) => self.store.set(key, json!(v)),
                None => {
                    self.store.remove(key);
                }
            }
        }
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Store whose saves always fail
    struct BrokenStore(MemoryStore);

    impl KeyValueStore for BrokenStore {
        fn get(&self, key: &str) -> Option<&Value> {
            self.0.get(key)
        }
        fn set(&mut self, key: &str, value: Value) {
            self.0.set(key, value)
        }
        fn remove(&mut self, key: &str) -> Option<Value> {
            self.0.remove(key)
        }
        fn save(&mut self) -> Result<()> {
            Err(Error::Io("read-only filesystem".into()))
        }
        fn keys(&self) -> Vec<String> {
            self.0.keys()
        }
    }

    fn store_with(entries: Value) -> CheckpointStore<MemoryStore> {
        let map = entries.as_object().cloned().unwrap_or_default();
        CheckpointStore::new(MemoryStore::from_entries(map))
    }

    #[test]
    fn test_fresh_store_starts_at_zero() {
        let store = CheckpointStore::new(MemoryStore::new());
        assert_eq!(store.resume_index().unwrap(), 0);
    }

    #[test]
    fn test_completed_zero_is_not_no_checkpoint() {
        let store = store_with(json!({ "cycle": 0 }));
        assert_eq!(store.resume_index().unwrap(), 1);
    }

    #[test]
    fn test_resume_after_completed_three() {
        let store = store_with(json!({ "cycle": 3 }));
        assert_eq!(store.resume_index().unwrap(), 4);
    }

    #[test]
    fn test_interrupted_cycle_is_rerun() {
        let store = store_with(json!({ "cycle": 3, "cycle_in_progress": 4 }));
        assert_eq!(store.resume_index().unwrap(), 4);

        let first = store_with(json!({ "cycle_in_progress": 0 }));
        assert_eq!(first.resume_index().unwrap(), 0);
    }

    #[test]
    fn test_stale_in_progress_is_ignored() {
        let store = store_with(json!({ "cycle": 5, "cycle_in_progress": 5 }));
        assert_eq!(store.resume_index().unwrap(), 6);
    }

    #[test]
    fn test_begin_and_complete_are_saved() {
        let mut store = CheckpointStore::new(MemoryStore::new());

        store.begin_cycle(0).unwrap();
        assert_eq!(store.store().persisted().get("cycle_in_progress"), Some(&json!(0)));
        assert_eq!(store.resume_index().unwrap(), 0);

        store.complete_cycle(0).unwrap();
        let persisted = store.store().persisted();
        assert_eq!(persisted.get("cycle"), Some(&json!(0)));
        assert!(!persisted.contains_key("cycle_in_progress"));
        assert!(persisted.contains_key("updated_at"));
        assert_eq!(store.resume_index().unwrap(), 1);
    }

    #[test]
    fn test_dry_run_does_not_touch_progress() {
        let mut store = CheckpointStore::new(MemoryStore::new()).without_progress_writes();
        store.begin_cycle(0).unwrap();
        store.complete_cycle(0).unwrap();

        assert_eq!(store.store().save_count(), 0);
        assert_eq!(store.resume_index().unwrap(), 0);
    }

    #[test]
    fn test_save_failure_is_checkpoint_error() {
        let mut store = CheckpointStore::new(BrokenStore(MemoryStore::new()));
        let err = store.begin_cycle(2).unwrap_err();
        assert!(matches!(err, Error::Checkpoint(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_garbage_cycle_is_rejected() {
        let store = store_with(json!({ "cycle": "three" }));
        assert!(matches!(store.resume_index(), Err(Error::Checkpoint(_))));
    }

    #[test]
    fn test_role_count_formats() {
        let mut store = store_with(json!({ "count:trader": 12 }));
        assert_eq!(
            store.role_count(ParticipantRole::Trader).unwrap(),
            Some(RoleCount { previous: 12, current: 12 })
        );

        store.set_role_count(ParticipantRole::Whale, RoleCount { previous: 2, current: 5 });
        assert_eq!(
            store.role_count(ParticipantRole::Whale).unwrap(),
            Some(RoleCount { previous: 2, current: 5 })
        );
        assert_eq!(store.role_count(ParticipantRole::Dev).unwrap(), None);

        let checkpoint = store.checkpoint().unwrap();
        assert_eq!(checkpoint.participant_counts.len(), 2);
    }

    #[test]
    fn test_shares_and_pool_metadata() {
        let mut store = CheckpointStore::new(MemoryStore::new());
        assert_eq!(store.shares().unwrap(), None);

        store.save_shares(&[19.5, 20.25, 60.25]).unwrap();
        assert_eq!(store.shares().unwrap(), Some(vec![19.5, 20.25, 60.25]));

        store
            .save_pool_metadata(&PoolMetadata {
                pool_id: Some("pool-1".into()),
                lp_mint: None,
            })
            .unwrap();
        let metadata = store.pool_metadata();
        assert_eq!(metadata.pool_id.as_deref(), Some("pool-1"));
        assert_eq!(metadata.lp_mint, None);
    }
}
