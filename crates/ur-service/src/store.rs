//! Rule storage orchestrator
//!
//! [`RuleStore`] owns the persisted rule list. Reads decode the chunked
//! layout, writes replace it wholesale and then drop chunks the new layout
//! no longer uses. Every mutating operation runs its read-modify-write under
//! one async lock, so two concurrent increments always land as +2.
//!
//! Each successful write publishes a [`RuleSetChange`] to subscribers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use ur_core::state::grant_override;
use ur_core::{next_state, validate_new_rule, validate_rule_update, Clock, RedirectorConfig, Rule, RuleState};

use crate::backend::KeyValueStore;
use crate::codec;
use crate::error::StorageError;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A completed write: the list before and after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetChange {
    pub old: Vec<Rule>,
    pub new: Vec<Rule>,
}

/// What is currently stored, and how many chunks it spans.
struct Stored {
    rules: Vec<Rule>,
    chunks: usize,
    legacy: bool,
}

pub struct RuleStore {
    backend: Arc<dyn KeyValueStore>,
    config: RedirectorConfig,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
    changes: broadcast::Sender<RuleSetChange>,
}

impl RuleStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, config: RedirectorConfig, clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            backend,
            config,
            clock,
            write_lock: Mutex::new(()),
            changes,
        }
    }

    pub fn config(&self) -> &RedirectorConfig {
        &self.config
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Receive every change written through this store from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RuleSetChange> {
        self.changes.subscribe()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The stored rule list. Nothing stored yields an empty list.
    pub async fn get_rules(&self) -> Result<Vec<Rule>, StorageError> {
        Ok(self.read().await?.rules)
    }

    async fn read(&self) -> Result<Stored, StorageError> {
        let key = &self.config.storage_key;
        let meta_key = codec::meta_key(key);
        let head = self.backend.get(&[meta_key.clone(), key.clone()]).await?;

        let chunks = head.get(&meta_key).and_then(codec::chunk_count);
        match chunks {
            Some(count) => {
                let items = self.backend.get(&codec::chunk_keys(key, count)).await?;
                let rules = codec::from_chunks(&items, key, count).map_err(|err| {
                    log::warn!("stored rules under {} are unreadable: {}", key, err);
                    err
                })?;
                Ok(Stored {
                    rules,
                    chunks: count,
                    legacy: head.contains_key(key),
                })
            }
            None => match head.get(key) {
                Some(value) => {
                    log::info!("reading legacy rule layout from {}", key);
                    Ok(Stored {
                        rules: codec::from_legacy(value)?,
                        chunks: 0,
                        legacy: true,
                    })
                }
                None => Ok(Stored {
                    rules: Vec::new(),
                    chunks: 0,
                    legacy: false,
                }),
            },
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Replace the whole stored list.
    pub async fn save_rules(&self, rules: Vec<Rule>) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let stored = self.read().await?;
        self.commit(stored, rules).await
    }

    /// Validate and append a rule, returning it as stored.
    ///
    /// An id already in use is replaced by one past the largest stored id.
    pub async fn add_rule(&self, mut rule: Rule) -> Result<Rule, StorageError> {
        trim_fields(&mut rule);
        let _guard = self.write_lock.lock().await;
        let stored = self.read().await?;

        validate_new_rule(&rule.source, &rule.target, &stored.rules)?;
        if stored.rules.iter().any(|existing| existing.id == rule.id) {
            let max = stored.rules.iter().map(|existing| existing.id).max().unwrap_or(0);
            log::debug!("rule id {} in use, reassigned to {}", rule.id, max + 1);
            rule.id = max + 1;
        }

        let mut rules = stored.rules.clone();
        rules.push(rule.clone());
        self.commit(stored, rules).await?;
        Ok(rule)
    }

    /// Replace the stored rule with the same id. Returns false, writing
    /// nothing, when no rule has that id.
    pub async fn update_rule(&self, mut rule: Rule) -> Result<bool, StorageError> {
        trim_fields(&mut rule);
        let _guard = self.write_lock.lock().await;
        let stored = self.read().await?;

        let Some(index) = stored.rules.iter().position(|existing| existing.id == rule.id) else {
            log::debug!("update of unknown rule {} ignored", rule.id);
            return Ok(false);
        };
        validate_rule_update(&rule, &stored.rules)?;

        let mut rules = stored.rules.clone();
        rules[index] = rule;
        self.commit(stored, rules).await?;
        Ok(true)
    }

    /// Remove a rule. Returns false when no rule has that id.
    pub async fn delete_rule(&self, id: i64) -> Result<bool, StorageError> {
        self.modify(id, |rules, index| {
            rules.remove(index);
        })
        .await
        .map(|found| found.is_some())
    }

    /// Add `by` to a rule's count and optionally replace its display
    /// message. Returns the new count, or `None` when the rule is gone.
    pub async fn increment_count(&self, id: i64, by: u64, message: Option<String>) -> Result<Option<u64>, StorageError> {
        self.modify(id, |rules, index| {
            let rule = &mut rules[index];
            rule.count = rule.count.saturating_add(by);
            if message.is_some() {
                rule.last_count_message = message;
            }
            rule.count
        })
        .await
    }

    /// Advance a rule through the toggle state machine.
    pub async fn toggle_rule(&self, id: i64) -> Result<Option<RuleState>, StorageError> {
        let now = self.clock.now_ms();
        self.modify(id, |rules, index| {
            let state = next_state(&rules[index], now);
            state.apply_to(&mut rules[index]);
            log::debug!("rule {} toggled to {:?}", id, state);
            state
        })
        .await
    }

    /// Open a manual bypass window. Returns when it ends.
    pub async fn override_rule(&self, id: i64) -> Result<Option<i64>, StorageError> {
        let now = self.clock.now_ms();
        let duration = self.config.override_duration_ms;
        self.modify(id, |rules, index| {
            grant_override(&mut rules[index], now, duration);
            now + duration
        })
        .await
    }

    /// Locked read-modify-write of the rule with `id`.
    async fn modify<T>(
        &self,
        id: i64,
        apply: impl FnOnce(&mut Vec<Rule>, usize) -> T,
    ) -> Result<Option<T>, StorageError> {
        let _guard = self.write_lock.lock().await;
        let stored = self.read().await?;

        let Some(index) = stored.rules.iter().position(|rule| rule.id == id) else {
            log::debug!("rule {} not found", id);
            return Ok(None);
        };

        let mut rules = stored.rules.clone();
        let result = apply(&mut rules, index);
        self.commit(stored, rules).await?;
        Ok(Some(result))
    }

    /// Write `rules` over `stored`, notify, then clean up. Caller holds the lock.
    ///
    /// Once `set` succeeds the new list is the stored one, so a failed
    /// cleanup is only logged. Leftover chunks are never read (the meta
    /// record bounds them) and a leftover legacy key is retried next commit.
    async fn commit(&self, stored: Stored, rules: Vec<Rule>) -> Result<(), StorageError> {
        let key = &self.config.storage_key;
        let items = codec::to_storage_items(&rules, key, self.config.chunk_size);
        let written = items.len() - 1;
        self.backend.set(items).await?;

        log::info!("saved {} rules in {} chunks", rules.len(), written);
        // No subscribers is fine
        let _ = self.changes.send(RuleSetChange {
            old: stored.rules,
            new: rules,
        });

        let mut stale: Vec<String> = (written..stored.chunks).map(|index| codec::chunk_key(key, index)).collect();
        if stored.legacy {
            stale.push(key.clone());
        }
        if !stale.is_empty() {
            log::debug!("removing {} stale storage keys", stale.len());
            if let Err(err) = self.backend.remove(&stale).await {
                log::warn!("could not remove {} stale storage keys: {}", stale.len(), err);
            }
        }
        Ok(())
    }
}

/// Rules built outside [`Rule::new`] may carry padded URLs.
fn trim_fields(rule: &mut Rule) {
    rule.source = rule.source.trim().to_string();
    rule.target = rule.target.trim().to_string();
}

/// Raw storage value for a key, for callers that bypass the store.
pub async fn raw_value(backend: &dyn KeyValueStore, key: &str) -> Result<Option<Value>, StorageError> {
    let mut items = backend.get(&[key.to_string()]).await?;
    Ok(items.remove(key))
}
