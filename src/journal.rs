//! Append-only journal storage engine.
//!
//! [`JournalEngine`] persists every accepted mutation as a serde_json-encoded
//! frame in an in-process append-only log, alongside a materialized index
//! used to answer reads. The log is the physical layout; the index is always
//! derivable from it by replay, which the tests verify. `flush` truncates
//! both.
//!
//! The engine exists as a second, structurally different implementation of
//! the [`RecipeEngine`] contract: the conformance suite runs identically
//! against it and [`MemoryEngine`](crate::MemoryEngine), which is what keeps
//! the two interchangeable.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    engine::{decide_save, EngineContext, RecipeEngine, SaveDecision},
    error::{StoreError, StoreResult},
    routing::EventKind,
    types::{Recipe, RecipeId},
};

/// One log frame.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum JournalEntry {
    Put { record: Recipe },
    Delete { id: RecipeId },
}

impl JournalEntry {
    fn encode(&self) -> StoreResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| StoreError::serialization_with_source("journal frame encode failed", e))
    }

    fn decode(frame: &Bytes) -> StoreResult<Self> {
        serde_json::from_slice(frame)
            .map_err(|e| StoreError::serialization_with_source("journal frame decode failed", e))
    }
}

#[derive(Default)]
struct JournalState {
    log: Vec<Bytes>,
    by_id: BTreeMap<i64, Recipe>,
    by_source: HashMap<String, RecipeId>,
}

impl JournalState {
    /// Appends a frame and applies it to the index in one step, so the log
    /// and the materialized view cannot drift.
    fn commit(&mut self, entry: JournalEntry) -> StoreResult<Option<Recipe>> {
        let frame = entry.encode()?;
        self.log.push(frame);
        Ok(self.apply(entry))
    }

    fn apply(&mut self, entry: JournalEntry) -> Option<Recipe> {
        match entry {
            JournalEntry::Put { record } => {
                // Records are journaled only after id assignment.
                let id = record.id?;
                if let Some(previous) = self.by_id.insert(id.0, record.clone()) {
                    if previous.source_id != record.source_id {
                        self.by_source.remove(&previous.source_id);
                    }
                }
                self.by_source.insert(record.source_id.clone(), id);
                Some(record)
            }
            JournalEntry::Delete { id } => {
                let removed = self.by_id.remove(&id.0)?;
                self.by_source.remove(&removed.source_id);
                Some(removed)
            }
        }
    }
}

/// Storage engine whose source of truth is an append-only operation log.
///
/// Cheaply cloneable via [`Arc`]; all clones share the same log and index.
#[derive(Clone)]
pub struct JournalEngine {
    ctx: EngineContext,
    state: Arc<Mutex<JournalState>>,
}

impl JournalEngine {
    /// Creates an empty journal engine over the given collaborators.
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx, state: Arc::new(Mutex::new(JournalState::default())) }
    }

    /// Number of frames currently in the log.
    #[must_use]
    pub fn journal_len(&self) -> usize {
        self.state.lock().log.len()
    }

    /// Rebuilds the index purely from the log and returns the records it
    /// yields, keyed by id.
    ///
    /// # Errors
    ///
    /// [`StoreError::Serialization`] if a frame fails to decode, which
    /// indicates log corruption.
    pub fn replay(&self) -> StoreResult<BTreeMap<i64, Recipe>> {
        let frames: Vec<Bytes> = self.state.lock().log.clone();
        let mut rebuilt = JournalState::default();
        for frame in &frames {
            let entry = JournalEntry::decode(frame)?;
            rebuilt.apply(entry);
        }
        Ok(rebuilt.by_id)
    }
}

#[async_trait]
impl RecipeEngine for JournalEngine {
    async fn save(&self, mut recipe: Recipe) -> StoreResult<Recipe> {
        // Allocation happens before any log append; a failure here leaves
        // the journal untouched and publishes nothing.
        let id = match recipe.id {
            Some(id) => id,
            None => {
                let id = self.ctx.allocate().await?;
                recipe.id = Some(id);
                id
            }
        };

        // Published while the log lock is held: bus enqueue order must match
        // append order, and publishing is synchronous and non-blocking.
        let mut state = self.state.lock();
        match decide_save(state.by_id.get(&id.0), &recipe) {
            SaveDecision::Create => {
                let _ = state.commit(JournalEntry::Put { record: recipe.clone() })?;
                debug!(%id, version = recipe.version, event = %EventKind::Saved, "journal append");
                self.ctx.publish(EventKind::Saved, &recipe);
                Ok(recipe)
            }
            SaveDecision::Replace => {
                let _ = state.commit(JournalEntry::Put { record: recipe.clone() })?;
                debug!(%id, version = recipe.version, event = %EventKind::Updated, "journal append");
                self.ctx.publish(EventKind::Updated, &recipe);
                Ok(recipe)
            }
            SaveDecision::Stale => {
                let stored = state.by_id.get(&id.0).cloned().unwrap_or_else(|| recipe.clone());
                trace!(%id, incoming = recipe.version, stored = stored.version, "stale save ignored");
                Ok(stored)
            }
        }
    }

    async fn get(&self, id: RecipeId) -> StoreResult<Option<Recipe>> {
        Ok(self.state.lock().by_id.get(&id.0).cloned())
    }

    async fn get_by_source_id(&self, source_id: &str) -> StoreResult<Option<Recipe>> {
        let state = self.state.lock();
        Ok(state.by_source.get(source_id).and_then(|id| state.by_id.get(&id.0)).cloned())
    }

    async fn delete(&self, id: Option<RecipeId>) -> StoreResult<()> {
        let Some(id) = id else {
            return Err(StoreError::invalid_argument("Could not delete recipe with no id"));
        };

        let mut state = self.state.lock();
        if state.by_id.contains_key(&id.0) {
            if let Some(record) = state.commit(JournalEntry::Delete { id })? {
                debug!(%id, "journal delete");
                self.ctx.publish(EventKind::Deleted, &record);
            }
        }
        Ok(())
    }

    async fn flush(&self) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.log.clear();
        state.by_id.clear();
        state.by_source.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::testutil::{recipe, test_context};

    fn engine() -> JournalEngine {
        let (ctx, _bus) = test_context();
        JournalEngine::new(ctx)
    }

    #[tokio::test]
    async fn accepted_saves_append_frames() {
        let engine = engine();

        let first = engine.save(recipe("s1", 100)).await.unwrap();
        assert_eq!(engine.journal_len(), 1);

        // Stale save appends nothing.
        engine.save(recipe("s1", 50).with_id(first.id.unwrap())).await.unwrap();
        assert_eq!(engine.journal_len(), 1);

        engine.save(recipe("s1", 200).with_id(first.id.unwrap())).await.unwrap();
        assert_eq!(engine.journal_len(), 2);
    }

    #[tokio::test]
    async fn replay_rebuilds_the_index() {
        let engine = engine();

        let a = engine.save(recipe("s1", 100)).await.unwrap();
        let b = engine.save(recipe("s2", 10)).await.unwrap();
        engine.save(recipe("s1", 150).with_id(a.id.unwrap())).await.unwrap();
        engine.delete(b.id).await.unwrap();

        let rebuilt = engine.replay().unwrap();
        assert_eq!(rebuilt.len(), 1);
        let record = rebuilt.get(&i64::from(a.id.unwrap())).expect("survivor");
        assert_eq!(record.version, 150);

        // Replay must agree with live reads.
        let live = engine.get(a.id.unwrap()).await.unwrap().expect("live");
        assert_eq!(&live, record);
    }

    #[tokio::test]
    async fn noop_delete_appends_nothing() {
        let engine = engine();
        engine.delete(Some(RecipeId(99))).await.unwrap();
        assert_eq!(engine.journal_len(), 0);
    }

    #[tokio::test]
    async fn flush_truncates_log_and_index() {
        let engine = engine();
        engine.save(recipe("s1", 1)).await.unwrap();

        engine.flush().await.unwrap();
        assert_eq!(engine.journal_len(), 0);
        assert!(engine.get_by_source_id("s1").await.unwrap().is_none());
        assert!(engine.replay().unwrap().is_empty());
    }
}
