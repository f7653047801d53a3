//! In-memory storage engine implementation.
//!
//! This module provides [`MemoryEngine`], an in-memory implementation of
//! [`RecipeEngine`] suitable for testing and development.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Lockstep indices**: the primary (id) and secondary (source_id) maps
//!   live behind one lock, so no reader ever observes a half-applied mutation
//! - **Version-gated writes**: overwrites only land for strictly newer versions
//!
//! # Limitations
//!
//! - Data is not persisted; all records are lost when the process exits
//! - No replication or distributed features

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::{
    engine::{decide_save, EngineContext, RecipeEngine, SaveDecision},
    error::{StoreError, StoreResult},
    routing::EventKind,
    types::{Recipe, RecipeId},
};

/// Both indices, kept in lockstep under one lock.
#[derive(Default)]
struct Indices {
    by_id: BTreeMap<i64, Recipe>,
    by_source: HashMap<String, RecipeId>,
}

impl Indices {
    fn upsert(&mut self, id: RecipeId, recipe: Recipe) {
        if let Some(previous) = self.by_id.insert(id.0, recipe.clone()) {
            // A replace may change the source_id; drop the stale mapping so
            // the secondary index never points at a record that moved.
            if previous.source_id != recipe.source_id {
                self.by_source.remove(&previous.source_id);
            }
        }
        self.by_source.insert(recipe.source_id, id);
    }

    fn remove(&mut self, id: RecipeId) -> Option<Recipe> {
        let removed = self.by_id.remove(&id.0)?;
        self.by_source.remove(&removed.source_id);
        Some(removed)
    }

    fn clear(&mut self) {
        self.by_id.clear();
        self.by_source.clear();
    }
}

/// In-memory storage engine.
///
/// Primarily intended for testing, but usable anywhere persistence across
/// restarts is not required.
///
/// # Cloning
///
/// `MemoryEngine` is cheaply cloneable via [`Arc`]. All clones share the same
/// underlying indices, allocator and bus.
#[derive(Clone)]
pub struct MemoryEngine {
    ctx: EngineContext,
    indices: Arc<RwLock<Indices>>,
}

impl MemoryEngine {
    /// Creates an empty in-memory engine over the given collaborators.
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx, indices: Arc::new(RwLock::new(Indices::default())) }
    }
}

#[async_trait]
impl RecipeEngine for MemoryEngine {
    async fn save(&self, mut recipe: Recipe) -> StoreResult<Recipe> {
        // Allocate before touching any state: an allocation failure must
        // leave no partial persistence and no notification behind.
        let id = match recipe.id {
            Some(id) => id,
            None => {
                let id = self.ctx.allocate().await?;
                recipe.id = Some(id);
                id
            }
        };

        // Publication happens while the write lock is still held: bus
        // enqueue order must match commit order, and publishing is
        // synchronous and non-blocking.
        let mut indices = self.indices.write();
        match decide_save(indices.by_id.get(&id.0), &recipe) {
            SaveDecision::Create => {
                indices.upsert(id, recipe.clone());
                debug!(%id, version = recipe.version, "recipe created");
                self.ctx.publish(EventKind::Saved, &recipe);
                Ok(recipe)
            }
            SaveDecision::Replace => {
                indices.upsert(id, recipe.clone());
                debug!(%id, version = recipe.version, "recipe updated");
                self.ctx.publish(EventKind::Updated, &recipe);
                Ok(recipe)
            }
            SaveDecision::Stale => {
                let stored = indices.by_id.get(&id.0).cloned().unwrap_or_else(|| recipe.clone());
                trace!(%id, incoming = recipe.version, stored = stored.version, "stale save ignored");
                Ok(stored)
            }
        }
    }

    async fn get(&self, id: RecipeId) -> StoreResult<Option<Recipe>> {
        Ok(self.indices.read().by_id.get(&id.0).cloned())
    }

    async fn get_by_source_id(&self, source_id: &str) -> StoreResult<Option<Recipe>> {
        let indices = self.indices.read();
        Ok(indices
            .by_source
            .get(source_id)
            .and_then(|id| indices.by_id.get(&id.0))
            .cloned())
    }

    async fn delete(&self, id: Option<RecipeId>) -> StoreResult<()> {
        let Some(id) = id else {
            return Err(StoreError::invalid_argument("Could not delete recipe with no id"));
        };

        let mut indices = self.indices.write();
        if let Some(record) = indices.remove(id) {
            debug!(%id, "recipe deleted");
            self.ctx.publish(EventKind::Deleted, &record);
        }
        Ok(())
    }

    async fn flush(&self) -> StoreResult<()> {
        self.indices.write().clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        bus::NotificationBus,
        routing::KeyScheme,
        testutil::{recipe, test_context},
    };

    fn engine() -> (MemoryEngine, NotificationBus) {
        let (ctx, bus) = test_context();
        (MemoryEngine::new(ctx), bus)
    }

    #[tokio::test]
    async fn save_assigns_id_and_roundtrips() {
        let (engine, _bus) = engine();

        let saved = engine.save(recipe("s1", 100)).await.unwrap();
        let id = saved.id.expect("assigned id");
        assert_eq!(id, RecipeId(1));

        let by_id = engine.get(id).await.unwrap().expect("by id");
        let by_source = engine.get_by_source_id("s1").await.unwrap().expect("by source");
        assert_eq!(by_id, saved);
        assert_eq!(by_source, saved);
    }

    #[tokio::test]
    async fn stale_save_returns_stored_record() {
        let (engine, _bus) = engine();
        let first = engine.save(recipe("s1", 100)).await.unwrap();

        let stale = recipe("s1", 50).with_id(first.id.unwrap());
        let returned = engine.save(stale).await.unwrap();
        assert_eq!(returned.version, 100, "stale save must return the stored record");
    }

    #[tokio::test]
    async fn replace_with_changed_source_id_moves_secondary_index() {
        let (engine, _bus) = engine();
        let first = engine.save(recipe("old-source", 1)).await.unwrap();
        let id = first.id.unwrap();

        let moved = Recipe::new("new-source", 2, json!({})).with_id(id);
        engine.save(moved).await.unwrap();

        assert!(engine.get_by_source_id("old-source").await.unwrap().is_none());
        let found = engine.get_by_source_id("new-source").await.unwrap().expect("moved");
        assert_eq!(found.id, Some(id));
    }

    #[tokio::test]
    async fn delete_without_id_is_invalid_argument() {
        let (engine, _bus) = engine();
        let err = engine.delete(None).await.expect_err("must fail");
        assert_eq!(err.to_string(), "Could not delete recipe with no id");
    }

    #[tokio::test]
    async fn flush_clears_both_indices() {
        let (engine, _bus) = engine();
        engine.save(recipe("s1", 1)).await.unwrap();
        engine.save(recipe("s2", 1)).await.unwrap();

        engine.flush().await.unwrap();
        engine.flush().await.unwrap(); // idempotent

        assert!(engine.get(RecipeId(1)).await.unwrap().is_none());
        assert!(engine.get_by_source_id("s1").await.unwrap().is_none());
        assert!(engine.get_by_source_id("s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let (engine, _bus) = engine();
        let clone = engine.clone();

        let saved = engine.save(recipe("s1", 1)).await.unwrap();
        let seen = clone.get(saved.id.unwrap()).await.unwrap();
        assert_eq!(seen, Some(saved));
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            /// Applying an arbitrary version sequence to one id leaves the
            /// running maximum stored, and emits exactly one event per
            /// accepted write (one `saved`, then one `updated` per strict
            /// increase of the maximum).
            #[test]
            fn version_rule_keeps_running_max(versions in proptest::collection::vec(0i64..1000, 1..24)) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("runtime");

                rt.block_on(async {
                    let (engine, bus) = engine();
                    let sub = bus.subscribe(KeyScheme::wildcard());

                    let mut expected_max = None;
                    let mut expected_events = 0usize;
                    for &version in &versions {
                        let incoming = recipe("s", version).with_id(RecipeId(7));
                        let returned = engine.save(incoming).await.unwrap();

                        match expected_max {
                            None => {
                                expected_max = Some(version);
                                expected_events += 1; // saved
                            }
                            Some(max) if version > max => {
                                expected_max = Some(version);
                                expected_events += 1; // updated
                            }
                            Some(max) => {
                                prop_assert_eq!(returned.version, max);
                            }
                        }
                    }

                    let stored = engine.get(RecipeId(7)).await.unwrap().expect("stored");
                    prop_assert_eq!(Some(stored.version), expected_max);

                    let mut observed = 0usize;
                    while let Some(delivery) = sub.try_recv() {
                        delivery.ack();
                        observed += 1;
                    }
                    prop_assert_eq!(observed, expected_events);

                    Ok(())
                })?;
            }
        }
    }
}
