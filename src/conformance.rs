//! Conformance test suite for [`RecipeEngine`] implementations.
//!
//! This module provides a fixed battery of async scenarios that validate
//! whether a storage engine correctly satisfies the trait contract. Every
//! registered strategy runs the same suite unmodified — that is the mechanism
//! keeping backends semantically interchangeable. A new engine is not
//! conformant until every scenario here passes against it.
//!
//! Each scenario builds its own isolated harness (fresh engine, fresh
//! notification bus, sequence allocator starting at 1), so scenarios can run
//! in any order and in parallel.
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each scenario with a strategy:
//!
//! ```no_run
//! use recipes_storage::config::EngineStrategy;
//! use recipes_storage::conformance;
//!
//! # async fn wire_up() {
//! conformance::roundtrip_by_both_indices(EngineStrategy::Memory).await;
//! # }
//! ```
//!
//! # Scenario Categories
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | Save | Id assignment, creation, round-trips |
//! | Versioning | Strict greater-than acceptance, silent stale rejection |
//! | Delete | Both-index removal, idempotence, invalid-argument |
//! | Flush | Full reset without notifications |
//! | Events | Exactly one notification per accepted mutation |
//! | Failure | Allocation errors leave no partial state |
//! | Concurrency | Per-id serialization, highest version wins |

use std::sync::Arc;

use serde_json::json;

use crate::{
    allocator::IdAllocator,
    bus::{NotificationBus, Subscription},
    config::EngineStrategy,
    engine::{Engine, EngineContext, RecipeEngine},
    routing::{EventKind, KeyScheme},
    testutil::{await_matching, drain, recipe, test_context, FailingAllocator},
    types::{Recipe, RecipeId},
};

/// One isolated engine-under-test with its bus and a recipe-event
/// subscription already bound.
pub struct Harness {
    /// The engine built for the strategy under test.
    pub engine: Engine,
    /// The bus the engine publishes to.
    pub bus: NotificationBus,
    /// Subscription bound to `#.notifications.recipe.*`.
    pub sub: Subscription,
}

impl Harness {
    /// Builds a harness for the given strategy with the default test
    /// collaborators.
    #[must_use]
    pub fn new(strategy: EngineStrategy) -> Self {
        let (ctx, bus) = test_context();
        let sub = bus.subscribe(KeyScheme::wildcard());
        Self { engine: Engine::from_parts(strategy, ctx), bus, sub }
    }

    /// Builds a harness with a caller-supplied allocator.
    #[must_use]
    pub fn with_allocator(strategy: EngineStrategy, allocator: Arc<dyn IdAllocator>) -> Self {
        let bus = NotificationBus::new();
        let sub = bus.subscribe(KeyScheme::wildcard());
        let ctx = EngineContext::new(allocator, bus.clone(), KeyScheme::new("recipes", "v1"));
        Self { engine: Engine::from_parts(strategy, ctx), bus, sub }
    }
}

fn expect_key(kind: EventKind) -> String {
    KeyScheme::new("recipes", "v1").key(kind)
}

// ============================================================================
// Save — id assignment, creation, round-trips
// ============================================================================

/// A record saved without an id comes back with a freshly allocated one.
pub async fn save_without_id_assigns_fresh_id(strategy: EngineStrategy) {
    let h = Harness::new(strategy);
    let saved = h.engine.save(recipe("s1", 100)).await.expect("save");
    assert_eq!(saved.id, Some(RecipeId(1)), "first allocation should yield id 1");
}

/// A saved record is reachable through both indices, equal modulo nothing.
pub async fn roundtrip_by_both_indices(strategy: EngineStrategy) {
    let h = Harness::new(strategy);
    let saved = h.engine.save(recipe("s1", 100)).await.expect("save");
    let id = saved.id.expect("assigned id");

    let by_id = h.engine.get(id).await.expect("get").expect("present by id");
    let by_source =
        h.engine.get_by_source_id("s1").await.expect("get").expect("present by source_id");

    assert_eq!(by_id, saved);
    assert_eq!(by_source, saved);
}

/// Saving at an explicit id with nothing stored there is a creation.
pub async fn save_at_unused_id_is_creation(strategy: EngineStrategy) {
    let h = Harness::new(strategy);
    let incoming = recipe("s9", 10).with_id(RecipeId(42));

    let saved = h.engine.save(incoming.clone()).await.expect("save");
    assert_eq!(saved, incoming);

    let events = drain(&h.sub);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, expect_key(EventKind::Saved), "creation at explicit id emits saved");
}

/// `get` on an id that was never stored returns the absent sentinel.
pub async fn get_missing_returns_none(strategy: EngineStrategy) {
    let h = Harness::new(strategy);
    let result = h.engine.get(RecipeId(404)).await.expect("get should not error");
    assert_eq!(result, None);
}

/// `get_by_source_id` on an unknown source returns the absent sentinel.
pub async fn get_by_unknown_source_returns_none(strategy: EngineStrategy) {
    let h = Harness::new(strategy);
    let result = h.engine.get_by_source_id("ghost").await.expect("get should not error");
    assert_eq!(result, None);
}

// ============================================================================
// Versioning — strict greater-than acceptance
// ============================================================================

/// A lower incoming version is silently rejected: no write, no event, and
/// the previously stored record is returned unchanged.
pub async fn stale_version_is_silently_rejected(strategy: EngineStrategy) {
    let h = Harness::new(strategy);
    let stored = h.engine.save(recipe("s1", 100)).await.expect("save");
    drain(&h.sub); // discard the saved event

    let stale = recipe("s1", 50).with_id(stored.id.expect("id"));
    let returned = h.engine.save(stale).await.expect("stale save must not error");

    assert_eq!(returned, stored, "rejected save returns the stored record");
    assert!(drain(&h.sub).is_empty(), "rejected save must publish nothing");

    let current = h.engine.get(stored.id.expect("id")).await.expect("get").expect("present");
    assert_eq!(current.version, 100);
}

/// An equal version also loses — the comparison is strict greater-than.
pub async fn equal_version_is_rejected(strategy: EngineStrategy) {
    let h = Harness::new(strategy);
    let stored = h.engine.save(recipe("s1", 100)).await.expect("save");
    drain(&h.sub);

    let same = Recipe::new("s1", 100, json!({"title": "impostor"})).with_id(stored.id.expect("id"));
    let returned = h.engine.save(same).await.expect("save");

    assert_eq!(returned, stored, "equal version must not overwrite");
    let current = h.engine.get(stored.id.expect("id")).await.expect("get").expect("present");
    assert_eq!(current.payload, stored.payload);
    assert!(drain(&h.sub).is_empty());
}

/// A strictly newer version overwrites and emits exactly one updated event
/// whose content matches the new record.
pub async fn newer_version_overwrites(strategy: EngineStrategy) {
    let h = Harness::new(strategy);
    let stored = h.engine.save(recipe("s1", 100)).await.expect("save");
    drain(&h.sub);

    let newer = recipe("s1", 200).with_id(stored.id.expect("id"));
    let returned = h.engine.save(newer.clone()).await.expect("save");
    assert_eq!(returned, newer);

    let events = drain(&h.sub);
    assert_eq!(events.len(), 1, "exactly one event per accepted update");
    assert_eq!(events[0].0, expect_key(EventKind::Updated));
    assert_eq!(events[0].1, serde_json::to_value(&newer).expect("serialize"));
}

/// A replace that changes the source_id moves the secondary index with it.
pub async fn source_index_follows_replaces(strategy: EngineStrategy) {
    let h = Harness::new(strategy);
    let stored = h.engine.save(recipe("before", 1)).await.expect("save");
    let id = stored.id.expect("id");

    h.engine.save(recipe("after", 2).with_id(id)).await.expect("save");

    assert_eq!(h.engine.get_by_source_id("before").await.expect("get"), None);
    let found = h.engine.get_by_source_id("after").await.expect("get").expect("present");
    assert_eq!(found.id, Some(id), "secondary index must follow the record");
}

// ============================================================================
// Events — exactly one notification per accepted mutation
// ============================================================================

/// Creation publishes exactly one `saved` event whose content equals the
/// persisted record, including the assigned id.
pub async fn creation_emits_one_saved_event(strategy: EngineStrategy) {
    let h = Harness::new(strategy);
    let saved = h.engine.save(recipe("s1", 100)).await.expect("save");

    let delivery = await_matching(&h.sub, "#.notifications.recipe.saved")
        .await
        .expect("saved event within timeout");
    assert_eq!(delivery.content(), &serde_json::to_value(&saved).expect("serialize"));
    delivery.ack();

    assert!(drain(&h.sub).is_empty(), "exactly one event per creation");
}

/// Deletion publishes exactly one `deleted` event carrying the removed id,
/// and the record becomes absent.
pub async fn deletion_emits_one_deleted_event(strategy: EngineStrategy) {
    let h = Harness::new(strategy);
    let saved = h.engine.save(recipe("s1", 100)).await.expect("save");
    let id = saved.id.expect("id");
    drain(&h.sub);

    h.engine.delete(Some(id)).await.expect("delete");

    let delivery = await_matching(&h.sub, "#.notifications.recipe.deleted")
        .await
        .expect("deleted event within timeout");
    assert_eq!(delivery.content()["id"], json!(i64::from(id)), "content carries the deleted id");
    delivery.ack();

    assert_eq!(h.engine.get(id).await.expect("get"), None);
    assert!(drain(&h.sub).is_empty());
}

// ============================================================================
// Delete — idempotence and argument validation
// ============================================================================

/// Deleting a missing id twice is a double no-op: no error, no event.
pub async fn delete_missing_is_idempotent_noop(strategy: EngineStrategy) {
    let h = Harness::new(strategy);
    h.engine.delete(Some(RecipeId(404))).await.expect("first delete");
    h.engine.delete(Some(RecipeId(404))).await.expect("second delete");
    assert!(drain(&h.sub).is_empty(), "no-op deletes must publish nothing");
}

/// Deleting with no id at all is a programmer error with a stable message.
pub async fn delete_without_id_fails(strategy: EngineStrategy) {
    let h = Harness::new(strategy);
    let result = h.engine.delete(None).await;
    crate::assert_invalid_argument!(result, "Could not delete recipe with no id");
    assert!(drain(&h.sub).is_empty());
}

// ============================================================================
// Flush — full reset
// ============================================================================

/// `flush` clears both indices, is idempotent, and emits nothing.
pub async fn flush_clears_everything_silently(strategy: EngineStrategy) {
    let h = Harness::new(strategy);
    let a = h.engine.save(recipe("s1", 1)).await.expect("save");
    h.engine.save(recipe("s2", 1)).await.expect("save");
    drain(&h.sub);

    h.engine.flush().await.expect("flush");
    h.engine.flush().await.expect("flush is idempotent");

    assert_eq!(h.engine.get(a.id.expect("id")).await.expect("get"), None);
    assert_eq!(h.engine.get_by_source_id("s1").await.expect("get"), None);
    assert_eq!(h.engine.get_by_source_id("s2").await.expect("get"), None);
    assert!(drain(&h.sub).is_empty(), "flush must not emit notifications");
}

// ============================================================================
// Failure — allocation errors leave no partial state
// ============================================================================

/// When the allocator fails, the save fails, nothing is persisted under the
/// source_id, and no notification is published.
pub async fn allocation_failure_leaves_no_partial_state(strategy: EngineStrategy) {
    let h = Harness::with_allocator(strategy, Arc::new(FailingAllocator));

    let result = h.engine.save(recipe("s1", 100)).await;
    crate::assert_allocation_error!(result);

    assert_eq!(h.engine.get_by_source_id("s1").await.expect("get"), None);
    assert!(drain(&h.sub).is_empty(), "failed save must publish nothing");
}

// ============================================================================
// Concurrency — per-id serialization
// ============================================================================

/// Concurrent saves to one id settle on the highest version regardless of
/// arrival order, and every accepted write emits exactly one event with a
/// strictly increasing version.
pub async fn concurrent_saves_highest_version_wins(strategy: EngineStrategy) {
    let h = Harness::new(strategy);
    let id = RecipeId(1);

    let mut handles = Vec::new();
    for version in 1..=16i64 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            engine.save(recipe("s1", version).with_id(id)).await.expect("concurrent save");
        }));
    }
    for handle in handles {
        handle.await.expect("task join");
    }

    let stored = h.engine.get(id).await.expect("get").expect("present");
    assert_eq!(stored.version, 16, "highest version must win");

    let events = drain(&h.sub);
    assert!(!events.is_empty(), "the winning write must be announced");
    assert!(events.len() <= 16);
    let versions: Vec<i64> = events
        .iter()
        .map(|(_, content)| content["version"].as_i64().expect("version field"))
        .collect();
    assert!(
        versions.windows(2).all(|w| w[0] < w[1]),
        "event versions must be strictly increasing: {versions:?}"
    );
    assert_eq!(*versions.last().expect("non-empty"), 16);
}

// ============================================================================
// End-to-end lifecycle
// ============================================================================

/// The full create, stale write, update, delete lifecycle on one record.
pub async fn full_lifecycle(strategy: EngineStrategy) {
    let h = Harness::new(strategy);

    // Creation with no id: allocator assigns 1.
    let saved = h
        .engine
        .save(Recipe::new("S1", 100, json!({"title": "Ratatouille"})))
        .await
        .expect("save");
    assert_eq!(saved.id, Some(RecipeId(1)));
    let fetched = h.engine.get(RecipeId(1)).await.expect("get").expect("present");
    assert_eq!(fetched.id, Some(RecipeId(1)));

    // Stale write is ignored.
    let stale = Recipe::new("S1", 50, json!({"title": "stale"})).with_id(RecipeId(1));
    let returned = h.engine.save(stale).await.expect("save");
    assert_eq!(returned.version, 100);

    // Newer write lands.
    let newer = Recipe::new("S1", 200, json!({"title": "Ratatouille v2"})).with_id(RecipeId(1));
    h.engine.save(newer).await.expect("save");
    let current = h.engine.get(RecipeId(1)).await.expect("get").expect("present");
    assert_eq!(current.version, 200);

    // Delete removes the record.
    h.engine.delete(Some(RecipeId(1))).await.expect("delete");
    assert_eq!(h.engine.get(RecipeId(1)).await.expect("get"), None);

    // Exactly: saved, updated, deleted — in that order.
    let events = drain(&h.sub);
    let kinds: Vec<&str> = events
        .iter()
        .map(|(key, _)| key.rsplit('.').next().expect("non-empty key"))
        .collect();
    assert_eq!(kinds, vec!["saved", "updated", "deleted"]);
    assert_eq!(events[2].1["id"], json!(1), "deleted event carries the id");
}

// ============================================================================
// Convenience runner — run the whole battery against one strategy
// ============================================================================

/// Runs the full conformance battery against the given strategy.
///
/// A convenience for engine authors wanting a one-line invocation; for
/// fine-grained failure reporting, call the individual scenarios.
pub async fn run_all(strategy: EngineStrategy) {
    // Save
    save_without_id_assigns_fresh_id(strategy).await;
    roundtrip_by_both_indices(strategy).await;
    save_at_unused_id_is_creation(strategy).await;
    get_missing_returns_none(strategy).await;
    get_by_unknown_source_returns_none(strategy).await;

    // Versioning
    stale_version_is_silently_rejected(strategy).await;
    equal_version_is_rejected(strategy).await;
    newer_version_overwrites(strategy).await;
    source_index_follows_replaces(strategy).await;

    // Events
    creation_emits_one_saved_event(strategy).await;
    deletion_emits_one_deleted_event(strategy).await;

    // Delete
    delete_missing_is_idempotent_noop(strategy).await;
    delete_without_id_fails(strategy).await;

    // Flush
    flush_clears_everything_silently(strategy).await;

    // Failure
    allocation_failure_leaves_no_partial_state(strategy).await;

    // Concurrency
    concurrent_saves_highest_version_wins(strategy).await;

    // Lifecycle
    full_lifecycle(strategy).await;
}
