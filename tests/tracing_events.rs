//! Integration test verifying that engine mutation paths and the bus emit
//! `tracing` events with the expected targets.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use recipes_storage::testutil::{recipe, test_context};
use recipes_storage::{MemoryEngine, RecipeEngine};
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;

// ---------------------------------------------------------------------------
// Collecting layer — records event targets as they are emitted
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct EventCollector {
    targets: Arc<Mutex<Vec<String>>>,
}

impl<S: Subscriber> tracing_subscriber::Layer<S> for EventCollector {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        self.targets.lock().expect("lock poisoned").push(event.metadata().target().to_owned());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_emits_engine_and_bus_events() {
    let collector = EventCollector::default();
    let targets = Arc::clone(&collector.targets);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let (ctx, bus) = test_context();
    let _sub = bus.subscribe("#");
    let engine = MemoryEngine::new(ctx);
    engine.save(recipe("s1", 100)).await.expect("save");

    let recorded = targets.lock().expect("lock poisoned");
    assert!(
        recorded.iter().any(|t| t == "recipes_storage::memory"),
        "expected a memory-engine event, got: {recorded:?}"
    );
    assert!(
        recorded.iter().any(|t| t == "recipes_storage::bus"),
        "expected a bus publish event, got: {recorded:?}"
    );
}

#[tokio::test]
async fn delete_emits_an_engine_event() {
    let collector = EventCollector::default();
    let targets = Arc::clone(&collector.targets);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let (ctx, _bus) = test_context();
    let engine = MemoryEngine::new(ctx);
    let saved = engine.save(recipe("s1", 100)).await.expect("save");

    targets.lock().expect("lock poisoned").clear();
    engine.delete(saved.id).await.expect("delete");

    let recorded = targets.lock().expect("lock poisoned");
    assert!(
        recorded.iter().any(|t| t == "recipes_storage::memory"),
        "expected a delete event from the engine, got: {recorded:?}"
    );
}
