//! Shared test utilities for storage engine testing.
//!
//! This module provides common helpers for building engine fixtures,
//! generating recipe records, and asserting on notifications. It is
//! feature-gated behind `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! recipes-storage = { path = ".", features = ["testutil"] }
//! ```

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::{
    allocator::{IdAllocator, SequenceAllocator},
    bus::{Delivery, NotificationBus, Subscription},
    engine::EngineContext,
    error::{StoreError, StoreResult},
    routing::{KeyScheme, TopicPattern},
    types::{Recipe, RecipeId},
};

/// How long notification assertions wait before giving up.
///
/// Generous relative to the in-process bus, where publication is synchronous
/// with the mutation; the bound exists so a missing event fails the test
/// instead of hanging it.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Builds an [`EngineContext`] over a fresh bus, a [`SequenceAllocator`]
/// starting at 1, and the default `recipes.v1` key scheme.
///
/// Returns the bus alongside so tests can subscribe to the notifications the
/// engine will publish.
#[must_use]
pub fn test_context() -> (EngineContext, NotificationBus) {
    let bus = NotificationBus::new();
    let ctx = EngineContext::new(
        Arc::new(SequenceAllocator::new()),
        bus.clone(),
        KeyScheme::new("recipes", "v1"),
    );
    (ctx, bus)
}

/// Creates a recipe with no id and a small distinguishable payload.
#[must_use]
pub fn recipe(source_id: &str, version: i64) -> Recipe {
    Recipe::new(source_id, version, json!({ "title": format!("recipe for {source_id}") }))
}

/// Allocator that always fails, for exercising the no-partial-state rule.
#[derive(Debug, Default)]
pub struct FailingAllocator;

#[async_trait]
impl IdAllocator for FailingAllocator {
    async fn request_id(&self) -> StoreResult<RecipeId> {
        Err(StoreError::allocation("allocation endpoint returned 503 Service Unavailable"))
    }
}

/// Waits up to [`DELIVERY_TIMEOUT`] for the first delivery whose routing key
/// matches `pattern`, acknowledging and discarding non-matching messages.
///
/// Returns `None` on timeout or once the subscription closes. This is the
/// bounded-time replacement for polling loops: a missing event fails fast
/// and deterministically.
pub async fn await_matching(sub: &Subscription, pattern: &str) -> Option<Delivery> {
    let pattern = TopicPattern::parse(pattern);
    let deadline = tokio::time::Instant::now() + DELIVERY_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match timeout(remaining, sub.recv()).await {
            Ok(Some(delivery)) if pattern.matches(delivery.routing_key()) => {
                return Some(delivery)
            }
            Ok(Some(other)) => other.ack(),
            Ok(None) | Err(_) => return None,
        }
    }
}

/// Drains every currently queued delivery, acknowledging each, and returns
/// `(routing_key, content)` pairs in delivery order.
///
/// Publication on the in-process bus is synchronous with the mutation, so
/// after an awaited engine call this sees everything that call emitted.
#[must_use]
pub fn drain(sub: &Subscription) -> Vec<(String, Value)> {
    let mut collected = Vec::new();
    while let Some(delivery) = sub.try_recv() {
        collected.push((delivery.routing_key().to_owned(), delivery.content().clone()));
        delivery.ack();
    }
    collected
}

/// Assert that a [`StoreResult`] is a [`StoreError::InvalidArgument`],
/// optionally with an exact message.
#[macro_export]
macro_rules! assert_invalid_argument {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::StoreError::InvalidArgument { .. })),
            "expected StoreError::InvalidArgument, got: {:?}",
            $result,
        );
    };
    ($result:expr, $message:expr) => {
        match &$result {
            Err($crate::StoreError::InvalidArgument { message }) => {
                assert_eq!(message, $message, "InvalidArgument message mismatch");
            }
            other => panic!("expected StoreError::InvalidArgument, got: {other:?}"),
        }
    };
}

/// Assert that a [`StoreResult`] is a [`StoreError::Allocation`].
#[macro_export]
macro_rules! assert_allocation_error {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::StoreError::Allocation { .. })),
            "expected StoreError::Allocation, got: {:?}",
            $result,
        );
    };
}
