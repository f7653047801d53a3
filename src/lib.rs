//! Pluggable recipe persistence for the cookbook services.
//!
//! This crate provides the [`RecipeEngine`] trait and related types that form
//! the storage layer for recipe records: interchangeable backend engines, an
//! optimistic versioning rule on updates, and lifecycle notifications
//! published to a topic bus so downstream consumers stay synchronized without
//! polling.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Service Layer                         │
//! │                 (API handlers, consumers)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     RecipeEngine trait                      │
//! │        (save, get, get_by_source_id, delete, flush)         │
//! ├──────────────┬───────────────────┬──────────────────────────┤
//! │ MemoryEngine │   JournalEngine   │   IdAllocator + Bus      │
//! │  (testing)   │  (append-only)    │ (external collaborators) │
//! └──────────────┴───────────────────┴──────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use recipes_storage::allocator::SequenceAllocator;
//! use recipes_storage::bus::NotificationBus;
//! use recipes_storage::engine::EngineContext;
//! use recipes_storage::routing::KeyScheme;
//! use recipes_storage::{MemoryEngine, Recipe, RecipeEngine};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = NotificationBus::new();
//!     let consumer = bus.subscribe("#.notifications.recipe.*");
//!
//!     let engine = MemoryEngine::new(EngineContext::new(
//!         Arc::new(SequenceAllocator::new()),
//!         bus.clone(),
//!         KeyScheme::new("recipes", "v1"),
//!     ));
//!
//!     // First save: id is allocated, a `saved` notification goes out.
//!     let saved = engine.save(Recipe::new("feed-1", 100, json!({"title": "Pho"}))).await?;
//!     assert!(saved.id.is_some());
//!
//!     let event = consumer.recv().await.expect("saved notification");
//!     assert!(event.routing_key().ends_with("recipe.saved"));
//!     event.ack();
//!     Ok(())
//! }
//! ```
//!
//! # Versioning
//!
//! Updates are accepted only when the incoming version is strictly greater
//! than the stored one. A rejected save is not an error: it returns the
//! previously stored record unchanged and publishes nothing, so callers
//! detect rejection by comparing versions.
//!
//! # Available Engines
//!
//! | Engine | Use Case | Physical layout |
//! |--------|----------|-----------------|
//! | [`MemoryEngine`] | Testing, development | In-memory maps |
//! | [`JournalEngine`] | Replayable history | Append-only op log |
//!
//! Every engine must pass the [`conformance`] suite unmodified before it is
//! considered interchangeable with the others.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` and `conformance` modules with shared test
//!   helpers (fixtures, bounded-time notification assertions, the scenario battery).
//!   Enable this in `[dev-dependencies]` for integration tests.

#![deny(unsafe_code)]

pub mod allocator;
pub mod bus;
pub mod config;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod conformance;
pub mod engine;
pub mod error;
pub mod journal;
pub mod memory;
pub mod routing;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use allocator::{HttpIdAllocator, IdAllocator, SequenceAllocator};
pub use bus::{Delivery, Envelope, NotificationBus, Subscription};
pub use config::{AllocatorConfig, EngineStrategy, EventsConfig, StorageConfig};
pub use engine::{Engine, EngineContext, RecipeEngine};
pub use error::{BoxError, StoreError, StoreResult};
pub use journal::JournalEngine;
pub use memory::MemoryEngine;
pub use routing::{EventKind, KeyScheme};
pub use types::{Recipe, RecipeId};
