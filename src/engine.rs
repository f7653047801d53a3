//! Storage engine trait definition and runtime strategy selection.
//!
//! This module defines the [`RecipeEngine`] trait, the core abstraction for
//! recipe persistence. All engine implementations (MemoryEngine,
//! JournalEngine, etc.) implement this trait and must behave identically: the
//! conformance suite in [`conformance`](crate::conformance) is run unmodified
//! against every registered strategy.
//!
//! # Design Philosophy
//!
//! - **Soft outcomes are values, not errors**: a lookup miss is `Ok(None)`; a
//!   stale-version save returns the previously stored record unchanged.
//! - **One notification per accepted mutation**: engines publish `saved`,
//!   `updated` or `deleted` onto the [`NotificationBus`] after the write
//!   commits, and nothing for rejected mutations.
//! - **No invented identity**: a record without an id gets one from the
//!   [`IdAllocator`] before the first write; an allocation failure aborts the
//!   save with no partial state.
//!
//! # Implementing an Engine
//!
//! To implement a new storage engine:
//!
//! 1. Implement the [`RecipeEngine`] trait, keeping the id and source_id
//!    indices in lockstep under one critical section.
//! 2. Route allocation and event publication through [`EngineContext`].
//! 3. Register the strategy in [`Engine`] and
//!    [`EngineStrategy::all`](crate::config::EngineStrategy::all), then run
//!    the conformance suite against it.
//!
//! See [`MemoryEngine`](crate::MemoryEngine) for a reference implementation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::{
    allocator::{HttpIdAllocator, IdAllocator},
    bus::NotificationBus,
    config::{EngineStrategy, StorageConfig},
    error::StoreResult,
    journal::JournalEngine,
    memory::MemoryEngine,
    routing::{EventKind, KeyScheme},
    types::{Recipe, RecipeId},
};

/// Abstract storage engine for recipe records.
///
/// Engines are expected to be thread-safe (`Send + Sync`) and to serialize
/// concurrent mutations on the same id: the outcome of concurrent saves must
/// be equivalent to some serial order consistent with version comparison.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`save`](RecipeEngine::save) | Create or version-gated overwrite |
/// | [`get`](RecipeEngine::get) | Retrieve by internal id |
/// | [`get_by_source_id`](RecipeEngine::get_by_source_id) | Retrieve via the secondary index |
/// | [`delete`](RecipeEngine::delete) | Remove from both indices |
/// | [`flush`](RecipeEngine::flush) | Clear all records |
#[async_trait]
pub trait RecipeEngine: Send + Sync {
    /// Persists a recipe, applying the versioning rule.
    ///
    /// - No id: an id is obtained from the allocator, the record is persisted
    ///   under it, a `saved` notification carrying the full persisted record
    ///   is published, and the record is returned.
    /// - Id present, nothing stored there: creation at the given id, same
    ///   `saved` notification.
    /// - Record exists at the id: accepted iff the incoming version is
    ///   strictly greater than the stored one. Accepted saves overwrite and
    ///   publish `updated` with the full new record. Rejected saves write
    ///   nothing, publish nothing, and return the *previously stored* record
    ///   unchanged — callers detect rejection by comparing versions.
    ///
    /// # Errors
    ///
    /// [`StoreError::Allocation`](crate::StoreError::Allocation) when an id
    /// was needed and the allocation service failed; nothing is persisted and
    /// no notification is published in that case.
    #[must_use = "the returned record reveals whether the save was accepted"]
    async fn save(&self, recipe: Recipe) -> StoreResult<Recipe>;

    /// Retrieves the record stored under `id`.
    ///
    /// A miss is `Ok(None)`, never an error.
    async fn get(&self, id: RecipeId) -> StoreResult<Option<Recipe>>;

    /// Retrieves a record via the secondary `source_id` index.
    ///
    /// Returns a record equivalent to one reachable through
    /// [`get`](RecipeEngine::get); the two indices never diverge.
    async fn get_by_source_id(&self, source_id: &str) -> StoreResult<Option<Recipe>>;

    /// Removes the record stored under `id` from both indices.
    ///
    /// Deleting a missing id is a no-op: no error, no notification. Deleting
    /// an existing record publishes one `deleted` notification carrying the
    /// removed record.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidArgument`](crate::StoreError::InvalidArgument)
    /// with message `"Could not delete recipe with no id"` when `id` is
    /// `None` — that is a programmer error, not a soft miss.
    async fn delete(&self, id: Option<RecipeId>) -> StoreResult<()>;

    /// Clears all records from both indices.
    ///
    /// Idempotent; publishes nothing. Used to reset state between
    /// independent operation batches.
    async fn flush(&self) -> StoreResult<()>;
}

/// What a save should do, decided against the currently stored record.
///
/// Engines call [`decide_save`] inside their critical section so the version
/// comparison and the write are atomic with respect to concurrent saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SaveDecision {
    /// Nothing stored at this id; persist and publish `saved`.
    Create,
    /// Incoming version is newer; overwrite and publish `updated`.
    Replace,
    /// Incoming version is not newer; keep the stored record, publish nothing.
    Stale,
}

/// The versioning rule: strict greater-than.
///
/// Equal versions lose deliberately — concurrent writers proposing the same
/// version both lose to whichever committed first, so one logical change
/// never produces duplicate `updated` notifications.
pub(crate) fn decide_save(existing: Option<&Recipe>, incoming: &Recipe) -> SaveDecision {
    match existing {
        None => SaveDecision::Create,
        Some(stored) if incoming.version > stored.version => SaveDecision::Replace,
        Some(_) => SaveDecision::Stale,
    }
}

/// Collaborators shared by every engine implementation: the id allocator,
/// the notification bus and the routing-key scheme.
///
/// Cheaply cloneable; clones share the allocator and bus.
#[derive(Clone)]
pub struct EngineContext {
    allocator: Arc<dyn IdAllocator>,
    bus: NotificationBus,
    keys: KeyScheme,
}

impl EngineContext {
    /// Bundles the collaborators an engine needs.
    pub fn new(allocator: Arc<dyn IdAllocator>, bus: NotificationBus, keys: KeyScheme) -> Self {
        Self { allocator, bus, keys }
    }

    /// Requests a fresh id from the allocation service.
    pub(crate) async fn allocate(&self) -> StoreResult<RecipeId> {
        self.allocator.request_id().await
    }

    /// Publishes one lifecycle notification carrying the full record.
    ///
    /// Called after the corresponding write has committed. Fire-and-forget:
    /// a record that cannot be serialized (which a well-formed [`Recipe`]
    /// never is) loses its notification with a warning rather than failing
    /// an already-committed mutation.
    pub(crate) fn publish(&self, kind: EventKind, record: &Recipe) {
        match serde_json::to_value(record) {
            Ok(content) => self.bus.publish(&self.keys.key(kind), content),
            Err(e) => warn!(%kind, error = %e, "dropping notification for unserializable record"),
        }
    }
}

/// Unified storage engine enum.
///
/// This enum wraps every registered engine implementation, enabling runtime
/// selection by [`EngineStrategy`] while keeping static dispatch. Use this
/// when the backend is chosen from configuration.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use recipes_storage::allocator::SequenceAllocator;
/// use recipes_storage::bus::NotificationBus;
/// use recipes_storage::config::EngineStrategy;
/// use recipes_storage::engine::{Engine, EngineContext, RecipeEngine};
/// use recipes_storage::routing::KeyScheme;
/// use recipes_storage::Recipe;
/// use serde_json::json;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let ctx = EngineContext::new(
///     Arc::new(SequenceAllocator::new()),
///     NotificationBus::new(),
///     KeyScheme::new("recipes", "v1"),
/// );
/// let engine = Engine::from_parts(EngineStrategy::Memory, ctx);
///
/// let saved = engine.save(Recipe::new("s1", 100, json!({}))).await.unwrap();
/// assert!(saved.id.is_some());
/// # });
/// ```
#[derive(Clone)]
pub enum Engine {
    /// In-memory engine for testing and development.
    Memory(MemoryEngine),
    /// Append-only journal engine.
    Journal(JournalEngine),
}

impl Engine {
    /// Constructs the engine named by the configuration, wiring an
    /// [`HttpIdAllocator`] to the configured allocation endpoint.
    #[must_use]
    pub fn from_config(config: &StorageConfig, bus: NotificationBus) -> Self {
        let allocator: Arc<dyn IdAllocator> =
            Arc::new(HttpIdAllocator::new(&config.allocator.host, &config.allocator.path));
        let ctx = EngineContext::new(allocator, bus, config.events.key_scheme());
        Self::from_parts(config.strategy, ctx)
    }

    /// Constructs the engine for a strategy from pre-built collaborators.
    ///
    /// This is the seam tests use to inject a [`SequenceAllocator`] or a
    /// deliberately failing allocator.
    ///
    /// [`SequenceAllocator`]: crate::allocator::SequenceAllocator
    #[must_use]
    pub fn from_parts(strategy: EngineStrategy, ctx: EngineContext) -> Self {
        match strategy {
            EngineStrategy::Memory => Self::Memory(MemoryEngine::new(ctx)),
            EngineStrategy::Journal => Self::Journal(JournalEngine::new(ctx)),
        }
    }

    /// The strategy this engine was constructed from.
    #[must_use]
    pub fn strategy(&self) -> EngineStrategy {
        match self {
            Self::Memory(_) => EngineStrategy::Memory,
            Self::Journal(_) => EngineStrategy::Journal,
        }
    }
}

#[async_trait]
impl RecipeEngine for Engine {
    async fn save(&self, recipe: Recipe) -> StoreResult<Recipe> {
        match self {
            Self::Memory(e) => e.save(recipe).await,
            Self::Journal(e) => e.save(recipe).await,
        }
    }

    async fn get(&self, id: RecipeId) -> StoreResult<Option<Recipe>> {
        match self {
            Self::Memory(e) => e.get(id).await,
            Self::Journal(e) => e.get(id).await,
        }
    }

    async fn get_by_source_id(&self, source_id: &str) -> StoreResult<Option<Recipe>> {
        match self {
            Self::Memory(e) => e.get_by_source_id(source_id).await,
            Self::Journal(e) => e.get_by_source_id(source_id).await,
        }
    }

    async fn delete(&self, id: Option<RecipeId>) -> StoreResult<()> {
        match self {
            Self::Memory(e) => e.delete(id).await,
            Self::Journal(e) => e.delete(id).await,
        }
    }

    async fn flush(&self) -> StoreResult<()> {
        match self {
            Self::Memory(e) => e.flush().await,
            Self::Journal(e) => e.flush().await,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Engine::{}", self.strategy())
    }
}
