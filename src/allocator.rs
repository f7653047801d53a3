//! Identity allocation clients.
//!
//! A storage engine never invents recipe ids. When a record arrives without
//! one, the engine asks an [`IdAllocator`] for a globally unique integer
//! before the first write. The production implementation,
//! [`HttpIdAllocator`], talks to one configured external endpoint;
//! [`SequenceAllocator`] is a process-local counter for tests and
//! development, analogous to an in-memory backend.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::{
    error::{StoreError, StoreResult},
    types::RecipeId,
};

/// Source of globally unique recipe ids.
///
/// Implementations must be thread-safe; an engine may allocate from several
/// concurrent save calls.
#[async_trait]
pub trait IdAllocator: Send + Sync {
    /// Requests one fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Allocation`] when no id could be obtained. The
    /// caller must treat this as a hard failure: no record is written and no
    /// notification is published.
    async fn request_id(&self) -> StoreResult<RecipeId>;
}

/// Success response body of the allocation endpoint.
#[derive(Debug, Deserialize)]
struct AllocatedId {
    id: i64,
}

/// HTTP client for the external identity allocation service.
///
/// Issues `GET {host}{path}` and expects a success status with a JSON body
/// of the form `{"id": <integer>}`. Anything else — transport failure,
/// non-success status, malformed body — is an allocation failure.
///
/// # Example
///
/// ```no_run
/// use recipes_storage::allocator::{HttpIdAllocator, IdAllocator};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let allocator = HttpIdAllocator::new("http://ids.internal:4100", "/v1/recipe-id");
/// let id = allocator.request_id().await?;
/// # Ok(())
/// # }
/// ```
pub struct HttpIdAllocator {
    client: reqwest::Client,
    host: String,
    path: String,
}

impl HttpIdAllocator {
    /// Creates a client for the given endpoint host and path.
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), host: host.into(), path: path.into() }
    }

    fn url(&self) -> String {
        format!("{}{}", self.host, self.path)
    }
}

#[async_trait]
impl IdAllocator for HttpIdAllocator {
    async fn request_id(&self) -> StoreResult<RecipeId> {
        let url = self.url();
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::allocation_with_source(format!("request to {url} failed"), e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::allocation(format!(
                "allocation endpoint {url} returned {status}"
            )));
        }

        let body: AllocatedId = resp
            .json()
            .await
            .map_err(|e| StoreError::allocation_with_source("invalid allocation response", e))?;

        debug!(id = body.id, "allocated recipe id");
        Ok(RecipeId(body.id))
    }
}

/// Process-local allocator handing out sequential ids.
///
/// Starts at 1, matching the first id a fresh deployment of the allocation
/// service would produce. Intended for tests and development.
#[derive(Debug)]
pub struct SequenceAllocator {
    next: AtomicI64,
}

impl SequenceAllocator {
    /// Creates an allocator whose first id is 1.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates an allocator whose first id is `first`.
    #[must_use]
    pub fn starting_at(first: i64) -> Self {
        Self { next: AtomicI64::new(first) }
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdAllocator for SequenceAllocator {
    async fn request_id(&self) -> StoreResult<RecipeId> {
        Ok(RecipeId(self.next.fetch_add(1, Ordering::Relaxed)))
    }
}
