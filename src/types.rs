//! Common types used across store operations.
//!
//! This module defines the [`Recipe`] record and the [`RecipeId`] newtype
//! shared by storage engines and their consumers.

use serde::{Deserialize, Serialize};

/// Unique recipe identity assigned by the allocation service.
///
/// This type wraps a raw `i64` to prevent accidental misuse — passing a
/// version where an id is expected is a compile-time error.
///
/// # Examples
///
/// ```
/// use recipes_storage::RecipeId;
///
/// let id = RecipeId::from(42);
/// assert_eq!(i64::from(id), 42);
/// assert_eq!(id.to_string(), "42");
/// ```
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct RecipeId(pub i64);

impl From<i64> for RecipeId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<RecipeId> for i64 {
    fn from(id: RecipeId) -> Self {
        id.0
    }
}

impl std::fmt::Display for RecipeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A recipe record as persisted by a storage engine.
///
/// The core treats the [`payload`](Recipe::payload) as opaque: it is stored,
/// returned and published verbatim but never interpreted. Identity lives in
/// two fields:
///
/// - `id` — internal identity, absent until the engine assigns one on first
///   save (via the allocation service).
/// - `source_id` — caller-supplied stable identifier, used for idempotent
///   lookup independent of `id`.
///
/// `version` is a monotonically-comparable integer (timestamp or counter);
/// an update is only accepted when the incoming version is strictly greater
/// than the stored one.
///
/// # Examples
///
/// ```
/// use recipes_storage::Recipe;
/// use serde_json::json;
///
/// let recipe = Recipe::new("feed-42", 100, json!({"title": "Carbonara"}));
/// assert!(recipe.id.is_none());
/// assert_eq!(recipe.version, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Internal identity; `None` until assigned on first persistence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecipeId>,

    /// Stable external identifier supplied by the caller.
    pub source_id: String,

    /// Monotonic version; higher values represent newer states.
    pub version: i64,

    /// Opaque domain fields, never interpreted by the core.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Recipe {
    /// Creates a recipe with no id, ready for first persistence.
    pub fn new(source_id: impl Into<String>, version: i64, payload: serde_json::Value) -> Self {
        Self { id: None, source_id: source_id.into(), version, payload }
    }

    /// Returns a copy of this recipe with the given id set.
    #[must_use]
    pub fn with_id(mut self, id: RecipeId) -> Self {
        self.id = Some(id);
        self
    }

    /// Returns a copy of this recipe with the given version.
    #[must_use]
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn id_roundtrips_through_i64() {
        let id = RecipeId::from(7);
        assert_eq!(i64::from(id), 7);
    }

    #[test]
    fn absent_id_is_omitted_from_json() {
        let recipe = Recipe::new("s1", 100, json!({"title": "Pho"}));
        let value = serde_json::to_value(&recipe).expect("serialize");
        assert!(value.get("id").is_none(), "absent id must not serialize as null");
    }

    #[test]
    fn present_id_serializes_transparently() {
        let recipe = Recipe::new("s1", 100, json!({})).with_id(RecipeId(3));
        let value = serde_json::to_value(&recipe).expect("serialize");
        assert_eq!(value["id"], json!(3));
    }

    #[test]
    fn json_roundtrip_preserves_payload() {
        let recipe = Recipe::new("s1", 5, json!({"steps": ["boil", "serve"]}));
        let bytes = serde_json::to_vec(&recipe).expect("serialize");
        let back: Recipe = serde_json::from_slice(&bytes).expect("deserialize");
        assert_eq!(back, recipe);
    }
}
