//! Storage configuration.
//!
//! Configuration is injected at construction; loading it from files or the
//! environment is the job of whatever bootstraps the process, not this crate.

use serde::Deserialize;

use crate::routing::KeyScheme;

/// Named engine strategy selector.
///
/// Each variant maps to exactly one [`Engine`](crate::Engine) construction
/// path; there is no dynamic discovery of implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStrategy {
    /// In-memory maps; fastest, nothing survives the process.
    Memory,
    /// Append-only journal with a materialized index.
    Journal,
}

impl EngineStrategy {
    /// Every registered strategy, in a stable order.
    ///
    /// The conformance suite iterates this slice so a newly registered
    /// strategy cannot dodge the scenario battery.
    #[must_use]
    pub fn all() -> &'static [EngineStrategy] {
        &[EngineStrategy::Memory, EngineStrategy::Journal]
    }

    /// The configuration name of this strategy.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Journal => "journal",
        }
    }
}

impl std::str::FromStr for EngineStrategy {
    type Err = crate::StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "journal" => Ok(Self::Journal),
            other => Err(crate::StoreError::invalid_argument(format!(
                "Unknown storage strategy: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for EngineStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoint of the external identity allocation service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AllocatorConfig {
    /// Scheme + host (+ port), e.g. `http://ids.internal:4100`.
    pub host: String,
    /// Request path, e.g. `/v1/recipe-id`.
    pub path: String,
}

/// Producer identity baked into routing keys.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// First routing-key segment.
    pub producer: String,
    /// Second routing-key segment.
    pub version: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { producer: "recipes".to_owned(), version: "v1".to_owned() }
    }
}

impl EventsConfig {
    /// The routing-key scheme for this producer.
    #[must_use]
    pub fn key_scheme(&self) -> KeyScheme {
        KeyScheme::new(&self.producer, &self.version)
    }
}

/// Complete storage configuration: a strategy selector plus the collaborator
/// endpoints every strategy needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Which engine implementation to construct.
    pub strategy: EngineStrategy,
    /// Identity allocation endpoint.
    pub allocator: AllocatorConfig,
    /// Routing-key producer identity.
    #[serde(default)]
    pub events: EventsConfig,
}
