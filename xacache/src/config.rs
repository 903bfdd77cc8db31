//! Adapter configuration with type-safe validation.
//!
//! Values are validated with `nutype` when they are constructed or
//! deserialized, so a `BridgeConfig` that exists is always usable.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use xacache_types::{ResourceError, UniqueName};

fn has_no_whitespace(prefix: &str) -> bool {
    !prefix.chars().any(char::is_whitespace)
}

/// Prefix prepended to a cache name to form its producer's unique name.
///
/// Validated to be non-empty, at most 64 characters and free of whitespace.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64, predicate = has_no_whitespace),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        AsRef,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct UniqueNamePrefix(String);

impl UniqueNamePrefix {
    /// The prefix used when none is configured.
    pub const DEFAULT: &'static str = "resource-";
}

impl Default for UniqueNamePrefix {
    fn default() -> Self {
        Self::try_new(Self::DEFAULT).expect("default prefix is always valid")
    }
}

/// Errors raised while loading a [`BridgeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document was not valid JSON or held invalid values.
    #[error("invalid bridge configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration shared by the registrator and the component-wiring lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    unique_name_prefix: UniqueNamePrefix,
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON document. Missing keys take their
    /// defaults.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(document)?)
    }

    #[must_use]
    pub fn with_unique_name_prefix(mut self, prefix: UniqueNamePrefix) -> Self {
        self.unique_name_prefix = prefix;
        self
    }

    pub const fn unique_name_prefix(&self) -> &UniqueNamePrefix {
        &self.unique_name_prefix
    }

    /// Derives the unique name for the producer of `cache_name`.
    ///
    /// The mapping is deterministic: the same cache name always yields the
    /// same unique name.
    pub fn unique_name(&self, cache_name: &str) -> Result<UniqueName, ResourceError> {
        UniqueName::try_new(format!("{}{cache_name}", self.unique_name_prefix)).map_err(|error| {
            ResourceError::InvalidName {
                resource: cache_name.to_owned(),
                detail: error.to_string(),
            }
        })
    }
}
