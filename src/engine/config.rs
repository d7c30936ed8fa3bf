use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::MatchOptions;

fn default_verify_collections() -> bool {
    true
}

/// Configuration for the [`Engine`](super::Engine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prepended, with `_`, to every collection name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_prefix: Option<String>,

    /// Tuning for match indexes declared without their own.
    #[serde(default)]
    pub match_defaults: MatchOptions,

    /// Check a collection against its declared indexes before the first
    /// query or write touches it.
    #[serde(default = "default_verify_collections")]
    pub verify_collections: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collection_prefix: None,
            match_defaults: MatchOptions::default(),
            verify_collections: true,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The collection name for a model's configured name.
    pub fn qualify(&self, name: &str) -> String {
        match &self.collection_prefix {
            Some(prefix) => format!("{prefix}_{name}"),
            None => name.to_string(),
        }
    }
}

#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn collection_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.collection_prefix = Some(prefix.into());
        self
    }

    pub fn match_defaults(mut self, defaults: MatchOptions) -> Self {
        self.config.match_defaults = defaults;
        self
    }

    pub fn verify_collections(mut self, verify: bool) -> Self {
        self.config.verify_collections = verify;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.verify_collections);
        assert_eq!(config.match_defaults.token_length, 3);
    }

    #[test]
    fn test_from_json() {
        let config = EngineConfig::from_json(
            r#"{"collection_prefix": "test", "match_defaults": {"tokenLength": 4, "filterSize": 256}, "verify_collections": false}"#,
        )
        .unwrap();
        assert_eq!(config.qualify("users"), "test_users");
        assert_eq!(config.match_defaults.token_length, 4);
        assert_eq!(config.match_defaults.filter_size, Some(256));
        assert!(!config.verify_collections);
    }
}
