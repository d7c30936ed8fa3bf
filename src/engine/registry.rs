//! Per-model registry of declared and finalized index configurations.
//!
//! Each model is finalized at most once. Readers that arrive while another
//! thread is compiling wait on the model's init lock and then observe the
//! same `Arc`.

use std::sync::{Arc, OnceLock};

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};

use crate::config::{FinalizedIndexConfig, IndexConfig};
use crate::error::{CipherdexError, Result};

struct RegistryEntry {
    declaration: IndexConfig,
    finalized: OnceLock<Arc<FinalizedIndexConfig>>,
    init: Mutex<()>,
}

impl RegistryEntry {
    fn new(declaration: IndexConfig) -> Self {
        Self {
            declaration,
            finalized: OnceLock::new(),
            init: Mutex::new(()),
        }
    }
}

#[derive(Default)]
pub struct IndexRegistry {
    models: RwLock<AHashMap<String, Arc<RegistryEntry>>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a model's declaration. Replacing a declaration is allowed
    /// until the model has been finalized.
    pub fn declare(&self, config: IndexConfig) -> Result<()> {
        let mut models = self.models.write();
        if let Some(existing) = models.get(&config.model)
            && existing.finalized.get().is_some()
        {
            return Err(CipherdexError::config(format!(
                "Index configuration for model {} is already finalized",
                config.model
            )));
        }
        models.insert(config.model.clone(), Arc::new(RegistryEntry::new(config)));
        Ok(())
    }

    pub fn is_declared(&self, model: &str) -> bool {
        self.models.read().contains_key(model)
    }

    pub fn declaration(&self, model: &str) -> Option<IndexConfig> {
        self.models
            .read()
            .get(model)
            .map(|entry| entry.declaration.clone())
    }

    /// The finalized configuration, compiling it with `compile` on first use.
    ///
    /// `compile` runs at most once per model across all threads. A failed
    /// compilation is not cached; the next call tries again.
    pub fn finalize<F>(&self, model: &str, compile: F) -> Result<Arc<FinalizedIndexConfig>>
    where
        F: FnOnce(&IndexConfig) -> Result<FinalizedIndexConfig>,
    {
        let entry = self.models.read().get(model).cloned().ok_or_else(|| {
            CipherdexError::not_found(format!(
                "No index configuration declared for model '{model}'"
            ))
        })?;

        if let Some(finalized) = entry.finalized.get() {
            return Ok(Arc::clone(finalized));
        }

        let _guard = entry.init.lock();
        if let Some(finalized) = entry.finalized.get() {
            return Ok(Arc::clone(finalized));
        }
        let finalized = Arc::new(compile(&entry.declaration)?);
        let _ = entry.finalized.set(Arc::clone(&finalized));
        Ok(finalized)
    }

    /// Finalized configurations, skipping models not finalized yet.
    pub fn finalized(&self) -> Vec<Arc<FinalizedIndexConfig>> {
        self.models
            .read()
            .values()
            .filter_map(|entry| entry.finalized.get().cloned())
            .collect()
    }

    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.models.read().keys().cloned().collect();
        models.sort();
        models
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigCompiler;
    use crate::data::FieldType;
    use crate::store::memory::MemoryRecordStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_finalize_runs_once() {
        let store = MemoryRecordStore::new();
        store.define_model("users", [("name", FieldType::String)]);
        let registry = IndexRegistry::new();
        registry
            .declare(IndexConfig::builder("users").auto(["name"]).build())
            .unwrap();

        let calls = AtomicUsize::new(0);
        let compile = |config: &IndexConfig| {
            calls.fetch_add(1, Ordering::SeqCst);
            ConfigCompiler::new(&store).compile(config)
        };

        let first = registry.finalize("users", compile).unwrap();
        let second = registry.finalize("users", compile).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.finalized().len(), 1);

        let err = registry
            .declare(IndexConfig::builder("users").build())
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_unknown_model() {
        let registry = IndexRegistry::new();
        let err = registry
            .finalize("ghosts", |_| Err(CipherdexError::config("unreachable")))
            .unwrap_err();
        assert!(matches!(err, CipherdexError::NotFound(_)));
    }

    #[test]
    fn test_failed_compile_is_not_cached() {
        let registry = IndexRegistry::new();
        registry.declare(IndexConfig::new("users")).unwrap();

        assert!(
            registry
                .finalize("users", |_| Err(CipherdexError::config("boom")))
                .is_err()
        );
        // Still replaceable after a failed finalize.
        registry.declare(IndexConfig::new("users")).unwrap();
        assert!(registry.finalized().is_empty());
    }
}
