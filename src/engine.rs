pub mod config;
pub mod consistency;
pub mod registry;
pub mod schema;
pub mod search;

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashSet;
use parking_lot::RwLock;

use crate::config::{ConfigCompiler, FinalizedIndexConfig, IndexConfig, PropagationRule};
use crate::data::{Record, Value};
use crate::error::Result;
use crate::index::IndexSet;
use crate::query::QueryBuilder;
use crate::store::{HookHandler, RecordStore, SearchBackend, Trigger};

use self::config::EngineConfig;
use self::consistency::CollectionMetadata;
use self::registry::IndexRegistry;
use self::schema::{SchemaCompiler, SchemaDocument};
use self::search::Query;

/// Facade over index configuration, collection lifecycle, indexing and
/// querying.
///
/// The engine owns the per-model registry of index configurations and talks
/// to the two collaborators: the [`RecordStore`] holding full rows and the
/// [`SearchBackend`] holding encrypted indexes.
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn RecordStore>,
    backend: Arc<dyn SearchBackend>,
    registry: IndexRegistry,
    /// Collections that passed the consistency check.
    verified: RwLock<AHashSet<String>>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn SearchBackend>,
    ) -> Self {
        Self {
            config,
            store,
            backend,
            registry: IndexRegistry::new(),
            verified: RwLock::new(AHashSet::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub(crate) fn backend(&self) -> &dyn SearchBackend {
        self.backend.as_ref()
    }

    /// Declare a model's indexes. Compilation is deferred until first use.
    pub fn register(&self, config: IndexConfig) -> Result<()> {
        self.registry.declare(config)
    }

    /// The model's finalized index configuration, compiled on first call.
    ///
    /// The first successful compilation also hands the model's propagation
    /// rules to the record store.
    pub fn indexes(&self, model: &str) -> Result<Arc<FinalizedIndexConfig>> {
        self.registry.finalize(model, |declaration| {
            let finalized = ConfigCompiler::new(self.store.as_ref())
                .with_match_defaults(self.config.match_defaults)
                .compile(declaration)?;
            finalized.register_callbacks(self.store.as_ref());
            log::debug!(
                "finalized {} indexes for model {}",
                finalized.indexes().len(),
                model
            );
            Ok(finalized)
        })
    }

    /// Models with a declared index configuration.
    pub fn models(&self) -> Vec<String> {
        self.registry.models()
    }

    pub fn schema(&self, model: &str) -> Result<SchemaDocument> {
        let finalized = self.indexes(model)?;
        Ok(SchemaCompiler::compile_config(&finalized))
    }

    pub fn collection_name(&self, model: &str) -> Result<String> {
        let finalized = self.indexes(model)?;
        Ok(self.config.qualify(finalized.collection_name()))
    }

    pub fn create_collection(&self, model: &str) -> Result<()> {
        let name = self.collection_name(model)?;
        let schema = self.schema(model)?;
        self.backend.create_collection(&name, &schema)?;
        self.verified.write().insert(name.clone());
        log::info!(
            "created collection '{name}' with {} indexes",
            schema.indexes.len()
        );
        Ok(())
    }

    /// Drop the model's collection. No consistency check runs first.
    pub fn drop_collection(&self, model: &str) -> Result<()> {
        let name = self.collection_name(model)?;
        self.verified.write().remove(&name);
        self.backend.drop_collection(&name)?;
        log::info!("dropped collection '{name}'");
        Ok(())
    }

    /// Metadata of the model's deployed collection, after checking it
    /// against the declared indexes.
    pub fn collection_info(&self, model: &str) -> Result<CollectionMetadata> {
        let finalized = self.indexes(model)?;
        let name = self.config.qualify(finalized.collection_name());
        let metadata = self.backend.collection_metadata(&name)?;
        consistency::check(finalized.indexes(), &metadata)?;
        self.verified.write().insert(name);
        Ok(metadata)
    }

    /// Run the consistency check now, regardless of cached results.
    pub fn verify(&self, model: &str) -> Result<()> {
        self.collection_info(model).map(|_| ())
    }

    pub(crate) fn ensure_verified(&self, collection: &str, indexes: &IndexSet) -> Result<()> {
        if !self.config.verify_collections || self.verified.read().contains(collection) {
            return Ok(());
        }
        let metadata = self.backend.collection_metadata(collection)?;
        consistency::check(indexes, &metadata)?;
        self.verified.write().insert(collection.to_string());
        Ok(())
    }

    /// Index a record, assigning it a stash id if it has none. Returns the
    /// stash id.
    pub fn put(&self, model: &str, record: &mut Record) -> Result<String> {
        let finalized = self.indexes(model)?;
        let collection = self.config.qualify(finalized.collection_name());
        self.ensure_verified(&collection, finalized.indexes())?;

        let id = record.ensure_id().to_string();
        let document = self.build_document(&finalized, record)?;
        self.backend.upsert(&collection, &id, &document)?;
        Ok(id)
    }

    pub fn delete(&self, model: &str, id: &str) -> Result<()> {
        let finalized = self.indexes(model)?;
        let collection = self.config.qualify(finalized.collection_name());
        self.ensure_verified(&collection, finalized.indexes())?;
        self.backend.delete(&collection, id)
    }

    /// The document sent to the backend for `record`.
    ///
    /// Local fields are keyed by name. Denormalized fields are read from the
    /// association as the record store currently holds it and keyed by their
    /// wire name; a missing association omits its keys.
    pub fn build_document(
        &self,
        finalized: &FinalizedIndexConfig,
        record: &Record,
    ) -> Result<BTreeMap<String, Value>> {
        let mut associated: BTreeMap<&str, Option<Record>> = BTreeMap::new();
        for association in finalized.associations() {
            let loaded = self
                .store
                .associated(finalized.model(), record, association)?;
            associated.insert(association, loaded);
        }

        let mut document = BTreeMap::new();
        for path in finalized.field_types().keys() {
            let source = match path.association() {
                Some(association) => associated.get(association).and_then(Option::as_ref),
                None => Some(record),
            };
            let Some(value) = source.and_then(|source| source.get(path.field())) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            document.insert(path.wire_name(), value.clone().normalize());
        }
        Ok(document)
    }

    /// Re-index every stored record of `model`. Returns how many were indexed.
    pub fn reindex(&self, model: &str) -> Result<usize> {
        let mut indexed = 0;
        for mut record in self.store.fetch_page(model, None, None)? {
            if record.id().is_none() {
                log::warn!("skipping {model} record without a stash id during reindex");
                continue;
            }
            self.put(model, &mut record)?;
            indexed += 1;
        }
        log::info!("reindexed {indexed} {model} records");
        Ok(indexed)
    }

    /// Apply one propagation rule to the owners of a changed record.
    /// Returns how many owners were re-indexed.
    pub fn propagate(&self, rule: &PropagationRule, record: &Record) -> Result<usize> {
        let mut refreshed = 0;
        for mut owner in self
            .store
            .owners_of(&rule.owner_model, &rule.association, record)?
        {
            if owner.id().is_none() {
                log::warn!(
                    "skipping {} owner without a stash id while propagating {}",
                    rule.owner_model,
                    rule.association
                );
                continue;
            }
            self.put(&rule.owner_model, &mut owner)?;
            refreshed += 1;
        }
        Ok(refreshed)
    }

    /// Propagate a lifecycle event on `source_model` through every finalized
    /// model's rules.
    pub fn notify(&self, source_model: &str, trigger: Trigger, record: &Record) -> Result<usize> {
        let mut refreshed = 0;
        for finalized in self.registry.finalized() {
            for rule in finalized.propagation_rules() {
                if rule.source_model == source_model && rule.trigger == trigger {
                    refreshed += self.propagate(rule, record)?;
                }
            }
        }
        Ok(refreshed)
    }

    /// A hook handler for record stores that forwards to [`Engine::propagate`].
    /// Holds the engine weakly.
    pub fn propagation_handler(self: &Arc<Self>) -> HookHandler {
        let engine = Arc::downgrade(self);
        Arc::new(move |rule: &PropagationRule, record: &Record| {
            match engine.upgrade() {
                Some(engine) => engine.propagate(rule, record),
                None => Ok(0),
            }
        })
    }

    /// Start a query against `model`.
    pub fn query(&self, model: &str) -> Result<Query<'_>> {
        let finalized = self.indexes(model)?;
        let collection = self.config.qualify(finalized.collection_name());
        Ok(Query::new(self, finalized, collection))
    }

    /// Whether no indexed record other than `except_id` has `field == value`.
    pub fn is_unique(
        &self,
        model: &str,
        field: &str,
        value: impl Into<Value>,
        except_id: Option<&str>,
    ) -> Result<bool> {
        let ids = self
            .query(model)?
            .filter(QueryBuilder::new().eq(field, value))?
            .ids()?;
        Ok(ids.iter().all(|id| Some(id.as_str()) == except_id))
    }
}
