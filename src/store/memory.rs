//! In-process collaborators for tests and local development.
//!
//! [`MemoryRecordStore`] keeps rows per model in insertion order and returns
//! [`RecordStore::fetch_by_ids`] results in that order, not in the order the
//! ids were asked for. [`MemorySearchBackend`] evaluates query plans against
//! the documents it was sent, using the schema each collection was created
//! with to resolve index names.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::config::compiler::PropagationRule;
use crate::data::{FieldType, Record, Value};
use crate::engine::consistency::CollectionMetadata;
use crate::engine::schema::{IndexMapping, SchemaDocument};
use crate::error::{CipherdexError, Result};
use crate::index::Operator;
use crate::query::plan::{BoundConstraint, Direction, QueryPlan};
use crate::store::{
    AssociationKind, HookHandler, ModelCatalog, RecordStore, SearchBackend, Trigger,
};

#[derive(Debug, Clone)]
enum Association {
    /// The target row holds `foreign_key` pointing at the owner's id.
    HasOne { target: String, foreign_key: String },
    /// The owner row holds `foreign_key` pointing at the target's id.
    BelongsTo { target: String, foreign_key: String },
    HasMany { target: String },
}

impl Association {
    fn target(&self) -> &str {
        match self {
            Association::HasOne { target, .. }
            | Association::BelongsTo { target, .. }
            | Association::HasMany { target } => target,
        }
    }
}

#[derive(Debug, Default)]
struct Model {
    fields: BTreeMap<String, FieldType>,
    associations: BTreeMap<String, Association>,
    rows: Vec<Record>,
}

#[derive(Default)]
pub struct MemoryRecordStore {
    models: RwLock<AHashMap<String, Model>>,
    hooks: RwLock<Vec<PropagationRule>>,
    handler: RwLock<Option<HookHandler>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_model<I, S>(&self, model: &str, fields: I)
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        let mut models = self.models.write();
        let entry = models.entry(model.to_string()).or_default();
        entry
            .fields
            .extend(fields.into_iter().map(|(name, ty)| (name.into(), ty)));
    }

    /// `model` has one `target` whose `foreign_key` holds the owner's id.
    pub fn define_has_one(&self, model: &str, association: &str, target: &str, foreign_key: &str) {
        self.define_association(
            model,
            association,
            Association::HasOne {
                target: target.to_string(),
                foreign_key: foreign_key.to_string(),
            },
        );
    }

    /// `model` holds `foreign_key` pointing at one `target`.
    pub fn define_belongs_to(
        &self,
        model: &str,
        association: &str,
        target: &str,
        foreign_key: &str,
    ) {
        self.define_association(
            model,
            association,
            Association::BelongsTo {
                target: target.to_string(),
                foreign_key: foreign_key.to_string(),
            },
        );
    }

    pub fn define_has_many(&self, model: &str, association: &str, target: &str) {
        self.define_association(
            model,
            association,
            Association::HasMany {
                target: target.to_string(),
            },
        );
    }

    fn define_association(&self, model: &str, name: &str, association: Association) {
        self.models
            .write()
            .entry(model.to_string())
            .or_default()
            .associations
            .insert(name.to_string(), association);
    }

    /// Install the callback that registered hooks fire into.
    pub fn set_hook_handler(&self, handler: HookHandler) {
        *self.handler.write() = Some(handler);
    }

    pub fn registered_hooks(&self) -> Vec<PropagationRule> {
        self.hooks.read().clone()
    }

    /// Insert or replace a row, assigning a stash id if it has none, then
    /// fire after-save hooks.
    pub fn save(&self, model: &str, mut record: Record) -> Result<String> {
        let id = record.ensure_id().to_string();
        {
            let mut models = self.models.write();
            let entry = models
                .get_mut(model)
                .ok_or_else(|| CipherdexError::storage(format!("Unknown model '{model}'")))?;
            match entry.rows.iter_mut().find(|row| row.id() == Some(id.as_str())) {
                Some(row) => *row = record.clone(),
                None => entry.rows.push(record.clone()),
            }
        }
        self.fire(model, Trigger::AfterSave, &record)?;
        Ok(id)
    }

    /// Remove a row, then fire after-destroy hooks with the removed row.
    pub fn destroy(&self, model: &str, id: &str) -> Result<Option<Record>> {
        let removed = {
            let mut models = self.models.write();
            let entry = models
                .get_mut(model)
                .ok_or_else(|| CipherdexError::storage(format!("Unknown model '{model}'")))?;
            let position = entry.rows.iter().position(|row| row.id() == Some(id));
            position.map(|pos| entry.rows.remove(pos))
        };
        if let Some(record) = &removed {
            self.fire(model, Trigger::AfterDestroy, record)?;
        }
        Ok(removed)
    }

    pub fn get(&self, model: &str, id: &str) -> Option<Record> {
        self.models
            .read()
            .get(model)?
            .rows
            .iter()
            .find(|row| row.id() == Some(id))
            .cloned()
    }

    pub fn row_count(&self, model: &str) -> usize {
        self.models.read().get(model).map_or(0, |m| m.rows.len())
    }

    fn fire(&self, model: &str, trigger: Trigger, record: &Record) -> Result<()> {
        let rules: Vec<PropagationRule> = self
            .hooks
            .read()
            .iter()
            .filter(|rule| rule.source_model == model && rule.trigger == trigger)
            .cloned()
            .collect();
        if rules.is_empty() {
            return Ok(());
        }
        let Some(handler) = self.handler.read().clone() else {
            return Ok(());
        };
        for rule in &rules {
            handler(rule, record)?;
        }
        Ok(())
    }

    fn rows(&self, model: &str) -> Result<Vec<Record>> {
        self.models
            .read()
            .get(model)
            .map(|m| m.rows.clone())
            .ok_or_else(|| CipherdexError::storage(format!("Unknown model '{model}'")))
    }

    fn association(&self, model: &str, name: &str) -> Option<Association> {
        self.models.read().get(model)?.associations.get(name).cloned()
    }
}

fn id_value(record: &Record) -> Option<Value> {
    record.id().map(Value::from)
}

impl ModelCatalog for MemoryRecordStore {
    fn field_types(&self, model: &str) -> Result<BTreeMap<String, FieldType>> {
        self.models
            .read()
            .get(model)
            .map(|m| m.fields.clone())
            .ok_or_else(|| CipherdexError::storage(format!("Unknown model '{model}'")))
    }

    fn association_kind(&self, model: &str, name: &str) -> AssociationKind {
        match self.association(model, name) {
            Some(Association::HasOne { .. } | Association::BelongsTo { .. }) => {
                AssociationKind::OneToOne
            }
            Some(Association::HasMany { .. }) => AssociationKind::Other,
            None => AssociationKind::Unknown,
        }
    }

    fn associated_model(&self, model: &str, name: &str) -> Option<String> {
        self.association(model, name)
            .map(|association| association.target().to_string())
    }
}

impl RecordStore for MemoryRecordStore {
    fn fetch_by_ids(&self, model: &str, ids: &[String]) -> Result<Vec<Record>> {
        Ok(self
            .rows(model)?
            .into_iter()
            .filter(|row| row.id().is_some_and(|id| ids.iter().any(|wanted| wanted == id)))
            .collect())
    }

    fn fetch_page(
        &self,
        model: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Record>> {
        Ok(self
            .rows(model)?
            .into_iter()
            .skip(offset.unwrap_or(0))
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Supports `field = value` string equality only.
    fn fetch_where(&self, model: &str, predicate: &str) -> Result<Vec<Record>> {
        let (field, value) = predicate.split_once('=').ok_or_else(|| {
            CipherdexError::invalid_argument(format!("Unsupported predicate '{predicate}'"))
        })?;
        let (field, value) = (field.trim(), value.trim().trim_matches('\''));
        Ok(self
            .rows(model)?
            .into_iter()
            .filter(|row| row.get(field).and_then(Value::as_str) == Some(value))
            .collect())
    }

    fn delete_all(&self, model: &str) -> Result<usize> {
        let mut models = self.models.write();
        let entry = models
            .get_mut(model)
            .ok_or_else(|| CipherdexError::storage(format!("Unknown model '{model}'")))?;
        let removed = entry.rows.len();
        entry.rows.clear();
        Ok(removed)
    }

    fn associated(&self, model: &str, record: &Record, association: &str) -> Result<Option<Record>> {
        let Some(definition) = self.association(model, association) else {
            return Err(CipherdexError::storage(format!(
                "Unknown association '{association}' on model {model}"
            )));
        };
        match definition {
            Association::HasOne {
                target,
                foreign_key,
            } => {
                let Some(owner_id) = id_value(record) else {
                    return Ok(None);
                };
                Ok(self
                    .rows(&target)?
                    .into_iter()
                    .find(|row| row.get(&foreign_key) == Some(&owner_id)))
            }
            Association::BelongsTo {
                target,
                foreign_key,
            } => {
                let Some(target_id) = record.get(&foreign_key).and_then(Value::as_str) else {
                    return Ok(None);
                };
                Ok(self
                    .rows(&target)?
                    .into_iter()
                    .find(|row| row.id() == Some(target_id)))
            }
            Association::HasMany { .. } => Ok(None),
        }
    }

    fn owners_of(
        &self,
        owner_model: &str,
        association: &str,
        associated: &Record,
    ) -> Result<Vec<Record>> {
        let Some(definition) = self.association(owner_model, association) else {
            return Ok(Vec::new());
        };
        let owners = self.rows(owner_model)?;
        match definition {
            Association::HasOne { foreign_key, .. } => {
                let Some(owner_id) = associated.get(&foreign_key).and_then(Value::as_str) else {
                    return Ok(Vec::new());
                };
                Ok(owners
                    .into_iter()
                    .filter(|row| row.id() == Some(owner_id))
                    .collect())
            }
            Association::BelongsTo { foreign_key, .. } => {
                let Some(target_id) = id_value(associated) else {
                    return Ok(Vec::new());
                };
                Ok(owners
                    .into_iter()
                    .filter(|row| row.get(&foreign_key) == Some(&target_id))
                    .collect())
            }
            Association::HasMany { .. } => Ok(Vec::new()),
        }
    }

    fn register_hook(&self, rule: PropagationRule) {
        let mut hooks = self.hooks.write();
        if !hooks.contains(&rule) {
            hooks.push(rule);
        }
    }
}

struct Collection {
    schema: SchemaDocument,
    /// Documents in upsert order.
    documents: Vec<(String, BTreeMap<String, Value>)>,
}

impl Collection {
    fn mapping(&self, index: &str) -> Result<&IndexMapping> {
        self.schema.index(index).ok_or_else(|| {
            CipherdexError::backend(format!("Unknown index '{index}'"))
        })
    }

    fn matches(&self, document: &BTreeMap<String, Value>, constraint: &BoundConstraint) -> Result<bool> {
        let mapping = self.mapping(constraint.index.name())?;
        let values = &constraint.values;

        if constraint.operator == Operator::Match {
            let haystack: String = mapping
                .fields()
                .iter()
                .filter_map(|field| document.get(*field).and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            let needle = values.first().and_then(Value::as_str).unwrap_or_default();
            return Ok(needle
                .split_whitespace()
                .all(|term| haystack.contains(&term.to_lowercase())));
        }

        let Some(actual) = mapping.fields().first().and_then(|field| document.get(*field)) else {
            return Ok(false);
        };
        let cmp = |expected: &Value| actual.compare(expected);
        Ok(match (constraint.operator, values.as_slice()) {
            (Operator::Eq, [v]) => cmp(v) == Some(Ordering::Equal),
            (Operator::Lt, [v]) => cmp(v) == Some(Ordering::Less),
            (Operator::Lte, [v]) => matches!(cmp(v), Some(Ordering::Less | Ordering::Equal)),
            (Operator::Gt, [v]) => cmp(v) == Some(Ordering::Greater),
            (Operator::Gte, [v]) => matches!(cmp(v), Some(Ordering::Greater | Ordering::Equal)),
            (Operator::Between, [low, high]) => {
                matches!(cmp(low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(cmp(high), Some(Ordering::Less | Ordering::Equal))
            }
            (op, _) => {
                return Err(CipherdexError::backend(format!(
                    "Malformed '{op}' constraint on index '{}'",
                    constraint.index.name()
                )));
            }
        })
    }
}

/// Search backend holding collections in process memory.
#[derive(Default)]
pub struct MemorySearchBackend {
    collections: RwLock<AHashMap<String, Collection>>,
}

impl MemorySearchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.read().contains_key(name)
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<BTreeMap<String, Value>> {
        self.collections
            .read()
            .get(collection)?
            .documents
            .iter()
            .find(|(doc_id, _)| doc_id == id)
            .map(|(_, document)| document.clone())
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |c| c.documents.len())
    }
}

impl SearchBackend for MemorySearchBackend {
    fn create_collection(&self, name: &str, schema: &SchemaDocument) -> Result<()> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(CipherdexError::collection_exists(name));
        }
        collections.insert(
            name.to_string(),
            Collection {
                schema: schema.clone(),
                documents: Vec::new(),
            },
        );
        Ok(())
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        self.collections
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CipherdexError::no_collection(name))
    }

    fn collection_metadata(&self, name: &str) -> Result<CollectionMetadata> {
        self.collections
            .read()
            .get(name)
            .map(|collection| CollectionMetadata::from_schema(name, &collection.schema))
            .ok_or_else(|| CipherdexError::no_collection(name))
    }

    fn execute_query(&self, collection: &str, plan: &QueryPlan) -> Result<Vec<String>> {
        let collections = self.collections.read();
        let target = collections
            .get(collection)
            .ok_or_else(|| CipherdexError::no_collection(collection))?;

        let mut hits = Vec::new();
        for (id, document) in &target.documents {
            let mut keep = true;
            for constraint in &plan.constraints {
                if !target.matches(document, constraint)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                hits.push((id, document));
            }
        }

        let mut keys = Vec::with_capacity(plan.ordering.len());
        for order in &plan.ordering {
            let mapping = target.mapping(order.index.name())?;
            let field = mapping.fields().first().map(|f| f.to_string()).unwrap_or_default();
            keys.push((field, order.direction));
        }
        hits.sort_by(|(_, a), (_, b)| {
            for (field, direction) in &keys {
                // Missing values sort last in either direction.
                let ordering = match (a.get(field), b.get(field)) {
                    (Some(x), Some(y)) => {
                        let ordering = x.compare(y).unwrap_or(Ordering::Equal);
                        match direction {
                            Direction::Asc => ordering,
                            Direction::Desc => ordering.reverse(),
                        }
                    }
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        Ok(hits
            .into_iter()
            .skip(plan.offset.unwrap_or(0))
            .take(plan.limit.unwrap_or(usize::MAX))
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn upsert(&self, collection: &str, id: &str, fields: &BTreeMap<String, Value>) -> Result<()> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| CipherdexError::no_collection(collection))?;

        for (name, mapping) in &target.schema.indexes {
            if !mapping.unique() {
                continue;
            }
            let Some(field) = mapping.fields().first().map(|f| f.to_string()) else {
                continue;
            };
            let Some(value) = fields.get(&field) else {
                continue;
            };
            let taken = target.documents.iter().any(|(other, document)| {
                other != id
                    && document
                        .get(&field)
                        .is_some_and(|existing| existing.compare(value) == Some(Ordering::Equal))
            });
            if taken {
                return Err(CipherdexError::backend(format!(
                    "Unique index '{name}' already holds the value {value}"
                )));
            }
        }

        match target.documents.iter_mut().find(|(doc_id, _)| doc_id == id) {
            Some((_, document)) => *document = fields.clone(),
            None => target.documents.push((id.to_string(), fields.clone())),
        }
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| CipherdexError::no_collection(collection))?;
        target.documents.retain(|(doc_id, _)| doc_id != id);
        Ok(())
    }
}
