//! Boundaries to the two external collaborators.
//!
//! - [`RecordStore`] is the system of record: it reports model field types
//!   and associations, and returns full rows by stash id.
//! - [`SearchBackend`] is the encrypted-index service: it holds collections,
//!   accepts documents and executes compiled query plans.
//!
//! [`memory`] provides in-process implementations of both.

pub mod memory;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::compiler::PropagationRule;
use crate::data::{FieldType, Record, Value};
use crate::engine::consistency::CollectionMetadata;
use crate::engine::schema::SchemaDocument;
use crate::error::Result;
use crate::query::plan::QueryPlan;

/// Cardinality of a named association as reported by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssociationKind {
    /// has-one or belongs-to.
    OneToOne,
    Other,
    Unknown,
}

/// Record lifecycle events that can trigger re-indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    AfterSave,
    AfterDestroy,
}

/// Callback a record store runs for each registered rule a lifecycle event
/// matches. [`crate::Engine::propagation_handler`] builds one.
pub type HookHandler = Arc<dyn Fn(&PropagationRule, &Record) -> Result<usize> + Send + Sync>;

/// Model reflection: field types and associations.
pub trait ModelCatalog: Send + Sync {
    /// Field types of `model`, excluding identity and bookkeeping fields.
    fn field_types(&self, model: &str) -> Result<BTreeMap<String, FieldType>>;

    fn association_kind(&self, model: &str, name: &str) -> AssociationKind;

    fn associated_model(&self, model: &str, name: &str) -> Option<String>;
}

/// The system of record.
pub trait RecordStore: ModelCatalog {
    /// Rows with the given stash ids, in whatever order storage prefers.
    fn fetch_by_ids(&self, model: &str, ids: &[String]) -> Result<Vec<Record>>;

    /// Rows with the given stash ids, in the order of `ids`.
    fn fetch_ordered(&self, model: &str, ids: &[String]) -> Result<Vec<Record>> {
        Ok(resequence(self.fetch_by_ids(model, ids)?, ids))
    }

    /// Rows in storage order, without consulting the search backend.
    fn fetch_page(
        &self,
        model: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Record>>;

    /// Rows matching a store-native predicate.
    fn fetch_where(&self, model: &str, predicate: &str) -> Result<Vec<Record>>;

    /// Delete every row of `model`, returning how many were removed.
    fn delete_all(&self, model: &str) -> Result<usize>;

    /// Reload the record reached from `record` through `association`.
    fn associated(&self, model: &str, record: &Record, association: &str)
    -> Result<Option<Record>>;

    /// Records of `owner_model` whose `association` points at `associated`.
    fn owners_of(
        &self,
        owner_model: &str,
        association: &str,
        associated: &Record,
    ) -> Result<Vec<Record>>;

    /// Install a lifecycle hook on the rule's source model. The hook is
    /// expected to call [`crate::Engine::propagate`].
    fn register_hook(&self, rule: PropagationRule);
}

/// The encrypted-index service.
pub trait SearchBackend: Send + Sync {
    fn create_collection(&self, name: &str, schema: &SchemaDocument) -> Result<()>;

    fn drop_collection(&self, name: &str) -> Result<()>;

    fn collection_metadata(&self, name: &str) -> Result<CollectionMetadata>;

    /// Execute a plan, returning stash ids in backend order.
    fn execute_query(&self, collection: &str, plan: &QueryPlan) -> Result<Vec<String>>;

    fn upsert(&self, collection: &str, id: &str, fields: &BTreeMap<String, Value>) -> Result<()>;

    fn delete(&self, collection: &str, id: &str) -> Result<()>;
}

/// Reorder `records` to follow `ids`.
///
/// Records whose id is not in `ids` sort after all ranked records; ties keep
/// the storage order.
pub fn resequence(mut records: Vec<Record>, ids: &[String]) -> Vec<Record> {
    let rank: HashMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(pos, id)| (id.as_str(), pos))
        .collect();
    records.sort_by_key(|record| {
        record
            .id()
            .and_then(|id| rank.get(id).copied())
            .unwrap_or(usize::MAX)
    });
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resequence_follows_ids() {
        let records = vec![
            Record::new_with_id("a"),
            Record::new_with_id("b"),
            Record::new_with_id("c"),
            Record::new(),
        ];
        let ids = vec!["c".to_string(), "a".to_string(), "b".to_string()];

        let ordered: Vec<Option<String>> = resequence(records, &ids)
            .into_iter()
            .map(|record| record.id)
            .collect();
        assert_eq!(
            ordered,
            vec![
                Some("c".to_string()),
                Some("a".to_string()),
                Some("b".to_string()),
                None
            ]
        );
    }
}
