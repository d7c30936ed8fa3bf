use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::{CipherdexError, Result};
use crate::index::{IndexKind, IndexSpec, Operator};

/// The validated, immutable collection of indexes for one model.
///
/// Per-field indexes are grouped by field path. The match-all index, if any,
/// is held apart from them since it spans several fields.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSet {
    indexes: Vec<IndexSpec>,
    #[serde(skip)]
    by_field: BTreeMap<String, Vec<usize>>,
    match_all: Option<IndexSpec>,
}

impl IndexSet {
    /// Assemble an index set, rejecting two indexes of the same kind on the
    /// same field and two indexes sharing a name.
    pub fn new(model: &str, indexes: Vec<IndexSpec>, match_all: Option<IndexSpec>) -> Result<Self> {
        let mut by_field: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut names: BTreeSet<String> = BTreeSet::new();

        for (pos, index) in indexes.iter().enumerate() {
            let field = index.field().to_string();
            let slot = by_field.entry(field.clone()).or_default();
            if slot.iter().any(|&i| indexes[i].kind() == index.kind()) {
                return Err(CipherdexError::config(format!(
                    "Multiple indexes of the same type on the same attribute: {model}#{field}, index type: {}",
                    index.kind()
                )));
            }
            slot.push(pos);

            if !names.insert(index.name().to_string()) {
                return Err(CipherdexError::config(format!(
                    "Duplicate index name '{}' on model {model}",
                    index.name()
                )));
            }
        }

        if let Some(multi) = &match_all
            && names.contains(multi.name())
        {
            return Err(CipherdexError::config(format!(
                "Duplicate index name '{}' on model {model}; the name is reserved for the match-all index",
                multi.name()
            )));
        }

        for slot in by_field.values_mut() {
            slot.sort_by_key(|&i| indexes[i].kind());
        }

        Ok(Self {
            indexes,
            by_field,
            match_all,
        })
    }

    /// Indexes on `field`, exact first, then range, then match kinds.
    pub fn on(&self, field: &str) -> Vec<&IndexSpec> {
        self.by_field
            .get(field)
            .map(|slot| slot.iter().map(|&i| &self.indexes[i]).collect())
            .unwrap_or_default()
    }

    pub fn count_on(&self, field: &str) -> usize {
        self.by_field.get(field).map_or(0, Vec::len)
    }

    pub fn get(&self, field: &str, kind: IndexKind) -> Option<&IndexSpec> {
        self.on(field).into_iter().find(|index| index.kind() == kind)
    }

    pub fn has(&self, field: &str, kind: IndexKind) -> bool {
        self.get(field, kind).is_some()
    }

    /// First index on `field` able to answer `op`.
    pub fn select(&self, field: &str, op: Operator) -> Option<&IndexSpec> {
        self.on(field).into_iter().find(|index| index.supports(op))
    }

    /// The range index on `field`, used for ordering.
    pub fn range_index(&self, field: &str) -> Option<&IndexSpec> {
        self.get(field, IndexKind::Range)
    }

    pub fn match_all(&self) -> Option<&IndexSpec> {
        self.match_all.as_ref()
    }

    pub fn by_name(&self, name: &str) -> Option<&IndexSpec> {
        self.iter().find(|index| index.name() == name)
    }

    /// All indexes, the match-all index last.
    pub fn iter(&self) -> impl Iterator<Item = &IndexSpec> {
        self.indexes.iter().chain(self.match_all.iter())
    }

    /// Field paths that carry at least one index, in sorted order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.by_field.keys().map(String::as_str)
    }

    /// Total number of indexes, including the match-all index.
    pub fn len(&self) -> usize {
        self.indexes.len() + usize::from(self.match_all.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
