//! Drift detection between declared indexes and a deployed collection.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::engine::schema::SchemaDocument;
use crate::error::{CipherdexError, Result};
use crate::index::{IndexKind, IndexSet};

/// An index as reported by the search backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteIndex {
    pub name: String,
    pub kind: IndexKind,
}

/// What the search backend knows about a deployed collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub name: String,
    pub indexes: Vec<RemoteIndex>,
}

impl CollectionMetadata {
    /// Metadata describing a collection created from `schema`.
    pub fn from_schema(name: impl Into<String>, schema: &SchemaDocument) -> Self {
        Self {
            name: name.into(),
            indexes: schema
                .indexes
                .iter()
                .map(|(name, mapping)| RemoteIndex {
                    name: name.clone(),
                    kind: mapping.kind(),
                })
                .collect(),
        }
    }

    pub fn index_count(&self) -> usize {
        self.indexes.len()
    }
}

/// Compare the declared index set against a deployed collection.
///
/// Only presence is checked: the counts must agree and every declared
/// name/kind pair must be deployed. Tuning is not compared.
pub fn check(local: &IndexSet, remote: &CollectionMetadata) -> Result<()> {
    let deployed: BTreeSet<(&str, IndexKind)> = remote
        .indexes
        .iter()
        .map(|index| (index.name.as_str(), index.kind))
        .collect();

    if remote.index_count() != local.len() {
        log::warn!(
            "collection '{}' has {} indexes but {} are declared",
            remote.name,
            remote.index_count(),
            local.len()
        );
        return Err(CipherdexError::diverged(&remote.name));
    }

    if let Some(missing) = local
        .iter()
        .find(|spec| !deployed.contains(&(spec.name(), spec.kind())))
    {
        log::warn!(
            "collection '{}' is missing declared index '{}' ({})",
            remote.name,
            missing.name(),
            missing.kind()
        );
        return Err(CipherdexError::diverged(&remote.name));
    }

    Ok(())
}
