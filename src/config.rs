//! Declarative per-model index configuration.
//!
//! An [`IndexConfig`] records what a model asks to have indexed. It is plain
//! data (and round-trips through serde) until [`compiler::ConfigCompiler`]
//! resolves it against the model's field types.
//!
//! ```
//! use cipherdex::config::{FieldDeclaration, IndexConfig};
//! use cipherdex::index::IndexKind;
//!
//! let config = IndexConfig::builder("users")
//!     .auto(["first_name", "dob", "created_at"])
//!     .exact(["gender", "email"])
//!     .declare(FieldDeclaration::auto(["title"]).except([IndexKind::Match]))
//!     .match_all(["first_name", "last_name", "email"])
//!     .index_assoc("patient", |patient| patient.range(["height", "weight"]))
//!     .unique("email")
//!     .build();
//!
//! assert_eq!(config.model, "users");
//! ```

pub mod compiler;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::index::{IndexKind, MatchOptions};

pub use self::compiler::{ConfigCompiler, FinalizedIndexConfig, PropagationRule};

/// Which index kinds a declaration asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    /// Every kind the field type supports.
    Auto,
    Exact,
    Range,
    Match,
    DynamicMatch,
}

impl IndexMode {
    /// The single kind requested, or `None` for `Auto`.
    pub fn kind(&self) -> Option<IndexKind> {
        match self {
            IndexMode::Auto => None,
            IndexMode::Exact => Some(IndexKind::Exact),
            IndexMode::Range => Some(IndexKind::Range),
            IndexMode::Match => Some(IndexKind::Match),
            IndexMode::DynamicMatch => Some(IndexKind::DynamicMatch),
        }
    }
}

/// One declaration over one or more fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDeclaration {
    pub fields: Vec<String>,
    pub mode: IndexMode,
    #[serde(default)]
    pub unique: bool,
    /// Keep only these kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<BTreeSet<IndexKind>>,
    /// Drop these kinds.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub except: BTreeSet<IndexKind>,
    /// Match tuning. Falls back to the engine's match defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<MatchOptions>,
}

impl FieldDeclaration {
    pub fn new<I, S>(mode: IndexMode, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            mode,
            unique: false,
            only: None,
            except: BTreeSet::new(),
            tuning: None,
        }
    }

    pub fn auto<I: IntoIterator<Item = S>, S: Into<String>>(fields: I) -> Self {
        Self::new(IndexMode::Auto, fields)
    }

    pub fn exact<I: IntoIterator<Item = S>, S: Into<String>>(fields: I) -> Self {
        Self::new(IndexMode::Exact, fields)
    }

    pub fn range<I: IntoIterator<Item = S>, S: Into<String>>(fields: I) -> Self {
        Self::new(IndexMode::Range, fields)
    }

    pub fn matching<I: IntoIterator<Item = S>, S: Into<String>>(fields: I) -> Self {
        Self::new(IndexMode::Match, fields)
    }

    pub fn dynamic_match<I: IntoIterator<Item = S>, S: Into<String>>(fields: I) -> Self {
        Self::new(IndexMode::DynamicMatch, fields)
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn only(mut self, kinds: impl IntoIterator<Item = IndexKind>) -> Self {
        self.only = Some(kinds.into_iter().collect());
        self
    }

    pub fn except(mut self, kinds: impl IntoIterator<Item = IndexKind>) -> Self {
        self.except.extend(kinds);
        self
    }

    pub fn tuning(mut self, tuning: MatchOptions) -> Self {
        self.tuning = Some(tuning);
        self
    }

    /// Apply `only`/`except` to a candidate kind list.
    pub(crate) fn filter(&self, candidates: &[IndexKind]) -> Vec<IndexKind> {
        candidates
            .iter()
            .copied()
            .filter(|kind| self.only.as_ref().is_none_or(|only| only.contains(kind)))
            .filter(|kind| !self.except.contains(kind))
            .collect()
    }
}

/// Fields pulled in from a one-to-one association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationDeclaration {
    pub association: String,
    pub declarations: Vec<FieldDeclaration>,
    /// Associations reached through this one. Always rejected by the
    /// compiler: only one hop is supported.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<AssociationDeclaration>,
}

impl AssociationDeclaration {
    pub fn new(association: impl Into<String>) -> Self {
        Self {
            association: association.into(),
            declarations: Vec::new(),
            nested: Vec::new(),
        }
    }

    pub fn declare(mut self, declaration: FieldDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    pub fn auto<I: IntoIterator<Item = S>, S: Into<String>>(self, fields: I) -> Self {
        self.declare(FieldDeclaration::auto(fields))
    }

    pub fn exact<I: IntoIterator<Item = S>, S: Into<String>>(self, fields: I) -> Self {
        self.declare(FieldDeclaration::exact(fields))
    }

    pub fn range<I: IntoIterator<Item = S>, S: Into<String>>(self, fields: I) -> Self {
        self.declare(FieldDeclaration::range(fields))
    }

    pub fn matching<I: IntoIterator<Item = S>, S: Into<String>>(self, fields: I) -> Self {
        self.declare(FieldDeclaration::matching(fields))
    }

    pub fn index_assoc(
        mut self,
        association: impl Into<String>,
        build: impl FnOnce(AssociationDeclaration) -> AssociationDeclaration,
    ) -> Self {
        self.nested
            .push(build(AssociationDeclaration::new(association)));
        self
    }
}

/// The free-text index over several string fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchAllDeclaration {
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<MatchOptions>,
}

/// Index configuration for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Model name, as known to the record store.
    pub model: String,
    /// Name of the search collection. Defaults to the model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
    #[serde(default)]
    pub declarations: Vec<FieldDeclaration>,
    #[serde(default)]
    pub associations: Vec<AssociationDeclaration>,
    /// Every `match_all` declaration made. More than one is an error.
    #[serde(default)]
    pub match_all: Vec<MatchAllDeclaration>,
    /// Fields that must be unique.
    #[serde(default)]
    pub unique: Vec<String>,
}

impl IndexConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            collection_name: None,
            declarations: Vec::new(),
            associations: Vec::new(),
            match_all: Vec::new(),
            unique: Vec::new(),
        }
    }

    pub fn builder(model: impl Into<String>) -> IndexConfigBuilder {
        IndexConfigBuilder {
            config: Self::new(model),
        }
    }

    pub fn collection_name(&self) -> &str {
        self.collection_name.as_deref().unwrap_or(&self.model)
    }
}

pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl IndexConfigBuilder {
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.config.collection_name = Some(name.into());
        self
    }

    pub fn declare(mut self, declaration: FieldDeclaration) -> Self {
        self.config.declarations.push(declaration);
        self
    }

    pub fn auto<I: IntoIterator<Item = S>, S: Into<String>>(self, fields: I) -> Self {
        self.declare(FieldDeclaration::auto(fields))
    }

    pub fn exact<I: IntoIterator<Item = S>, S: Into<String>>(self, fields: I) -> Self {
        self.declare(FieldDeclaration::exact(fields))
    }

    pub fn range<I: IntoIterator<Item = S>, S: Into<String>>(self, fields: I) -> Self {
        self.declare(FieldDeclaration::range(fields))
    }

    pub fn matching<I: IntoIterator<Item = S>, S: Into<String>>(self, fields: I) -> Self {
        self.declare(FieldDeclaration::matching(fields))
    }

    pub fn dynamic_match<I: IntoIterator<Item = S>, S: Into<String>>(self, fields: I) -> Self {
        self.declare(FieldDeclaration::dynamic_match(fields))
    }

    /// Denormalize fields from a one-to-one association.
    pub fn index_assoc(
        mut self,
        association: impl Into<String>,
        build: impl FnOnce(AssociationDeclaration) -> AssociationDeclaration,
    ) -> Self {
        self.config
            .associations
            .push(build(AssociationDeclaration::new(association)));
        self
    }

    pub fn match_all<I: IntoIterator<Item = S>, S: Into<String>>(self, fields: I) -> Self {
        self.match_all_with(fields, None)
    }

    pub fn match_all_with<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        fields: I,
        tuning: Option<MatchOptions>,
    ) -> Self {
        self.config.match_all.push(MatchAllDeclaration {
            fields: fields.into_iter().map(Into::into).collect(),
            tuning,
        });
        self
    }

    pub fn unique(mut self, field: impl Into<String>) -> Self {
        self.config.unique.push(field.into());
        self
    }

    pub fn build(self) -> IndexConfig {
        self.config
    }
}
