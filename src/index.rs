//! Index model shared by configuration, schema rendering and query binding.
//!
//! An [`IndexSpec`] describes one index a model carries in its search
//! collection: which field (or fields) it covers, which [`IndexKind`] it is,
//! and therefore which [`Operator`]s it can answer.

pub mod rules;
pub mod set;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CipherdexError, Result};

pub use self::rules::applicable_kinds;
pub use self::set::IndexSet;

/// Reserved name of the free-text index spanning several fields.
pub const MATCH_ALL_INDEX_NAME: &str = "__match_multi";

/// The kind of an index. Determines the operators it supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexKind {
    Exact,
    Range,
    Match,
    DynamicMatch,
}

const EXACT_OPS: &[Operator] = &[Operator::Eq];
const RANGE_OPS: &[Operator] = &[
    Operator::Lt,
    Operator::Lte,
    Operator::Gt,
    Operator::Gte,
    Operator::Eq,
    Operator::Between,
];
const MATCH_OPS: &[Operator] = &[Operator::Match];

impl IndexKind {
    pub const ALL: [IndexKind; 4] = [
        IndexKind::Exact,
        IndexKind::Range,
        IndexKind::Match,
        IndexKind::DynamicMatch,
    ];

    /// Operators this kind of index can answer.
    pub fn operators(&self) -> &'static [Operator] {
        match self {
            IndexKind::Exact => EXACT_OPS,
            IndexKind::Range => RANGE_OPS,
            IndexKind::Match | IndexKind::DynamicMatch => MATCH_OPS,
        }
    }

    pub fn supports(&self, op: Operator) -> bool {
        self.operators().contains(&op)
    }

    /// Only exact and range indexes can enforce uniqueness.
    pub fn supports_unique(&self) -> bool {
        matches!(self, IndexKind::Exact | IndexKind::Range)
    }

    pub fn is_match(&self) -> bool {
        matches!(self, IndexKind::Match | IndexKind::DynamicMatch)
    }

    /// The name used for this kind in the backend schema.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Exact => "exact",
            IndexKind::Range => "range",
            IndexKind::Match => "match",
            IndexKind::DynamicMatch => "dynamic-match",
        }
    }

    fn name_suffix(&self) -> &'static str {
        match self {
            IndexKind::Exact => "",
            IndexKind::Range => "_range",
            IndexKind::Match => "_match",
            IndexKind::DynamicMatch => "_dynamic_match",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    Between,
    Match,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Between => "between",
            Operator::Match => "match",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Between => "between",
            Operator::Match => "=~",
        }
    }

    /// Number of operand values the operator takes.
    pub fn arity(&self) -> usize {
        match self {
            Operator::Between => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field name, or a field reached through one one-to-one association.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct FieldPath {
    association: Option<String>,
    field: String,
}

impl FieldPath {
    pub fn local(field: impl Into<String>) -> Self {
        Self {
            association: None,
            field: field.into(),
        }
    }

    pub fn associated(association: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            association: Some(association.into()),
            field: field.into(),
        }
    }

    /// Parse `field` or `association.field`.
    pub fn parse(path: &str) -> Result<Self> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(CipherdexError::invalid_argument(format!(
                "Malformed field path '{path}'"
            )));
        }
        match parts.as_slice() {
            [field] => Ok(Self::local(*field)),
            [association, field] => Ok(Self::associated(*association, *field)),
            _ => Err(CipherdexError::invalid_argument(format!(
                "Field path '{path}' nests more than one association"
            ))),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn association(&self) -> Option<&str> {
        self.association.as_deref()
    }

    pub fn is_denormalized(&self) -> bool {
        self.association.is_some()
    }

    /// Key under which the value is stored in the backend document:
    /// the field name for local fields, `__<association>_<field>` otherwise.
    pub fn wire_name(&self) -> String {
        match &self.association {
            Some(association) => format!("__{association}_{}", self.field),
            None => self.field.clone(),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.association {
            Some(association) => write!(f, "{association}.{}", self.field),
            None => f.write_str(&self.field),
        }
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for FieldPath {
    type Error = CipherdexError;

    fn try_from(value: String) -> Result<Self> {
        FieldPath::parse(&value)
    }
}

/// Tokenizer tuning for match indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchOptions {
    /// N-gram length used by the token filter.
    pub token_length: u32,

    /// Size of the bloom filter backing the index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_size: Option<u32>,

    /// Bits set per term in the bloom filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_term_bits: Option<u32>,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            token_length: 3,
            filter_size: None,
            filter_term_bits: None,
        }
    }
}

impl MatchOptions {
    pub fn filter_size(mut self, size: u32) -> Self {
        self.filter_size = Some(size);
        self
    }

    pub fn filter_term_bits(mut self, bits: u32) -> Self {
        self.filter_term_bits = Some(bits);
        self
    }
}

/// Description of one index. Immutable once compilation finishes.
///
/// Every index covers at least one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawIndexSpec")]
pub struct IndexSpec {
    name: String,
    fields: Vec<FieldPath>,
    kind: IndexKind,
    #[serde(default)]
    unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tuning: Option<MatchOptions>,
}

#[derive(Deserialize)]
struct RawIndexSpec {
    name: String,
    fields: Vec<FieldPath>,
    kind: IndexKind,
    #[serde(default)]
    unique: bool,
    #[serde(default)]
    tuning: Option<MatchOptions>,
}

impl TryFrom<RawIndexSpec> for IndexSpec {
    type Error = CipherdexError;

    fn try_from(raw: RawIndexSpec) -> Result<Self> {
        if raw.fields.is_empty() {
            return Err(CipherdexError::config(format!(
                "Index '{}' covers no fields",
                raw.name
            )));
        }
        Ok(Self {
            name: raw.name,
            fields: raw.fields,
            kind: raw.kind,
            unique: raw.unique,
            tuning: raw.tuning,
        })
    }
}

impl IndexSpec {
    /// Build the conventionally named index of `kind` over `path`.
    pub fn for_kind(path: FieldPath, kind: IndexKind, tuning: MatchOptions) -> Self {
        Self {
            name: format!("{path}{}", kind.name_suffix()),
            fields: vec![path],
            kind,
            unique: false,
            tuning: kind.is_match().then_some(tuning),
        }
    }

    pub fn exact(path: FieldPath) -> Self {
        Self::for_kind(path, IndexKind::Exact, MatchOptions::default())
    }

    pub fn range(path: FieldPath) -> Self {
        Self::for_kind(path, IndexKind::Range, MatchOptions::default())
    }

    pub fn matching(path: FieldPath, tuning: MatchOptions) -> Self {
        Self::for_kind(path, IndexKind::Match, tuning)
    }

    /// The reserved free-text index over several fields. `fields` must not
    /// be empty.
    pub fn match_multi(fields: Vec<FieldPath>, tuning: MatchOptions) -> Result<Self> {
        if fields.is_empty() {
            return Err(CipherdexError::config(
                "The match-all index must cover at least one field",
            ));
        }
        Ok(Self {
            name: MATCH_ALL_INDEX_NAME.to_string(),
            fields,
            kind: IndexKind::Match,
            unique: false,
            tuning: Some(tuning),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The (first) field the index covers.
    pub fn field(&self) -> &FieldPath {
        &self.fields[0]
    }

    pub fn fields(&self) -> &[FieldPath] {
        &self.fields
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn unique(&self) -> bool {
        self.unique
    }

    pub fn tuning(&self) -> Option<&MatchOptions> {
        self.tuning.as_ref()
    }

    pub fn supports(&self, op: Operator) -> bool {
        self.kind.supports(op)
    }

    pub fn is_match_all(&self) -> bool {
        self.name == MATCH_ALL_INDEX_NAME
    }

    pub(crate) fn mark_unique(&mut self) {
        self.unique = true;
    }

    pub(crate) fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self.fields.iter().map(|p| p.to_string()).collect();
        write!(f, "{} {}({})", self.name, self.kind, fields.join(", "))?;
        if self.unique {
            f.write_str(" UNIQUE")?;
        }
        Ok(())
    }
}
