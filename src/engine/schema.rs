//! Rendering of an [`IndexSet`] into the search backend's schema document.
//!
//! The document has two parts: a `type` map projecting every field in scope
//! onto a backend type, and an `indexes` map keyed by index name. Both are
//! ordered maps, so the same index set always renders to the same bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::FinalizedIndexConfig;
use crate::data::FieldType;
use crate::error::Result;
use crate::index::{FieldPath, IndexKind, IndexSet, IndexSpec, MatchOptions};

/// Backend type for a field type. Binary fields have none.
pub fn backend_type(field_type: FieldType) -> Option<&'static str> {
    match field_type {
        FieldType::String | FieldType::Text | FieldType::Uuid => Some("string"),
        FieldType::Date | FieldType::Datetime | FieldType::Timestamp => Some("date"),
        FieldType::Float | FieldType::Decimal => Some("float64"),
        FieldType::Integer => Some("uint64"),
        FieldType::Boolean => Some("boolean"),
        FieldType::Binary => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Tokenizer {
    Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TokenFilter {
    Downcase,
    Ngram {
        #[serde(rename = "tokenLength")]
        token_length: u32,
    },
}

/// Mapping of a match or dynamic-match index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMapping {
    pub fields: Vec<String>,
    pub tokenizer: Tokenizer,
    pub token_filters: Vec<TokenFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_term_bits: Option<u32>,
}

impl MatchMapping {
    fn new(fields: Vec<String>, tuning: MatchOptions) -> Self {
        Self {
            fields,
            tokenizer: Tokenizer::Standard,
            token_filters: vec![
                TokenFilter::Downcase,
                TokenFilter::Ngram {
                    token_length: tuning.token_length,
                },
            ],
            filter_size: tuning.filter_size,
            filter_term_bits: tuning.filter_term_bits,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One entry of the schema's `indexes` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum IndexMapping {
    Exact {
        field: String,
        #[serde(default, skip_serializing_if = "is_false")]
        unique: bool,
    },
    Range {
        field: String,
        #[serde(default, skip_serializing_if = "is_false")]
        unique: bool,
    },
    Match(MatchMapping),
    DynamicMatch(MatchMapping),
}

impl IndexMapping {
    pub fn from_spec(spec: &IndexSpec) -> Self {
        let tuning = spec.tuning().copied().unwrap_or_default();
        match spec.kind() {
            IndexKind::Exact => IndexMapping::Exact {
                field: spec.field().wire_name(),
                unique: spec.unique(),
            },
            IndexKind::Range => IndexMapping::Range {
                field: spec.field().wire_name(),
                unique: spec.unique(),
            },
            IndexKind::Match => IndexMapping::Match(MatchMapping::new(wire_names(spec), tuning)),
            IndexKind::DynamicMatch => {
                IndexMapping::DynamicMatch(MatchMapping::new(wire_names(spec), tuning))
            }
        }
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            IndexMapping::Exact { .. } => IndexKind::Exact,
            IndexMapping::Range { .. } => IndexKind::Range,
            IndexMapping::Match(_) => IndexKind::Match,
            IndexMapping::DynamicMatch(_) => IndexKind::DynamicMatch,
        }
    }

    /// Wire names of the document keys the index reads.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            IndexMapping::Exact { field, .. } | IndexMapping::Range { field, .. } => {
                vec![field.as_str()]
            }
            IndexMapping::Match(mapping) | IndexMapping::DynamicMatch(mapping) => {
                mapping.fields.iter().map(String::as_str).collect()
            }
        }
    }

    pub fn unique(&self) -> bool {
        match self {
            IndexMapping::Exact { unique, .. } | IndexMapping::Range { unique, .. } => *unique,
            _ => false,
        }
    }
}

fn wire_names(spec: &IndexSpec) -> Vec<String> {
    spec.fields().iter().map(FieldPath::wire_name).collect()
}

/// The schema document sent to the backend when a collection is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(rename = "type")]
    pub types: BTreeMap<String, String>,
    pub indexes: BTreeMap<String, IndexMapping>,
}

impl SchemaDocument {
    pub fn index(&self, name: &str) -> Option<&IndexMapping> {
        self.indexes.get(name)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Pure transform from an index set to a [`SchemaDocument`].
pub struct SchemaCompiler;

impl SchemaCompiler {
    pub fn compile(
        indexes: &IndexSet,
        field_types: &BTreeMap<FieldPath, FieldType>,
    ) -> SchemaDocument {
        let types = field_types
            .iter()
            .filter_map(|(path, ty)| {
                backend_type(*ty).map(|backend| (path.wire_name(), backend.to_string()))
            })
            .collect();

        let indexes = indexes
            .iter()
            .map(|spec| (spec.name().to_string(), IndexMapping::from_spec(spec)))
            .collect();

        SchemaDocument { types, indexes }
    }

    pub fn compile_config(config: &FinalizedIndexConfig) -> SchemaDocument {
        Self::compile(config.indexes(), config.field_types())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_set() -> (IndexSet, BTreeMap<FieldPath, FieldType>) {
        let name = FieldPath::local("name");
        let height = FieldPath::associated("patient", "height");
        let indexes = IndexSet::new(
            "users",
            vec![
                IndexSpec::exact(name.clone()).with_unique(true),
                IndexSpec::range(name.clone()),
                IndexSpec::matching(name.clone(), MatchOptions::default()),
                IndexSpec::range(height.clone()),
            ],
            Some(IndexSpec::match_multi(
                vec![name.clone()],
                MatchOptions::default().filter_size(512).filter_term_bits(6),
            )
            .unwrap()),
        )
        .unwrap();

        let mut types = BTreeMap::new();
        types.insert(name, FieldType::String);
        types.insert(height, FieldType::Float);
        types.insert(FieldPath::local("age"), FieldType::Integer);
        (indexes, types)
    }

    #[test]
    fn test_schema_document_shape() {
        let (indexes, types) = name_set();
        let schema = SchemaCompiler::compile(&indexes, &types);
        let json: serde_json::Value = serde_json::to_value(&schema).unwrap();

        assert_eq!(json["type"]["name"], "string");
        assert_eq!(json["type"]["__patient_height"], "float64");
        assert_eq!(json["type"]["age"], "uint64");
        assert_eq!(
            json["indexes"]["name"],
            serde_json::json!({"kind": "exact", "field": "name", "unique": true})
        );
        assert_eq!(
            json["indexes"]["name_range"],
            serde_json::json!({"kind": "range", "field": "name"})
        );
        assert_eq!(
            json["indexes"]["patient.height_range"],
            serde_json::json!({"kind": "range", "field": "__patient_height"})
        );
        assert_eq!(
            json["indexes"]["name_match"],
            serde_json::json!({
                "kind": "match",
                "fields": ["name"],
                "tokenizer": {"kind": "standard"},
                "tokenFilters": [{"kind": "downcase"}, {"kind": "ngram", "tokenLength": 3}]
            })
        );
        assert_eq!(json["indexes"]["__match_multi"]["filterSize"], 512);
        assert_eq!(json["indexes"]["__match_multi"]["filterTermBits"], 6);
    }

    #[test]
    fn test_schema_is_deterministic() {
        let (indexes, types) = name_set();
        let first = SchemaCompiler::compile(&indexes, &types).to_json().unwrap();
        let second = SchemaCompiler::compile(&indexes, &types).to_json().unwrap();
        assert_eq!(first, second);

        let decoded = SchemaDocument::from_json(&first).unwrap();
        assert_eq!(decoded.index("name").unwrap().kind(), IndexKind::Exact);
        assert!(decoded.index("name").unwrap().unique());
        assert_eq!(decoded.indexes.len(), 5);
    }

    #[test]
    fn test_backend_type_projection() {
        assert_eq!(backend_type(FieldType::Timestamp), Some("date"));
        assert_eq!(backend_type(FieldType::Decimal), Some("float64"));
        assert_eq!(backend_type(FieldType::Boolean), Some("boolean"));
        assert_eq!(backend_type(FieldType::Binary), None);
    }
}
