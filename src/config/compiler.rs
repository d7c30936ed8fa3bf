//! Compilation of an [`IndexConfig`] into a finalized [`IndexSet`].
//!
//! Compilation runs in a fixed order:
//!
//! 1. Local field declarations expand into one [`IndexSpec`] per surviving
//!    kind, after type checking and `only`/`except` filtering.
//! 2. Association declarations are resolved one hop deep against the
//!    associated model's field types, and yield [`PropagationRule`]s.
//! 3. The match-all declaration, if any, becomes the `__match_multi` index.
//! 4. Unique constraints are resolved against the indexes built so far.
//! 5. The [`IndexSet`] is assembled, which rejects duplicates.

use std::collections::{BTreeMap, BTreeSet};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{AssociationDeclaration, FieldDeclaration, IndexConfig, IndexMode};
use crate::data::FieldType;
use crate::error::{CipherdexError, Result};
use crate::index::rules::{applicable_kinds, permits};
use crate::index::{FieldPath, IndexKind, IndexSet, IndexSpec, MatchOptions};
use crate::store::{AssociationKind, ModelCatalog, RecordStore, Trigger};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Describes how a change to an associated record reaches its owner's index.
///
/// When a `source_model` record fires `trigger`, every `owner_model` record
/// whose `association` points at it must be re-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropagationRule {
    pub trigger: Trigger,
    pub source_model: String,
    pub owner_model: String,
    pub association: String,
}

/// The compiled, immutable form of an [`IndexConfig`].
#[derive(Debug, Clone)]
pub struct FinalizedIndexConfig {
    model: String,
    collection_name: String,
    indexes: IndexSet,
    field_types: BTreeMap<FieldPath, FieldType>,
    rules: Vec<PropagationRule>,
}

impl FinalizedIndexConfig {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn indexes(&self) -> &IndexSet {
        &self.indexes
    }

    /// Types of every field in scope: indexable local fields plus the
    /// denormalized association fields that carry indexes.
    pub fn field_types(&self) -> &BTreeMap<FieldPath, FieldType> {
        &self.field_types
    }

    pub fn propagation_rules(&self) -> &[PropagationRule] {
        &self.rules
    }

    /// Associations whose fields are denormalized into this model's documents.
    pub fn associations(&self) -> BTreeSet<&str> {
        self.field_types
            .keys()
            .filter_map(FieldPath::association)
            .collect()
    }

    /// Hand every propagation rule to the record store's hook mechanism.
    pub fn register_callbacks(&self, store: &dyn RecordStore) {
        for rule in &self.rules {
            store.register_hook(rule.clone());
        }
    }
}

/// Resolves index configurations against a model catalog.
pub struct ConfigCompiler<'a> {
    catalog: &'a dyn ModelCatalog,
    match_defaults: MatchOptions,
}

impl<'a> ConfigCompiler<'a> {
    pub fn new(catalog: &'a dyn ModelCatalog) -> Self {
        Self {
            catalog,
            match_defaults: MatchOptions::default(),
        }
    }

    /// Tuning applied to match indexes declared without their own.
    pub fn with_match_defaults(mut self, defaults: MatchOptions) -> Self {
        self.match_defaults = defaults;
        self
    }

    pub fn compile(&self, config: &IndexConfig) -> Result<FinalizedIndexConfig> {
        let model = config.model.as_str();
        let local_types = self.catalog.field_types(model)?;

        let mut field_types: BTreeMap<FieldPath, FieldType> = local_types
            .iter()
            .filter(|(_, ty)| !applicable_kinds(**ty).is_empty())
            .map(|(name, ty)| (FieldPath::local(name.as_str()), *ty))
            .collect();

        let mut indexes = Vec::new();
        let mut unique_fields: Vec<String> = Vec::new();

        for declaration in &config.declarations {
            let specs = self.expand(model, None, &local_types, declaration)?;
            indexes.extend(specs);
            if declaration.unique {
                unique_fields.extend(declaration.fields.iter().cloned());
            }
        }

        let mut rules = Vec::new();
        for association in &config.associations {
            let (specs, types) = self.expand_association(model, association)?;
            indexes.extend(specs);
            field_types.extend(types);
            for trigger in [Trigger::AfterSave, Trigger::AfterDestroy] {
                rules.push(PropagationRule {
                    trigger,
                    source_model: self.associated_model(model, &association.association)?,
                    owner_model: model.to_string(),
                    association: association.association.clone(),
                });
            }
        }

        let match_all = self.build_match_all(model, &local_types, config)?;

        unique_fields.extend(config.unique.iter().cloned());
        resolve_unique(model, &local_types, &mut indexes, &unique_fields)?;

        let indexes = IndexSet::new(model, indexes, match_all)?;

        Ok(FinalizedIndexConfig {
            model: model.to_string(),
            collection_name: config.collection_name().to_string(),
            indexes,
            field_types,
            rules,
        })
    }

    fn expand(
        &self,
        model: &str,
        association: Option<&str>,
        types: &BTreeMap<String, FieldType>,
        declaration: &FieldDeclaration,
    ) -> Result<Vec<IndexSpec>> {
        if declaration.fields.is_empty() {
            return Err(CipherdexError::config(format!(
                "Index declaration on model {model} names no fields"
            )));
        }
        if declaration.unique && matches!(declaration.mode, IndexMode::Match | IndexMode::DynamicMatch)
        {
            return Err(CipherdexError::config(
                "A match index cannot have a unique constraint",
            ));
        }

        let mut specs = Vec::new();
        for name in &declaration.fields {
            validate_identifier(model, name)?;
            let Some(&field_type) = types.get(name) else {
                return Err(self.unknown_field(model, association, name));
            };

            if field_type == FieldType::Binary {
                log::warn!(
                    "ignoring field '{name}' on model {model}: binary fields cannot be indexed"
                );
                continue;
            }

            let candidates = match declaration.mode.kind() {
                None => applicable_kinds(field_type).to_vec(),
                Some(kind) if permits(field_type, kind) => vec![kind],
                Some(kind) => {
                    return Err(CipherdexError::config(format!(
                        "An index of type '{kind}' cannot index fields of type '{field_type}' ({model}#{name})"
                    )));
                }
            };

            let path = match association {
                Some(association) => FieldPath::associated(association, name.as_str()),
                None => FieldPath::local(name.as_str()),
            };
            let tuning = declaration.tuning.unwrap_or(self.match_defaults);
            for kind in declaration.filter(&candidates) {
                specs.push(IndexSpec::for_kind(path.clone(), kind, tuning));
            }
        }
        Ok(specs)
    }

    fn expand_association(
        &self,
        model: &str,
        declaration: &AssociationDeclaration,
    ) -> Result<(Vec<IndexSpec>, Vec<(FieldPath, FieldType)>)> {
        let association = declaration.association.as_str();
        validate_identifier(model, association)?;

        if let Some(nested) = declaration.nested.first() {
            return Err(CipherdexError::config(format!(
                "Association '{association}.{}' on model {model} nests more than one association; only one hop is supported",
                nested.association
            )));
        }

        match self.catalog.association_kind(model, association) {
            AssociationKind::OneToOne => {}
            AssociationKind::Other => {
                return Err(CipherdexError::config(format!(
                    "Association '{association}' on model {model} is not one-to-one and cannot be indexed"
                )));
            }
            AssociationKind::Unknown => {
                return Err(CipherdexError::config(format!(
                    "Unknown association '{association}' on model {model}"
                )));
            }
        }

        let target = self.associated_model(model, association)?;
        let target_types = self.catalog.field_types(&target)?;

        let mut specs = Vec::new();
        let mut types = Vec::new();
        for field_declaration in &declaration.declarations {
            if field_declaration.unique {
                return Err(CipherdexError::config(format!(
                    "Unique constraints are not supported on association fields ({model}.{association})"
                )));
            }
            let expanded = self.expand(model, Some(association), &target_types, field_declaration)?;
            for spec in &expanded {
                let path = spec.field().clone();
                if let Some(&ty) = target_types.get(path.field()) {
                    types.push((path, ty));
                }
            }
            specs.extend(expanded);
        }
        Ok((specs, types))
    }

    fn build_match_all(
        &self,
        model: &str,
        types: &BTreeMap<String, FieldType>,
        config: &IndexConfig,
    ) -> Result<Option<IndexSpec>> {
        let declaration = match config.match_all.as_slice() {
            [] => return Ok(None),
            [declaration] => declaration,
            _ => {
                return Err(CipherdexError::config(format!(
                    "match_all is declared more than once on model {model}"
                )));
            }
        };

        if declaration.fields.is_empty() {
            return Err(CipherdexError::config(format!(
                "match_all on model {model} names no fields"
            )));
        }

        let mut fields = Vec::with_capacity(declaration.fields.len());
        for name in &declaration.fields {
            validate_identifier(model, name)?;
            match types.get(name) {
                Some(ty) if ty.is_textual() => fields.push(FieldPath::local(name.as_str())),
                Some(ty) => {
                    return Err(CipherdexError::config(format!(
                        "match_all requires string or text fields but {model}#{name} is {ty}"
                    )));
                }
                None => return Err(self.unknown_field(model, None, name)),
            }
        }

        IndexSpec::match_multi(fields, declaration.tuning.unwrap_or(self.match_defaults))
            .map(Some)
    }

    fn associated_model(&self, model: &str, association: &str) -> Result<String> {
        self.catalog
            .associated_model(model, association)
            .ok_or_else(|| {
                CipherdexError::config(format!(
                    "Unknown association '{association}' on model {model}"
                ))
            })
    }

    fn unknown_field(&self, model: &str, association: Option<&str>, name: &str) -> CipherdexError {
        match association {
            Some(association) => CipherdexError::config(format!(
                "Unknown field '{name}' on association '{association}' of model {model}"
            )),
            None if self.catalog.association_kind(model, name) != AssociationKind::Unknown => {
                CipherdexError::config(format!(
                    "'{name}' is an association on model {model}; declare its fields with index_assoc"
                ))
            }
            None => CipherdexError::config(format!(
                "Unknown field or association '{name}' on model {model}"
            )),
        }
    }
}

fn validate_identifier(model: &str, name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(CipherdexError::config(format!(
            "Malformed field identifier '{name}' on model {model}; expected a single field name"
        )))
    }
}

/// Apply unique constraints to the indexes of each named field.
///
/// A field with no exact or range index gets a synthesized unique one. On
/// string fields only the exact index is marked, as range encodings of
/// strings are lossy; on other types both exact and range are marked.
fn resolve_unique(
    model: &str,
    types: &BTreeMap<String, FieldType>,
    indexes: &mut Vec<IndexSpec>,
    fields: &[String],
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in fields {
        if !seen.insert(name.as_str()) {
            continue;
        }
        if name.contains('.') {
            return Err(CipherdexError::config(format!(
                "Unique constraints are local-field-only; '{name}' on model {model} is an association path"
            )));
        }
        validate_identifier(model, name)?;
        let Some(&field_type) = types.get(name) else {
            return Err(CipherdexError::config(format!(
                "Unknown field '{name}' in unique constraint on model {model}"
            )));
        };

        let path = FieldPath::local(name.as_str());
        let on_field: Vec<usize> = indexes
            .iter()
            .enumerate()
            .filter(|(_, index)| index.field() == &path && !index.is_match_all())
            .map(|(pos, _)| pos)
            .collect();

        let enforcing: Vec<usize> = on_field
            .iter()
            .copied()
            .filter(|&pos| indexes[pos].kind().supports_unique())
            .collect();

        if enforcing.is_empty() {
            if !on_field.is_empty() {
                return Err(CipherdexError::config(format!(
                    "Unique constraint on {model}#{name} cannot be enforced by a match index"
                )));
            }
            let kind = [IndexKind::Exact, IndexKind::Range]
                .into_iter()
                .find(|&kind| permits(field_type, kind))
                .ok_or_else(|| {
                    CipherdexError::config(format!(
                        "Field {model}#{name} of type '{field_type}' cannot carry a unique index"
                    ))
                })?;
            indexes.push(IndexSpec::for_kind(path, kind, MatchOptions::default()).with_unique(true));
            continue;
        }

        let mut marked = false;
        for pos in enforcing {
            let kind = indexes[pos].kind();
            if kind == IndexKind::Exact || !field_type.is_textual() {
                indexes[pos].mark_unique();
                marked = true;
            }
        }
        if !marked {
            return Err(CipherdexError::config(format!(
                "Unique constraint on string field {model}#{name} requires an exact index; range indexes over strings cannot enforce uniqueness"
            )));
        }
    }
    Ok(())
}
