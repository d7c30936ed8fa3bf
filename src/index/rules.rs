//! Which index kinds a field type may carry.

use crate::data::FieldType;
use crate::index::IndexKind;

const TEXTUAL: &[IndexKind] = &[IndexKind::Exact, IndexKind::Range, IndexKind::Match];
const ORDERED: &[IndexKind] = &[IndexKind::Range];
const DISCRETE: &[IndexKind] = &[IndexKind::Exact];

/// Index kinds implied by `auto` for a field of `field_type`.
///
/// Binary fields carry no indexes. Boolean and uuid fields are exact-only.
pub fn applicable_kinds(field_type: FieldType) -> &'static [IndexKind] {
    match field_type {
        FieldType::String | FieldType::Text => TEXTUAL,
        FieldType::Integer
        | FieldType::Float
        | FieldType::Decimal
        | FieldType::Date
        | FieldType::Datetime
        | FieldType::Timestamp => ORDERED,
        FieldType::Boolean | FieldType::Uuid => DISCRETE,
        FieldType::Binary => &[],
    }
}

/// Whether an explicitly requested kind is legal for `field_type`.
///
/// Dynamic match indexes are never implied by `auto` but may be requested
/// on any field that supports a match index.
pub fn permits(field_type: FieldType, kind: IndexKind) -> bool {
    let kinds = applicable_kinds(field_type);
    match kind {
        IndexKind::DynamicMatch => kinds.contains(&IndexKind::Match),
        _ => kinds.contains(&kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applicable_kinds_table() {
        let textual = [IndexKind::Exact, IndexKind::Range, IndexKind::Match];
        assert_eq!(applicable_kinds(FieldType::String), textual);
        assert_eq!(applicable_kinds(FieldType::Text), textual);

        for ty in [
            FieldType::Integer,
            FieldType::Float,
            FieldType::Decimal,
            FieldType::Date,
            FieldType::Datetime,
            FieldType::Timestamp,
        ] {
            assert_eq!(applicable_kinds(ty), [IndexKind::Range], "{ty}");
        }

        assert_eq!(applicable_kinds(FieldType::Boolean), [IndexKind::Exact]);
        assert_eq!(applicable_kinds(FieldType::Uuid), [IndexKind::Exact]);
        assert!(applicable_kinds(FieldType::Binary).is_empty());
    }

    #[test]
    fn test_permits() {
        assert!(permits(FieldType::Text, IndexKind::DynamicMatch));
        assert!(!permits(FieldType::Boolean, IndexKind::Match));
        assert!(!permits(FieldType::Integer, IndexKind::Exact));
        assert!(!permits(FieldType::Binary, IndexKind::Exact));
    }
}
