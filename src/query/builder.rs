//! Explicit constraint builder.
//!
//! ```
//! use cipherdex::query::QueryBuilder;
//!
//! let constraints = QueryBuilder::new()
//!     .eq("gender", "F")
//!     .between("age", 18, 65)
//!     .matches("first_name", "mel")
//!     .build();
//! assert_eq!(constraints.len(), 3);
//! ```

use crate::data::Value;
use crate::index::Operator;

/// One `field op value(s)` request, not yet bound to an index.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintExpr {
    /// `field` or `association.field`.
    pub field: String,
    pub operator: Operator,
    pub values: Vec<Value>,
}

impl ConstraintExpr {
    pub fn new(field: impl Into<String>, operator: Operator, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            values,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    constraints: Vec<ConstraintExpr>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Equality constraints from a flat `field => value` map.
    pub fn from_map<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        pairs
            .into_iter()
            .fold(Self::new(), |builder, (field, value)| builder.eq(field, value))
    }

    pub fn constraint(
        mut self,
        field: impl Into<String>,
        operator: Operator,
        values: Vec<Value>,
    ) -> Self {
        self.constraints
            .push(ConstraintExpr::new(field, operator, values));
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraint(field, Operator::Eq, vec![value.into()])
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraint(field, Operator::Lt, vec![value.into()])
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraint(field, Operator::Lte, vec![value.into()])
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraint(field, Operator::Gt, vec![value.into()])
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraint(field, Operator::Gte, vec![value.into()])
    }

    /// Inclusive range.
    pub fn between(
        self,
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.constraint(field, Operator::Between, vec![low.into(), high.into()])
    }

    /// Text containment through a match index.
    pub fn matches(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraint(field, Operator::Match, vec![value.into()])
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn build(self) -> Vec<ConstraintExpr> {
        self.constraints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_map_builds_equality() {
        let constraints = QueryBuilder::from_map([("gender", "F"), ("title", "Dr")]).build();
        assert_eq!(constraints.len(), 2);
        assert!(constraints.iter().all(|c| c.operator == Operator::Eq));
        assert_eq!(constraints[1].values, vec![Value::from("Dr")]);
    }

    #[test]
    fn test_between_carries_two_values() {
        let constraints = QueryBuilder::new().between("age", 1, 2).build();
        assert_eq!(constraints[0].values.len(), Operator::Between.arity());
    }
}
