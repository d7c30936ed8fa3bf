//! Binding of caller constraints and ordering requests to a model's indexes.
//!
//! Every constraint is bound to exactly one [`IndexSpec`](crate::index::IndexSpec)
//! whose kind supports the requested operator. Indexes on a field are tried
//! exact first, then range, then match, so `eq` prefers an exact index and
//! falls back to a range index.

pub mod builder;
pub mod plan;

use crate::data::Value;
use crate::error::{CipherdexError, Result};
use crate::index::{IndexSet, Operator};

pub use self::builder::{ConstraintExpr, QueryBuilder};
pub use self::plan::{BoundConstraint, Direction, OrderBinding, QueryPlan};

/// Everything a caller asked for, before binding.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub constraints: Vec<ConstraintExpr>,
    /// Free-text terms, answered by the match-all index.
    pub free_text: Vec<String>,
    pub ordering: Vec<(String, Direction)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constrain(mut self, builder: QueryBuilder) -> Self {
        self.constraints.extend(builder.build());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.free_text.push(text.into());
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.ordering.push((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Binds requests against one model's [`IndexSet`].
pub struct QueryCompiler<'a> {
    indexes: &'a IndexSet,
    collection: &'a str,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(indexes: &'a IndexSet, collection: &'a str) -> Self {
        Self {
            indexes,
            collection,
        }
    }

    pub fn compile(&self, request: &QueryRequest) -> Result<QueryPlan> {
        let mut constraints = request
            .constraints
            .iter()
            .map(|expr| self.bind(expr))
            .collect::<Result<Vec<_>>>()?;
        for text in &request.free_text {
            constraints.push(self.bind_free_text(text)?);
        }

        let ordering = request
            .ordering
            .iter()
            .map(|(field, direction)| self.bind_order(field, *direction))
            .collect::<Result<Vec<_>>>()?;

        let plan = QueryPlan {
            constraints,
            ordering,
            limit: request.limit,
            offset: request.offset,
        };
        log::debug!("compiled query plan for '{}': {plan:?}", self.collection);
        Ok(plan)
    }

    pub fn bind(&self, expr: &ConstraintExpr) -> Result<BoundConstraint> {
        let field = expr.field.as_str();
        if self.indexes.count_on(field) == 0 {
            return Err(CipherdexError::query(format!(
                "No indexes available for '{field}'"
            )));
        }

        let values = check_operands(field, expr.operator, &expr.values)?;

        let index = self
            .indexes
            .select(field, expr.operator)
            .ok_or_else(|| {
                CipherdexError::query(format!(
                    "No available index for '{field}' using '{}'",
                    expr.operator
                ))
            })?;

        Ok(BoundConstraint {
            index: index.clone(),
            operator: expr.operator,
            values,
        })
    }

    /// Bind an unscoped text search to the match-all index.
    pub fn bind_free_text(&self, text: &str) -> Result<BoundConstraint> {
        let index = self
            .indexes
            .match_all()
            .ok_or_else(|| CipherdexError::no_match_all(self.collection))?;
        Ok(BoundConstraint {
            index: index.clone(),
            operator: Operator::Match,
            values: vec![Value::from(text)],
        })
    }

    pub fn bind_order(&self, field: &str, direction: Direction) -> Result<OrderBinding> {
        let index = self.indexes.range_index(field).ok_or_else(|| {
            CipherdexError::query(format!(
                "Unable to order by '{field}' as there are no range indexes defined for it"
            ))
        })?;
        Ok(OrderBinding {
            index: index.clone(),
            direction,
        })
    }
}

fn check_operands(field: &str, operator: Operator, values: &[Value]) -> Result<Vec<Value>> {
    if values.iter().any(Value::is_pattern) {
        return Err(CipherdexError::query(format!(
            "Cannot query '{field}' with a regular expression; regular expressions are not supported, match against plain text instead"
        )));
    }
    if values.len() != operator.arity() {
        return Err(CipherdexError::query(format!(
            "'{operator}' on '{field}' takes {} value(s) but {} were given",
            operator.arity(),
            values.len()
        )));
    }
    if operator == Operator::Match && values.iter().any(|v| v.as_str().is_none()) {
        return Err(CipherdexError::query(format!(
            "'match' on '{field}' requires a text value"
        )));
    }
    Ok(values.iter().cloned().map(Value::normalize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{FieldPath, IndexKind, IndexSpec, MatchOptions};
    use chrono::{FixedOffset, TimeZone, Utc};

    fn user_indexes(with_match_all: bool) -> IndexSet {
        let name = FieldPath::local("name");
        let dob = FieldPath::local("dob");
        let gender = FieldPath::local("gender");
        let match_all = with_match_all
            .then(|| IndexSpec::match_multi(vec![name.clone()], MatchOptions::default()).unwrap());
        IndexSet::new(
            "users",
            vec![
                IndexSpec::exact(name.clone()),
                IndexSpec::range(name.clone()),
                IndexSpec::matching(name, MatchOptions::default()),
                IndexSpec::range(dob),
                IndexSpec::exact(gender),
            ],
            match_all,
        )
        .unwrap()
    }

    fn bind(indexes: &IndexSet, builder: QueryBuilder) -> Result<BoundConstraint> {
        let expr = builder.build().remove(0);
        QueryCompiler::new(indexes, "users").bind(&expr)
    }

    #[test]
    fn test_eq_prefers_exact_then_range() {
        let indexes = user_indexes(false);
        let bound = bind(&indexes, QueryBuilder::new().eq("name", "Mel")).unwrap();
        assert_eq!(bound.index.kind(), IndexKind::Exact);

        let bound = bind(&indexes, QueryBuilder::new().eq("dob", 1)).unwrap();
        assert_eq!(bound.index.name(), "dob_range");
    }

    #[test]
    fn test_unindexed_and_unsupported() {
        let indexes = user_indexes(false);
        let err = bind(&indexes, QueryBuilder::new().eq("email", "a@b.c")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Query error: No indexes available for 'email'"
        );

        let err = bind(&indexes, QueryBuilder::new().between("gender", "A", "M")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Query error: No available index for 'gender' using 'between'"
        );

        let err = bind(&indexes, QueryBuilder::new().matches("dob", "1970")).unwrap_err();
        assert!(err.is_query_error());
    }

    #[test]
    fn test_regex_operands_are_rejected() {
        let indexes = user_indexes(false);
        let re = regex::Regex::new("^Mel").unwrap();
        let err = bind(&indexes, QueryBuilder::new().matches("name", &re)).unwrap_err();
        assert!(err.to_string().contains("regular expressions"));
    }

    #[test]
    fn test_operand_normalization() {
        let indexes = user_indexes(false);
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let zoned = offset.with_ymd_and_hms(2020, 6, 1, 19, 0, 0).unwrap();

        let bound = bind(&indexes, QueryBuilder::new().gt("dob", zoned)).unwrap();
        assert_eq!(
            bound.values,
            vec![Value::DateTime(Utc.with_ymd_and_hms(2020, 6, 2, 0, 0, 0).unwrap())]
        );
    }

    #[test]
    fn test_free_text_requires_match_all() {
        let err = QueryCompiler::new(&user_indexes(false), "users")
            .bind_free_text("mel")
            .unwrap_err();
        assert!(matches!(err, CipherdexError::NoMatchAllIndex { .. }));

        let indexes = user_indexes(true);
        let bound = QueryCompiler::new(&indexes, "users")
            .bind_free_text("mel")
            .unwrap();
        assert_eq!(bound.index.name(), "__match_multi");
    }

    #[test]
    fn test_ordering_requires_range() {
        let indexes = user_indexes(false);
        let compiler = QueryCompiler::new(&indexes, "users");
        assert!(compiler.bind_order("dob", Direction::Asc).is_ok());

        let err = compiler.bind_order("gender", Direction::Asc).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Query error: Unable to order by 'gender' as there are no range indexes defined for it"
        );
    }

    #[test]
    fn test_compile_request() {
        let indexes = user_indexes(true);
        let request = QueryRequest::new()
            .constrain(QueryBuilder::new().eq("gender", "F"))
            .text("mel")
            .order_by("dob", Direction::Desc)
            .limit(5);
        let plan = QueryCompiler::new(&indexes, "users").compile(&request).unwrap();

        assert_eq!(plan.constraints.len(), 2);
        assert_eq!(plan.ordering[0].index.name(), "dob_range");
        assert_eq!(plan.limit, Some(5));
    }
}
