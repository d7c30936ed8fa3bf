use serde::{Deserialize, Serialize, Serializer};

use crate::data::Value;
use crate::error::Result;
use crate::index::{IndexSpec, Operator};

/// Sort direction of an ordering request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// A constraint bound to the index that will answer it.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundConstraint {
    pub index: IndexSpec,
    pub operator: Operator,
    pub values: Vec<Value>,
}

/// An ordering request bound to a range index.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBinding {
    pub index: IndexSpec,
    pub direction: Direction,
}

/// A fully bound query, ready for the search backend.
///
/// Serializes to `{constraints: [{indexName, op, values}], ordering:
/// [{indexName, direction}], limit, offset}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    pub constraints: Vec<BoundConstraint>,
    pub ordering: Vec<OrderBinding>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl QueryPlan {
    /// True when the plan carries no constraints and no ordering.
    pub fn is_unconstrained(&self) -> bool {
        self.constraints.is_empty() && self.ordering.is_empty()
    }

    pub fn is_ordered(&self) -> bool {
        !self.ordering.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireConstraint<'a> {
    index_name: &'a str,
    op: Operator,
    values: &'a [Value],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireOrdering<'a> {
    index_name: &'a str,
    direction: Direction,
}

#[derive(Serialize)]
struct WirePlan<'a> {
    constraints: Vec<WireConstraint<'a>>,
    ordering: Vec<WireOrdering<'a>>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Serialize for QueryPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        WirePlan {
            constraints: self
                .constraints
                .iter()
                .map(|c| WireConstraint {
                    index_name: c.index.name(),
                    op: c.operator,
                    values: &c.values,
                })
                .collect(),
            ordering: self
                .ordering
                .iter()
                .map(|o| WireOrdering {
                    index_name: o.index.name(),
                    direction: o.direction,
                })
                .collect(),
            limit: self.limit,
            offset: self.offset,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FieldPath;

    #[test]
    fn test_plan_wire_shape() {
        let plan = QueryPlan {
            constraints: vec![BoundConstraint {
                index: IndexSpec::exact(FieldPath::local("gender")),
                operator: Operator::Eq,
                values: vec![Value::from("F")],
            }],
            ordering: vec![OrderBinding {
                index: IndexSpec::range(FieldPath::local("dob")),
                direction: Direction::Desc,
            }],
            limit: Some(10),
            offset: None,
        };

        let json: serde_json::Value = serde_json::from_str(&plan.to_json().unwrap()).unwrap();
        assert_eq!(json["constraints"][0]["indexName"], "gender");
        assert_eq!(json["constraints"][0]["op"], "eq");
        assert_eq!(json["ordering"][0]["indexName"], "dob_range");
        assert_eq!(json["ordering"][0]["direction"], "desc");
        assert_eq!(json["limit"], 10);
        assert!(json["offset"].is_null());
        assert!(plan.is_ordered());
    }
}
