//! Filter and ORDER BY compilation.
//!
//! Callers hand us loosely shaped [`FilterSpec`] payloads (typically straight
//! out of JSON). They are validated once into the closed [`Filter`] type, so
//! nothing past this module ever sees an operator paired with the wrong kind
//! of value.
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

use super::escape::quote_literal;
use crate::error::{NexusError, Result};

/// Operators accepted at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = "LIKE", alias = "like")]
    Like,
    #[serde(rename = "IN", alias = "in")]
    In,
    #[serde(rename = "IS NULL", alias = "is null")]
    IsNull,
    #[serde(rename = "IS NOT NULL", alias = "is not null")]
    IsNotNull,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::GtEq => ">=",
            Operator::LtEq => "<=",
            Operator::Like => "LIKE",
            Operator::In => "IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::GtEq => ">=",
            CompareOp::LtEq => "<=",
        }
    }
}

/// A literal value that can appear on the right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
}

impl Scalar {
    /// Convert a JSON value. Arrays and objects are not scalars.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => Some(Scalar::Number(n.clone())),
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Render as SQL: strings are quoted and escaped, everything else is raw.
    pub fn to_sql(&self) -> String {
        match self {
            Scalar::Null => "NULL".to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => quote_literal(s),
        }
    }

    /// Text form used inside a LIKE pattern.
    fn as_pattern(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value.into())
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Scalar::Number(value.into())
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// Untrusted filter payload as received from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub column: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Option<Value>,
}

impl FilterSpec {
    pub fn new(column: impl Into<String>, operator: Operator, value: Option<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }

    /// The value, treating an explicit JSON `null` as absent.
    fn present_value(&self) -> Option<&Value> {
        self.value.as_ref().filter(|v| !v.is_null())
    }

    fn compare(&self, op: CompareOp) -> Result<Filter> {
        let value = self.present_value().ok_or_else(|| {
            NexusError::validation(format!("{} operator requires a value", self.operator))
        })?;
        let value = Scalar::from_json(value).ok_or_else(|| {
            NexusError::validation(format!("{} operator requires a scalar value", self.operator))
        })?;
        Ok(Filter::Compare {
            column: self.column.clone(),
            op,
            value,
        })
    }

    /// Check the operator/value pairing and produce a typed [`Filter`].
    pub fn validate(&self) -> Result<Filter> {
        let column = self.column.clone();
        match self.operator {
            Operator::IsNull => Ok(Filter::IsNull { column }),
            Operator::IsNotNull => Ok(Filter::IsNotNull { column }),
            Operator::In => match self.present_value() {
                Some(Value::Array(items)) => {
                    let values = items
                        .iter()
                        .map(|item| {
                            Scalar::from_json(item).ok_or_else(|| {
                                NexusError::validation("IN operator values must be scalars")
                            })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Filter::In { column, values })
                }
                _ => Err(NexusError::validation("IN operator requires array value")),
            },
            Operator::Like => {
                let value = self
                    .present_value()
                    .ok_or_else(|| NexusError::validation("LIKE operator requires a value"))?;
                let pattern = Scalar::from_json(value)
                    .ok_or_else(|| NexusError::validation("LIKE operator requires a scalar value"))?
                    .as_pattern();
                Ok(Filter::Like { column, pattern })
            }
            Operator::Eq => self.compare(CompareOp::Eq),
            Operator::NotEq => self.compare(CompareOp::NotEq),
            Operator::Gt => self.compare(CompareOp::Gt),
            Operator::Lt => self.compare(CompareOp::Lt),
            Operator::GtEq => self.compare(CompareOp::GtEq),
            Operator::LtEq => self.compare(CompareOp::LtEq),
        }
    }
}

/// A validated predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    IsNull {
        column: String,
    },
    IsNotNull {
        column: String,
    },
    In {
        column: String,
        values: Vec<Scalar>,
    },
    Like {
        column: String,
        pattern: String,
    },
    /// Comparison against a non-null scalar.
    Compare {
        column: String,
        op: CompareOp,
        value: Scalar,
    },
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Filter::Compare {
            column: column.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::IsNull { column }
            | Filter::IsNotNull { column }
            | Filter::In { column, .. }
            | Filter::Like { column, .. }
            | Filter::Compare { column, .. } => column,
        }
    }
}

/// Validate a batch of caller-supplied filters.
pub fn validate_filters(specs: &[FilterSpec]) -> Result<Vec<Filter>> {
    specs.iter().map(FilterSpec::validate).collect()
}

/// Render one predicate.
pub fn compile_filter(filter: &Filter) -> String {
    match filter {
        Filter::IsNull { column } => format!("{} IS NULL", column),
        Filter::IsNotNull { column } => format!("{} IS NOT NULL", column),
        Filter::In { column, values } => {
            let items: Vec<String> = values.iter().map(Scalar::to_sql).collect();
            format!("{} IN ({})", column, items.join(", "))
        }
        Filter::Like { column, pattern } => {
            format!("{} LIKE {}", column, quote_literal(pattern))
        }
        Filter::Compare { column, op, value } => {
            format!("{} {} {}", column, op.as_sql(), value.to_sql())
        }
    }
}

/// Validate and render a caller-supplied filter in one step.
pub fn compile_filter_spec(spec: &FilterSpec) -> Result<String> {
    spec.validate().map(|filter| compile_filter(&filter))
}

/// Join predicates with `AND`, in input order. `None` when empty.
pub fn compile_filters(filters: &[Filter]) -> Option<String> {
    if filters.is_empty() {
        return None;
    }
    let conditions: Vec<String> = filters.iter().map(compile_filter).collect();
    Some(conditions.join(" AND "))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// One link of an ORDER BY tie-break chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub column: String,
    #[serde(default)]
    pub direction: Direction,
}

impl OrderSpec {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

/// Render an ORDER BY list (without the keyword). `None` when empty.
pub fn compile_order(order: &[OrderSpec]) -> Option<String> {
    if order.is_empty() {
        return None;
    }
    let clauses: Vec<String> = order
        .iter()
        .map(|o| format!("{} {}", o.column, o.direction.as_sql()))
        .collect();
    Some(clauses.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(column: &str, operator: Operator, value: Option<Value>) -> FilterSpec {
        FilterSpec::new(column, operator, value)
    }

    #[test]
    fn test_null_value_rejected_for_value_operators() {
        for op in [
            Operator::Eq,
            Operator::NotEq,
            Operator::Gt,
            Operator::Lt,
            Operator::GtEq,
            Operator::LtEq,
            Operator::Like,
        ] {
            let missing = compile_filter_spec(&spec("x", op, None));
            assert!(matches!(missing, Err(NexusError::Validation(_))), "{}", op);
            let null = compile_filter_spec(&spec("x", op, Some(Value::Null)));
            assert!(matches!(null, Err(NexusError::Validation(_))), "{}", op);
        }
    }

    #[test]
    fn test_in_requires_array() {
        for value in [None, Some(json!("p")), Some(json!(3)), Some(json!({"a": 1}))] {
            let err = compile_filter_spec(&spec("x", Operator::In, value)).unwrap_err();
            assert_eq!(
                err,
                NexusError::Validation("IN operator requires array value".into())
            );
        }
    }

    #[test]
    fn test_in_renders_list() {
        let sql = compile_filter_spec(&spec("x", Operator::In, Some(json!(["p", "q"])))).unwrap();
        assert_eq!(sql, "x IN ('p', 'q')");
    }

    #[test]
    fn test_in_mixed_values() {
        let sql = compile_filter_spec(&spec(
            "x",
            Operator::In,
            Some(json!([null, "it's", 4, 2.5, true])),
        ))
        .unwrap();
        assert_eq!(sql, "x IN (NULL, 'it''s', 4, 2.5, true)");
    }

    #[test]
    fn test_in_rejects_nested_values() {
        let result = compile_filter_spec(&spec("x", Operator::In, Some(json!([["a"]]))));
        assert!(matches!(result, Err(NexusError::Validation(_))));
    }

    #[test]
    fn test_nullity_ignores_value() {
        assert_eq!(
            compile_filter_spec(&spec("deleted_at", Operator::IsNull, Some(json!("ignored"))))
                .unwrap(),
            "deleted_at IS NULL"
        );
        assert_eq!(
            compile_filter_spec(&spec("email", Operator::IsNotNull, None)).unwrap(),
            "email IS NOT NULL"
        );
    }

    #[test]
    fn test_quote_doubled_in_like_and_eq() {
        let like =
            compile_filter_spec(&spec("name", Operator::Like, Some(json!("%O'Brien%")))).unwrap();
        assert_eq!(like, "name LIKE '%O''Brien%'");
        assert_eq!(like.matches('\'').count() % 2, 0);

        let eq = compile_filter_spec(&spec("name", Operator::Eq, Some(json!("a'b'c")))).unwrap();
        assert_eq!(eq, "name = 'a''b''c'");
        assert_eq!(eq.matches('\'').count() % 2, 0);
    }

    #[test]
    fn test_comparison_numbers_are_raw() {
        assert_eq!(
            compile_filter_spec(&spec("score", Operator::GtEq, Some(json!(10)))).unwrap(),
            "score >= 10"
        );
        assert_eq!(
            compile_filter_spec(&spec("active", Operator::NotEq, Some(json!(false)))).unwrap(),
            "active != false"
        );
    }

    #[test]
    fn test_comparison_rejects_array() {
        let result = compile_filter_spec(&spec("x", Operator::Eq, Some(json!(["a"]))));
        assert!(matches!(result, Err(NexusError::Validation(_))));
    }

    #[test]
    fn test_like_number_rendered_as_text() {
        assert_eq!(
            compile_filter_spec(&spec("code", Operator::Like, Some(json!(42)))).unwrap(),
            "code LIKE '42'"
        );
    }

    #[test]
    fn test_filters_join_with_and_in_order() {
        let filters = vec![
            Filter::eq("entity_type", "person"),
            Filter::IsNotNull {
                column: "email".into(),
            },
        ];
        assert_eq!(
            compile_filters(&filters).unwrap(),
            "entity_type = 'person' AND email IS NOT NULL"
        );
        assert!(compile_filters(&[]).is_none());
    }

    #[test]
    fn test_order_chain() {
        let order = vec![OrderSpec::desc("occurred_at"), OrderSpec::asc("event_id")];
        assert_eq!(
            compile_order(&order).unwrap(),
            "occurred_at DESC, event_id ASC"
        );
        assert!(compile_order(&[]).is_none());
    }

    #[test]
    fn test_deserialize_filter_payload() {
        let specs: Vec<FilterSpec> = serde_json::from_value(json!([
            {"column": "source", "operator": "=", "value": "hubspot"},
            {"column": "closed_at", "operator": "IS NULL"},
            {"column": "x", "operator": "IN", "value": [1, 2]}
        ]))
        .unwrap();
        let filters = validate_filters(&specs).unwrap();
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[1].column(), "closed_at");
        assert_eq!(
            compile_filters(&filters).unwrap(),
            "source = 'hubspot' AND closed_at IS NULL AND x IN (1, 2)"
        );
    }

    #[test]
    fn test_unknown_operator_rejected_at_deserialize() {
        let result: std::result::Result<FilterSpec, _> =
            serde_json::from_value(json!({"column": "x", "operator": "; DROP", "value": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn test_order_direction_defaults_to_asc() {
        let order: OrderSpec = serde_json::from_value(json!({"column": "name"})).unwrap();
        assert_eq!(order.direction, Direction::Asc);
        let order: OrderSpec =
            serde_json::from_value(json!({"column": "name", "direction": "desc"})).unwrap();
        assert_eq!(order.direction, Direction::Desc);
    }
}
