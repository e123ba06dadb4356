//! Statement assembly.
//!
//! Two shapes are produced here: the generic `SELECT * FROM <relation>`
//! listing driven entirely by a [`QuerySpec`], and [`Traversal`], which takes a
//! hand-written multi-join base statement and appends caller filters, ordering
//! and pagination the same way the listing does.
use super::filter::{compile_filters, compile_order, Filter, OrderSpec};
use super::identifier::CanonicalIdentifier;

/// Everything needed to render a generic listing statement.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub relation: CanonicalIdentifier,
    pub filters: Vec<Filter>,
    pub order: Vec<OrderSpec>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl QuerySpec {
    pub fn new(relation: CanonicalIdentifier) -> Self {
        Self {
            relation,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn order(mut self, order: Vec<OrderSpec>) -> Self {
        self.order = order;
        self
    }

    pub fn page(mut self, limit: Option<u64>, offset: Option<u64>) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn to_sql(&self) -> String {
        build_listing(self)
    }
}

/// `SELECT * FROM <relation> [WHERE …] [ORDER BY …] [LIMIT n] [OFFSET m]`.
pub fn build_listing(spec: &QuerySpec) -> String {
    let mut sql = format!("SELECT * FROM {}", spec.relation);

    if let Some(conditions) = compile_filters(&spec.filters) {
        sql.push_str(&format!(" WHERE {}", conditions));
    }
    if let Some(order) = compile_order(&spec.order) {
        sql.push_str(&format!(" ORDER BY {}", order));
    }
    sql.push_str(&limit_clause(spec.limit, spec.offset));

    sql
}

/// ` LIMIT n` and ` OFFSET m`, the latter only when `m > 0`.
pub fn limit_clause(limit: Option<u64>, offset: Option<u64>) -> String {
    let mut clause = String::new();
    if let Some(limit) = limit {
        clause.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = offset.filter(|o| *o > 0) {
        clause.push_str(&format!(" OFFSET {}", offset));
    }
    clause
}

/// Builder for hand-authored traversal statements.
///
/// The base statement must already end in a `WHERE` clause; everything added
/// afterwards is AND-ed onto it.
#[derive(Debug, Clone)]
pub struct Traversal {
    sql: String,
}

impl Traversal {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            sql: base.into().trim_end().to_string(),
        }
    }

    /// Append a raw condition. Callers are responsible for escaping literals.
    pub fn and(mut self, condition: impl AsRef<str>) -> Self {
        self.sql.push_str("\n  AND ");
        self.sql.push_str(condition.as_ref());
        self
    }

    /// Append a condition only when `condition` is `Some`.
    pub fn and_opt(self, condition: Option<String>) -> Self {
        match condition {
            Some(c) => self.and(c),
            None => self,
        }
    }

    pub fn and_filters(self, filters: &[Filter]) -> Self {
        match compile_filters(filters) {
            Some(conditions) => self.and(conditions),
            None => self,
        }
    }

    /// Caller ordering if any, otherwise the operation's fixed default.
    pub fn order_by(mut self, order: &[OrderSpec], default: &str) -> Self {
        let clause = compile_order(order).unwrap_or_else(|| default.to_string());
        self.sql.push_str(&format!("\nORDER BY {}", clause));
        self
    }

    pub fn page(mut self, limit: Option<u64>, offset: Option<u64>) -> Self {
        self.sql.push_str(&limit_clause(limit, offset));
        self
    }

    pub fn finish(self) -> String {
        self.sql
    }
}
