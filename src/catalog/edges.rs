use serde::Deserialize;
use tracing::debug;

use super::models::{EntityType, Tables};
use super::{Catalog, Refinement};
use crate::db::QueryResult;
use crate::error::Result;
use crate::sql::{quote_literal, OrderSpec, QuerySpec, Traversal};

pub const QUALITY_MIN_CONNECTIONS: u64 = 20;
pub const QUALITY_LIMIT: u64 = 500;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityEdges {
    pub entity_id: String,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(flatten)]
    pub refinement: Refinement,
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EdgesByIdentifier {
    pub identifier_value: String,
    #[serde(default)]
    pub identifier_type: Option<String>,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(flatten)]
    pub refinement: Refinement,
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchEdges {
    #[serde(flatten)]
    pub refinement: Refinement,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QualityIssues {
    #[serde(default = "default_min_connections")]
    pub min_connections: u64,
    #[serde(default)]
    pub identifier_type: Option<String>,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, alias = "orderBy", alias = "order_by")]
    pub order: Vec<OrderSpec>,
    #[serde(default)]
    pub limit: Option<u64>,
}

fn default_min_connections() -> u64 {
    QUALITY_MIN_CONNECTIONS
}

impl Default for QualityIssues {
    fn default() -> Self {
        Self {
            min_connections: QUALITY_MIN_CONNECTIONS,
            identifier_type: None,
            entity_type: None,
            source: None,
            order: Vec::new(),
            limit: None,
        }
    }
}

/// Edges touching any identifier resolved to the entity, each joined back to
/// the event that produced it.
///
/// Without an entity type the identifiers are resolved as a person and the
/// edge may be person-person or group-group.
pub fn entity_edges_sql(tables: &Tables, args: &EntityEdges) -> Result<String> {
    let filters = args.refinement.validated()?;
    let (resolved, id_column) = match args.entity_type {
        Some(EntityType::Group) => (&tables.resolved_group_identifiers, "group_id"),
        _ => (&tables.resolved_person_identifiers, "person_id"),
    };
    let first = quote_literal(args.entity_type.unwrap_or(EntityType::Person).as_str());
    let second = quote_literal(args.entity_type.unwrap_or(EntityType::Group).as_str());

    let base = format!(
        "WITH entity_identifiers AS (
  SELECT DISTINCT identifier_type, identifier_value
  FROM {resolved}
  WHERE {id_column} = {id}
),
edges_for_entity AS (
  SELECT DISTINCT
    e.edge_id,
    e.entity_type_a,
    e.identifier_type_a,
    e.identifier_value_a,
    e.entity_type_b,
    e.identifier_type_b,
    e.identifier_value_b,
    e.source AS edge_source
  FROM {edges} e
  INNER JOIN entity_identifiers ei ON (
    (e.identifier_type_a = ei.identifier_type AND e.identifier_value_a = ei.identifier_value)
    OR (e.identifier_type_b = ei.identifier_type AND e.identifier_value_b = ei.identifier_value)
  )
  WHERE (e.entity_type_a = {first} AND e.entity_type_b = {first})
    OR (e.entity_type_a = {second} AND e.entity_type_b = {second})
),
edges_with_events AS (
  SELECT DISTINCT efe.*, ei2.event_id
  FROM edges_for_entity efe
  LEFT JOIN {identifiers} ei2 ON (
    (ei2.identifier_type = efe.identifier_type_a AND ei2.identifier_value = efe.identifier_value_a)
    OR (ei2.identifier_type = efe.identifier_type_b AND ei2.identifier_value = efe.identifier_value_b)
  )
  AND ei2.edge_id = efe.edge_id
  AND ei2.entity_type = {first}
)
SELECT
  ewe.edge_id,
  ewe.entity_type_a,
  ewe.identifier_type_a,
  ewe.identifier_value_a,
  ewe.entity_type_b,
  ewe.identifier_type_b,
  ewe.identifier_value_b,
  ewe.edge_source,
  ewe.event_id,
  e.event_name,
  e.event_description,
  e.source AS event_source,
  e.occurred_at AS event_occurred_at
FROM edges_with_events ewe
LEFT JOIN {events} e ON ewe.event_id = e.event_id
WHERE ewe.event_id IS NOT NULL",
        resolved = resolved,
        id_column = id_column,
        id = quote_literal(&args.entity_id),
        edges = tables.entity_identifiers_edges,
        identifiers = tables.entity_identifiers,
        events = tables.events,
        first = first,
        second = second,
    );

    Ok(Traversal::new(base)
        .and_filters(&filters)
        .order_by(&args.refinement.order, "e.occurred_at DESC")
        .page(args.limit, None)
        .finish())
}

pub fn edges_by_identifier_sql(tables: &Tables, args: &EdgesByIdentifier) -> Result<String> {
    let filters = args.refinement.validated()?;
    let value = quote_literal(&args.identifier_value);
    let side = |s: char| {
        let mut cond = format!("e.identifier_value_{} = {}", s, value);
        if let Some(identifier_type) = &args.identifier_type {
            cond.push_str(&format!(
                " AND e.identifier_type_{} = {}",
                s,
                quote_literal(identifier_type)
            ));
        }
        if let Some(entity_type) = args.entity_type {
            cond.push_str(&format!(
                " AND e.entity_type_{} = {}",
                s,
                quote_literal(entity_type.as_str())
            ));
        }
        cond
    };

    let base = format!(
        "SELECT DISTINCT
  e.edge_id,
  e.entity_type_a,
  e.identifier_type_a,
  e.identifier_value_a,
  e.entity_type_b,
  e.identifier_type_b,
  e.identifier_value_b,
  e.source AS edge_source,
  ei.event_id,
  ev.event_name,
  ev.event_description,
  ev.source AS event_source,
  ev.occurred_at AS event_occurred_at
FROM {edges} e
LEFT JOIN {identifiers} ei ON (
  (ei.identifier_type = e.identifier_type_a AND ei.identifier_value = e.identifier_value_a)
  OR (ei.identifier_type = e.identifier_type_b AND ei.identifier_value = e.identifier_value_b)
)
AND ei.edge_id = e.edge_id
LEFT JOIN {events} ev ON ei.event_id = ev.event_id
WHERE (({a}) OR ({b}))",
        edges = tables.entity_identifiers_edges,
        identifiers = tables.entity_identifiers,
        events = tables.events,
        a = side('a'),
        b = side('b'),
    );

    Ok(Traversal::new(base)
        .and_filters(&filters)
        .order_by(&args.refinement.order, "ev.occurred_at DESC")
        .page(args.limit, None)
        .finish())
}

pub fn search_edges_sql(tables: &Tables, args: &SearchEdges) -> Result<String> {
    let filters = args.refinement.validated()?;
    let order = if args.refinement.order.is_empty() {
        vec![OrderSpec::asc("edge_id")]
    } else {
        args.refinement.order.clone()
    };
    Ok(QuerySpec::new(tables.entity_identifiers_edges.clone())
        .filters(filters)
        .order(order)
        .page(args.limit, args.offset)
        .to_sql())
}

/// Identifiers on side A connected to more than `min_connections` distinct
/// side-B values.
pub fn quality_issues_sql(tables: &Tables, args: &QualityIssues) -> String {
    let mut conditions = Vec::new();
    if let Some(identifier_type) = &args.identifier_type {
        conditions.push(format!("identifier_type_a = {}", quote_literal(identifier_type)));
    }
    if let Some(entity_type) = args.entity_type {
        conditions.push(format!("entity_type_a = {}", quote_literal(entity_type.as_str())));
    }
    if let Some(source) = &args.source {
        conditions.push(format!("source = {}", quote_literal(source)));
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("\n  WHERE {}", conditions.join(" AND "))
    };

    let base = format!(
        "WITH edge_distribution AS (
  SELECT
    entity_type_a,
    identifier_type_a,
    identifier_value_a,
    COUNT(DISTINCT identifier_value_b) AS unique_connections
  FROM {edges}{where_clause}
  GROUP BY entity_type_a, identifier_type_a, identifier_value_a
)
SELECT entity_type_a, identifier_type_a, identifier_value_a, unique_connections
FROM edge_distribution
WHERE unique_connections > {min}",
        edges = tables.entity_identifiers_edges,
        where_clause = where_clause,
        min = args.min_connections,
    );

    Traversal::new(base)
        .order_by(&args.order, "unique_connections DESC")
        .page(Some(args.limit.unwrap_or(QUALITY_LIMIT)), None)
        .finish()
}

impl Catalog {
    pub async fn edges_for_entity(&self, args: &EntityEdges) -> Result<QueryResult> {
        debug!(entity_id = %args.entity_id, entity_type = ?args.entity_type, "Edges for entity");
        self.execute(entity_edges_sql(self.tables(), args)?).await
    }

    pub async fn find_edges_by_identifier(&self, args: &EdgesByIdentifier) -> Result<QueryResult> {
        debug!(identifier_value = %args.identifier_value, "Edges by identifier");
        self.execute(edges_by_identifier_sql(self.tables(), args)?).await
    }

    pub async fn search_edges(&self, args: &SearchEdges) -> Result<QueryResult> {
        self.execute(search_edges_sql(self.tables(), args)?).await
    }

    pub async fn edges_with_quality_issues(&self, args: &QualityIssues) -> Result<QueryResult> {
        debug!(min_connections = args.min_connections, "Edge quality scan");
        self.execute(quality_issues_sql(self.tables(), args)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::{bigquery, flat, models};
    use crate::db::scripted::ScriptedConnector;
    use crate::db::NativeValue;
    use serde_json::json;

    fn tables() -> Tables {
        models().qualify().unwrap()
    }

    #[test]
    fn test_entity_edges_defaults_to_person() {
        let args: EntityEdges = serde_json::from_value(json!({ "entity_id": "per_1" })).unwrap();
        let sql = flat(&entity_edges_sql(&tables(), &args).unwrap());
        assert!(sql.contains(
            "FROM `proj`.`nexus`.`nexus_resolved_person_identifiers` WHERE person_id = 'per_1'"
        ));
        assert!(sql.contains(
            "WHERE (e.entity_type_a = 'person' AND e.entity_type_b = 'person') \
             OR (e.entity_type_a = 'group' AND e.entity_type_b = 'group')"
        ));
        assert!(sql.contains("AND ei2.entity_type = 'person'"));
        assert!(sql.contains("LEFT JOIN `proj`.`nexus`.`nexus_entity_identifiers` ei2"));
        assert!(sql.ends_with("WHERE ewe.event_id IS NOT NULL ORDER BY e.occurred_at DESC"));
    }

    #[test]
    fn test_entity_edges_for_group() {
        let args: EntityEdges = serde_json::from_value(json!({
            "entity_id": "grp_1",
            "entity_type": "group",
            "limit": 50
        }))
        .unwrap();
        let sql = flat(&entity_edges_sql(&tables(), &args).unwrap());
        assert!(sql.contains("nexus_resolved_group_identifiers` WHERE group_id = 'grp_1'"));
        assert!(sql.contains(
            "WHERE (e.entity_type_a = 'group' AND e.entity_type_b = 'group') \
             OR (e.entity_type_a = 'group' AND e.entity_type_b = 'group')"
        ));
        assert!(sql.ends_with("LIMIT 50"));
    }

    #[test]
    fn test_edges_by_identifier_scoped() {
        let args: EdgesByIdentifier = serde_json::from_value(json!({
            "identifier_value": "ann@example.com",
            "identifier_type": "email",
            "entity_type": "person",
            "filters": [{ "column": "e.source", "operator": "!=", "value": "legacy" }]
        }))
        .unwrap();
        let sql = flat(&edges_by_identifier_sql(&tables(), &args).unwrap());
        assert!(sql.ends_with(
            "WHERE ((e.identifier_value_a = 'ann@example.com' AND e.identifier_type_a = 'email' \
             AND e.entity_type_a = 'person') OR (e.identifier_value_b = 'ann@example.com' \
             AND e.identifier_type_b = 'email' AND e.entity_type_b = 'person')) \
             AND e.source != 'legacy' ORDER BY ev.occurred_at DESC"
        ));
    }

    #[test]
    fn test_edges_by_identifier_unscoped() {
        let args: EdgesByIdentifier =
            serde_json::from_value(json!({ "identifier_value": "555-0100" })).unwrap();
        let sql = flat(&edges_by_identifier_sql(&tables(), &args).unwrap());
        assert!(sql.contains(
            "WHERE ((e.identifier_value_a = '555-0100') OR (e.identifier_value_b = '555-0100'))"
        ));
    }

    #[test]
    fn test_search_edges_default_order() {
        let args = SearchEdges {
            limit: Some(100),
            offset: Some(200),
            ..Default::default()
        };
        assert_eq!(
            search_edges_sql(&tables(), &args).unwrap(),
            "SELECT * FROM `proj`.`nexus`.`nexus_entity_identifiers_edges` \
             ORDER BY edge_id ASC LIMIT 100 OFFSET 200"
        );
    }

    #[test]
    fn test_quality_issues_defaults() {
        let args: QualityIssues = serde_json::from_value(json!({})).unwrap();
        assert_eq!(args, QualityIssues::default());
        let sql = flat(&quality_issues_sql(&tables(), &args));
        assert!(sql.contains(
            "FROM `proj`.`nexus`.`nexus_entity_identifiers_edges` GROUP BY entity_type_a"
        ));
        assert!(sql.ends_with(
            "WHERE unique_connections > 20 ORDER BY unique_connections DESC LIMIT 500"
        ));
    }

    #[test]
    fn test_quality_issues_scoped() {
        let args = QualityIssues {
            min_connections: 5,
            identifier_type: Some("email".into()),
            entity_type: Some(EntityType::Person),
            source: Some("crm".into()),
            order: vec![OrderSpec::asc("identifier_value_a")],
            limit: Some(10),
        };
        let sql = flat(&quality_issues_sql(&tables(), &args));
        assert!(sql.contains(
            "WHERE identifier_type_a = 'email' AND entity_type_a = 'person' AND source = 'crm' \
             GROUP BY"
        ));
        assert!(sql.ends_with(
            "WHERE unique_connections > 5 ORDER BY identifier_value_a ASC LIMIT 10"
        ));
    }

    #[tokio::test]
    async fn test_quality_issues_executes() {
        let connector = ScriptedConnector::new().respond(vec![vec![
            ("identifier_value_a".into(), NativeValue::Text("noreply@example.com".into())),
            ("unique_connections".into(), NativeValue::Int(912)),
        ]]);
        let catalog = bigquery(&connector);

        let result = catalog
            .edges_with_quality_issues(&QualityIssues::default())
            .await
            .unwrap();

        assert_eq!(result.rows[0]["unique_connections"], json!(912));
        assert_eq!(connector.closed(), 1);
    }
}
