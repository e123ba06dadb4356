use serde::Deserialize;
use tracing::debug;

use super::models::{EntityType, Tables};
use super::{Catalog, Refinement};
use crate::db::QueryResult;
use crate::error::Result;
use crate::sql::{compile_filters, compile_order, escape_literal, limit_clause, quote_literal, Traversal};

pub const RECENT_EVENTS_LIMIT: u64 = 10;
pub const SEARCH_EVENTS_LIMIT: u64 = 50;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecentEvents {
    pub entity_id: String,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(flatten)]
    pub refinement: Refinement,
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchEvents {
    /// Free text matched against name, type and source.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(flatten)]
    pub refinement: Refinement,
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventParticipants {
    pub event_id: String,
    #[serde(flatten)]
    pub refinement: Refinement,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TraitHistory {
    pub entity_id: String,
    pub trait_name: String,
    #[serde(flatten)]
    pub refinement: Refinement,
    #[serde(default)]
    pub limit: Option<u64>,
}

pub fn recent_events_sql(tables: &Tables, args: &RecentEvents) -> Result<String> {
    let filters = args.refinement.validated()?;
    let base = format!(
        "SELECT e.*, pp.*
FROM {events} e
JOIN {participants} pp ON e.event_id = pp.event_id
WHERE pp.entity_id = {id}",
        events = tables.events,
        participants = tables.entity_participants,
        id = quote_literal(&args.entity_id),
    );

    Ok(Traversal::new(base)
        .and_opt(
            args.entity_type
                .map(|t| format!("pp.entity_type = {}", quote_literal(t.as_str()))),
        )
        .and_filters(&filters)
        .order_by(&args.refinement.order, "e.occurred_at DESC")
        .page(Some(args.limit.unwrap_or(RECENT_EVENTS_LIMIT)), None)
        .finish())
}

/// `SELECT * FROM events` with an optional text-search OR group ahead of the
/// AND-ed filters.
pub fn search_events_sql(tables: &Tables, args: &SearchEvents) -> Result<String> {
    let filters = args.refinement.validated()?;
    let mut conditions = Vec::new();

    if let Some(query) = args.query.as_deref().filter(|q| !q.is_empty()) {
        let pattern = format!("'%{}%'", escape_literal(query));
        conditions.push(format!(
            "(name LIKE {p} OR type LIKE {p} OR source LIKE {p})",
            p = pattern
        ));
    }
    conditions.extend(compile_filters(&filters));

    let mut sql = format!("SELECT * FROM {}", tables.events);
    if !conditions.is_empty() {
        sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
    }
    let order = compile_order(&args.refinement.order).unwrap_or_else(|| "occurred_at DESC".to_string());
    sql.push_str(&format!(" ORDER BY {}", order));
    sql.push_str(&limit_clause(Some(args.limit.unwrap_or(SEARCH_EVENTS_LIMIT)), None));
    Ok(sql)
}

pub fn event_participants_sql(tables: &Tables, args: &EventParticipants) -> Result<String> {
    let filters = args.refinement.validated()?;
    let base = format!(
        "SELECT pp.*, e.*
FROM {participants} pp
JOIN {entities} e ON pp.entity_id = e.entity_id
WHERE pp.event_id = {id}",
        participants = tables.entity_participants,
        entities = tables.entities,
        id = quote_literal(&args.event_id),
    );

    Ok(Traversal::new(base)
        .and_filters(&filters)
        .order_by(&args.refinement.order, "pp.entity_type, e.name")
        .finish())
}

/// Trait values over time, resolving the trait's identifier pair to an entity
/// id through the person or group identifier tables.
pub fn trait_history_sql(tables: &Tables, args: &TraitHistory) -> Result<String> {
    let filters = args.refinement.validated()?;
    let base = format!(
        "SELECT
  t.entity_trait_id,
  t.event_id,
  t.entity_type,
  t.identifier_type,
  t.identifier_value,
  t.trait_name,
  t.trait_value,
  t.source,
  t.occurred_at,
  COALESCE(pi.person_id, gi.group_id) AS entity_id,
  e.event_name,
  e.event_description,
  e.source AS event_source,
  e.occurred_at AS event_occurred_at
FROM {traits} t
LEFT JOIN {persons} pi
  ON t.identifier_type = pi.identifier_type
  AND t.identifier_value = pi.identifier_value
  AND t.entity_type = 'person'
LEFT JOIN {groups} gi
  ON t.identifier_type = gi.identifier_type
  AND t.identifier_value = gi.identifier_value
  AND t.entity_type = 'group'
LEFT JOIN {events} e ON t.event_id = e.event_id
WHERE COALESCE(pi.person_id, gi.group_id) = {id}",
        traits = tables.entity_traits,
        persons = tables.resolved_person_identifiers,
        groups = tables.resolved_group_identifiers,
        events = tables.events,
        id = quote_literal(&args.entity_id),
    );

    Ok(Traversal::new(base)
        .and(format!("t.trait_name = {}", quote_literal(&args.trait_name)))
        .and_filters(&filters)
        .order_by(&args.refinement.order, "t.occurred_at DESC")
        .page(args.limit, None)
        .finish())
}

impl Catalog {
    pub async fn recent_events_for_entity(&self, args: &RecentEvents) -> Result<QueryResult> {
        self.execute(recent_events_sql(self.tables(), args)?).await
    }

    pub async fn search_events(&self, args: &SearchEvents) -> Result<QueryResult> {
        self.execute(search_events_sql(self.tables(), args)?).await
    }

    pub async fn event_participants(&self, args: &EventParticipants) -> Result<QueryResult> {
        self.execute(event_participants_sql(self.tables(), args)?).await
    }

    pub async fn trait_history(&self, args: &TraitHistory) -> Result<QueryResult> {
        debug!(entity_id = %args.entity_id, trait_name = %args.trait_name, "Trait history");
        self.execute(trait_history_sql(self.tables(), args)?).await
    }
}
