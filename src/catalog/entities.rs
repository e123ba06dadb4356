use serde::Deserialize;
use tracing::{debug, info};

use super::models::{EntityType, Tables};
use super::{Catalog, Refinement};
use crate::db::QueryResult;
use crate::error::Result;
use crate::sql::{quote_literal, Filter, OrderSpec, QuerySpec, Traversal};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityLookup {
    pub identifier: String,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelatedEntities {
    pub entity_id: String,
    #[serde(default)]
    pub relationship_type: Option<String>,
    #[serde(default)]
    pub related_entity_type: Option<EntityType>,
    #[serde(flatten)]
    pub refinement: Refinement,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ListEntities {
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(flatten)]
    pub refinement: Refinement,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ListMemberships {
    #[serde(flatten)]
    pub refinement: Refinement,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

/// Steps of the identifier cascade, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStep {
    EntityId,
    PersonIdentifier,
    GroupIdentifier,
}

impl LookupStep {
    /// Identifier steps a type filter allows after the entity id miss, in
    /// cascade order.
    pub fn fallbacks(entity_type: Option<EntityType>) -> Vec<LookupStep> {
        let mut steps = Vec::with_capacity(2);
        if EntityType::Person.admitted_by(entity_type) {
            steps.push(LookupStep::PersonIdentifier);
        }
        if EntityType::Group.admitted_by(entity_type) {
            steps.push(LookupStep::GroupIdentifier);
        }
        steps
    }
}

const MEMBERSHIP: &str = "'membership'";

/// Memberships per entity on side `side` (`a` counts memberships held,
/// `b` counts members).
fn membership_counts(tables: &Tables, side: char, alias: &str) -> String {
    format!(
        "(
    SELECT entity_{side}_id AS entity_id, COUNT(*) AS {alias}
    FROM {relationships}
    WHERE relationship_type = {membership}
    GROUP BY entity_{side}_id
  )",
        side = side,
        alias = alias,
        relationships = tables.relationships,
        membership = MEMBERSHIP,
    )
}

pub fn lookup_sql(tables: &Tables, step: LookupStep, lookup: &EntityLookup) -> String {
    let identifier = quote_literal(&lookup.identifier);
    let sql = match step {
        LookupStep::EntityId => {
            let base = format!(
                "SELECT p.*,
  COALESCE(m.membership_count, 0) AS membership_count,
  COALESCE(g.person_count, 0) AS person_count
FROM {entities} p
LEFT JOIN {memberships} m ON p.entity_id = m.entity_id
LEFT JOIN {members} g ON p.entity_id = g.entity_id
WHERE p.entity_id = {identifier}",
                entities = tables.entities,
                memberships = membership_counts(tables, 'a', "membership_count"),
                members = membership_counts(tables, 'b', "person_count"),
                identifier = identifier,
            );
            Traversal::new(base).and_opt(
                lookup
                    .entity_type
                    .map(|t| format!("p.entity_type = {}", quote_literal(t.as_str()))),
            )
        }
        LookupStep::PersonIdentifier => Traversal::new(format!(
            "SELECT p.*,
  COALESCE(m.membership_count, 0) AS membership_count,
  0 AS person_count
FROM {entities} p
JOIN {identifiers} pi ON p.entity_id = pi.person_id
LEFT JOIN {memberships} m ON p.entity_id = m.entity_id
WHERE pi.identifier_value = {identifier}",
            entities = tables.entities,
            identifiers = tables.resolved_person_identifiers,
            memberships = membership_counts(tables, 'a', "membership_count"),
            identifier = identifier,
        ))
        .and("p.entity_type = 'person'"),
        LookupStep::GroupIdentifier => Traversal::new(format!(
            "SELECT p.*,
  0 AS membership_count,
  COALESCE(g.person_count, 0) AS person_count
FROM {entities} p
JOIN {identifiers} gi ON p.entity_id = gi.group_id
LEFT JOIN {members} g ON p.entity_id = g.entity_id
WHERE gi.identifier_value = {identifier}",
            entities = tables.entities,
            identifiers = tables.resolved_group_identifiers,
            members = membership_counts(tables, 'b', "person_count"),
            identifier = identifier,
        ))
        .and("p.entity_type = 'group'"),
    };
    sql.page(Some(1), None).finish()
}

pub fn related_entities_sql(tables: &Tables, args: &RelatedEntities) -> Result<String> {
    let filters = args.refinement.validated()?;
    let id = quote_literal(&args.entity_id);
    let base = format!(
        "SELECT r.*, e.*
FROM {relationships} r
JOIN {entities} e ON (
  (r.entity_a_id = {id} AND e.entity_id = r.entity_b_id)
  OR (r.entity_b_id = {id} AND e.entity_id = r.entity_a_id)
)
WHERE (r.entity_a_id = {id} OR r.entity_b_id = {id})",
        relationships = tables.relationships,
        entities = tables.entities,
        id = id,
    );

    Ok(Traversal::new(base)
        .and_opt(
            args.relationship_type
                .as_deref()
                .map(|t| format!("r.relationship_type = {}", quote_literal(t))),
        )
        .and_opt(
            args.related_entity_type
                .map(|t| format!("e.entity_type = {}", quote_literal(t.as_str()))),
        )
        .and_filters(&filters)
        .order_by(&args.refinement.order, "r.established_at DESC")
        .page(args.limit, args.offset)
        .finish())
}

pub fn list_entities_sql(tables: &Tables, args: &ListEntities) -> Result<String> {
    let filters = args.refinement.validated()?;
    let order = &args.refinement.order;

    // Count-enriched statement only for an unfiltered listing of one type.
    match (args.entity_type, filters.is_empty()) {
        (Some(EntityType::Person), true) => Ok(Traversal::new(format!(
            "SELECT p.*,
  COALESCE(m.membership_count, 0) AS membership_count,
  0 AS person_count
FROM {entities} p
LEFT JOIN {memberships} m ON p.entity_id = m.entity_id
WHERE p.entity_type = 'person'",
            entities = tables.entities,
            memberships = membership_counts(tables, 'a', "membership_count"),
        ))
        .order_by(order, "p.email ASC")
        .page(args.limit, args.offset)
        .finish()),
        (Some(EntityType::Group), true) => Ok(Traversal::new(format!(
            "SELECT g.*,
  0 AS membership_count,
  COALESCE(m.person_count, 0) AS person_count
FROM {entities} g
LEFT JOIN {members} m ON g.entity_id = m.entity_id
WHERE g.entity_type = 'group'",
            entities = tables.entities,
            members = membership_counts(tables, 'b', "person_count"),
        ))
        .order_by(order, "g.domain ASC")
        .page(args.limit, args.offset)
        .finish()),
        _ => {
            let mut all = Vec::with_capacity(filters.len() + 1);
            if let Some(entity_type) = args.entity_type {
                all.push(Filter::eq("entity_type", entity_type.as_str()));
            }
            all.extend(filters);
            Ok(QuerySpec::new(tables.entities.clone())
                .filters(all)
                .order(order.clone())
                .page(args.limit, args.offset)
                .to_sql())
        }
    }
}

pub fn list_memberships_sql(tables: &Tables, args: &ListMemberships) -> Result<String> {
    let mut filters = vec![Filter::eq("relationship_type", "membership")];
    filters.extend(args.refinement.validated()?);
    let order = if args.refinement.order.is_empty() {
        vec![OrderSpec::desc("established_at")]
    } else {
        args.refinement.order.clone()
    };
    Ok(QuerySpec::new(tables.relationships.clone())
        .filters(filters)
        .order(order)
        .page(args.limit, args.offset)
        .to_sql())
}

impl Catalog {
    /// Resolve an entity by id, then by person identifier, then by group
    /// identifier. Returns the last attempted step's result; empty means not
    /// found.
    pub async fn entity_by_identifier(&self, lookup: &EntityLookup) -> Result<QueryResult> {
        debug!(identifier = %lookup.identifier, "Entity lookup by entity_id");
        let mut result = self
            .execute(lookup_sql(self.tables(), LookupStep::EntityId, lookup))
            .await?;

        for step in LookupStep::fallbacks(lookup.entity_type) {
            if !result.is_empty() {
                break;
            }
            debug!(?step, identifier = %lookup.identifier, "Entity lookup fallback");
            result = self.execute(lookup_sql(self.tables(), step, lookup)).await?;
        }

        if result.is_empty() {
            info!(identifier = %lookup.identifier, "Entity not found");
        }
        Ok(result)
    }

    pub async fn related_entities(&self, args: &RelatedEntities) -> Result<QueryResult> {
        self.execute(related_entities_sql(self.tables(), args)?).await
    }

    pub async fn list_entities(&self, args: &ListEntities) -> Result<QueryResult> {
        self.execute(list_entities_sql(self.tables(), args)?).await
    }

    pub async fn list_memberships(&self, args: &ListMemberships) -> Result<QueryResult> {
        self.execute(list_memberships_sql(self.tables(), args)?).await
    }
}
