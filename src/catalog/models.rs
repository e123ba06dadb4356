use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::sql::{qualify, CanonicalIdentifier};

/// Relation names of the nexus models, as written in the manifest.
///
/// The first four are required; the rest fall back to a sibling of
/// `entities` carrying the conventional table name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Models {
    pub entities: String,
    pub relationships: String,
    pub events: String,
    pub entity_participants: String,
    #[serde(default)]
    pub entity_traits: Option<String>,
    #[serde(default)]
    pub entity_identifiers: Option<String>,
    #[serde(default)]
    pub entity_identifiers_edges: Option<String>,
    #[serde(default)]
    pub resolved_person_identifiers: Option<String>,
    #[serde(default)]
    pub resolved_group_identifiers: Option<String>,
}

/// Canonical identifiers for every table the operations touch.
#[derive(Debug, Clone, PartialEq)]
pub struct Tables {
    pub entities: CanonicalIdentifier,
    pub relationships: CanonicalIdentifier,
    pub events: CanonicalIdentifier,
    pub entity_participants: CanonicalIdentifier,
    pub entity_traits: CanonicalIdentifier,
    pub entity_identifiers: CanonicalIdentifier,
    pub entity_identifiers_edges: CanonicalIdentifier,
    pub resolved_person_identifiers: CanonicalIdentifier,
    pub resolved_group_identifiers: CanonicalIdentifier,
}

impl Models {
    pub const ENTITIES: &'static str = "nexus_entities";
    pub const RELATIONSHIPS: &'static str = "nexus_relationships";
    pub const EVENTS: &'static str = "nexus_events";
    pub const ENTITY_PARTICIPANTS: &'static str = "nexus_entity_participants";
    pub const ENTITY_TRAITS: &'static str = "nexus_entity_traits";
    pub const ENTITY_IDENTIFIERS: &'static str = "nexus_entity_identifiers";
    pub const ENTITY_IDENTIFIERS_EDGES: &'static str = "nexus_entity_identifiers_edges";
    pub const RESOLVED_PERSON_IDENTIFIERS: &'static str = "nexus_resolved_person_identifiers";
    pub const RESOLVED_GROUP_IDENTIFIERS: &'static str = "nexus_resolved_group_identifiers";

    /// Qualify every relation name, filling optional tables from siblings of
    /// `entities`.
    pub fn qualify(&self) -> Result<Tables> {
        let entities = qualify(&self.entities)?;
        let optional = |relation: &Option<String>, table: &str| -> Result<CanonicalIdentifier> {
            match relation.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
                Some(relation) => qualify(relation),
                None => entities.sibling(table),
            }
        };

        Ok(Tables {
            relationships: qualify(&self.relationships)?,
            events: qualify(&self.events)?,
            entity_participants: qualify(&self.entity_participants)?,
            entity_traits: optional(&self.entity_traits, Self::ENTITY_TRAITS)?,
            entity_identifiers: optional(&self.entity_identifiers, Self::ENTITY_IDENTIFIERS)?,
            entity_identifiers_edges: optional(
                &self.entity_identifiers_edges,
                Self::ENTITY_IDENTIFIERS_EDGES,
            )?,
            resolved_person_identifiers: optional(
                &self.resolved_person_identifiers,
                Self::RESOLVED_PERSON_IDENTIFIERS,
            )?,
            resolved_group_identifiers: optional(
                &self.resolved_group_identifiers,
                Self::RESOLVED_GROUP_IDENTIFIERS,
            )?,
            entities,
        })
    }
}

/// Closed set of entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Group,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Group => "group",
        }
    }

    /// Whether an optional type filter admits `self`.
    pub fn admitted_by(self, filter: Option<EntityType>) -> bool {
        filter.map_or(true, |f| f == self)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NexusError;

    fn required() -> Models {
        Models {
            entities: "`proj`.`nexus`.`nexus_entities`".into(),
            relationships: "proj.nexus.nexus_relationships".into(),
            events: "\"PROJ\".\"NEXUS\".\"NEXUS_EVENTS\"".into(),
            entity_participants: "`proj`.`nexus`.`nexus_entity_participants`".into(),
            entity_traits: None,
            entity_identifiers: None,
            entity_identifiers_edges: Some("`proj`.`edges`.`custom_edges`".into()),
            resolved_person_identifiers: None,
            resolved_group_identifiers: Some("  ".into()),
        }
    }

    #[test]
    fn test_qualify_required_tables() {
        let tables = required().qualify().unwrap();
        assert_eq!(tables.relationships.to_string(), "`proj`.`nexus`.`nexus_relationships`");
        assert_eq!(tables.events.to_string(), "`PROJ`.`NEXUS`.`NEXUS_EVENTS`");
    }

    #[test]
    fn test_optional_tables_fall_back_to_siblings() {
        let tables = required().qualify().unwrap();
        assert_eq!(
            tables.entity_traits.to_string(),
            "`proj`.`nexus`.`nexus_entity_traits`"
        );
        assert_eq!(
            tables.resolved_group_identifiers.to_string(),
            "`proj`.`nexus`.`nexus_resolved_group_identifiers`"
        );
        assert_eq!(
            tables.entity_identifiers_edges.to_string(),
            "`proj`.`edges`.`custom_edges`"
        );
    }

    #[test]
    fn test_malformed_relation_is_format_error() {
        let mut models = required();
        models.events = "``.``".into();
        assert!(matches!(models.qualify(), Err(NexusError::Format(_))));
    }

    #[test]
    fn test_models_from_toml_with_defaults() {
        let models: Models = toml::from_str(
            r#"
            entities = "a.b.nexus_entities"
            relationships = "a.b.nexus_relationships"
            events = "a.b.nexus_events"
            entity_participants = "a.b.nexus_entity_participants"
            "#,
        )
        .unwrap();
        assert!(models.entity_traits.is_none());
        let tables = models.qualify().unwrap();
        assert_eq!(tables.entity_identifiers.table_name(), "nexus_entity_identifiers");
    }

    #[test]
    fn test_entity_type_admission() {
        assert!(EntityType::Person.admitted_by(None));
        assert!(EntityType::Person.admitted_by(Some(EntityType::Person)));
        assert!(!EntityType::Group.admitted_by(Some(EntityType::Person)));
        let parsed: EntityType = serde_json::from_str("\"group\"").unwrap();
        assert_eq!(parsed, EntityType::Group);
        assert_eq!(parsed.to_string(), "group");
    }
}
