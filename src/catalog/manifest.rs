use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::models::Models;
use crate::error::{NexusError, Result};

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    nodes: IndexMap<String, ManifestNode>,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestNode {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    relation_name: Option<String>,
}

/// `<project_dir>/target/manifest.json`
pub fn manifest_path(project_dir: &Path) -> PathBuf {
    project_dir.join("target").join("manifest.json")
}

/// File marking a project root.
pub const PROJECT_FILE: &str = "dbt_project.yml";

/// Nearest directory at or above `start` that holds [`PROJECT_FILE`].
pub fn find_project_dir(start: &Path) -> Result<PathBuf> {
    let start = std::fs::canonicalize(start).unwrap_or_else(|_| start.to_path_buf());
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_FILE).is_file())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            NexusError::configuration(format!(
                "Could not find {} in {} or any parent directory. \
                 Run from a project directory or pass --project-dir",
                PROJECT_FILE,
                start.display()
            ))
        })
}

impl Models {
    /// Locate the nexus models in a compiled project's manifest.
    pub fn discover(project_dir: &Path) -> Result<Self> {
        let path = manifest_path(project_dir);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            NexusError::configuration(format!(
                "manifest.json not found at {} ({}). Compile the project first.",
                path.display(),
                e
            ))
        })?;
        let manifest: Manifest = serde_json::from_str(&content).map_err(|e| {
            NexusError::configuration(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), nodes = manifest.nodes.len(), "Loaded manifest");
        Self::from_manifest(&manifest)
    }

    /// Discover from the project enclosing `start`.
    pub fn discover_from(start: &Path) -> Result<Self> {
        let project_dir = find_project_dir(start)?;
        debug!(project_dir = %project_dir.display(), "Found project root");
        Self::discover(&project_dir)
    }

    fn from_manifest(manifest: &Manifest) -> Result<Self> {
        let entities = find_model(manifest, Self::ENTITIES);
        let relationships = find_model(manifest, Self::RELATIONSHIPS);
        let events = find_model(manifest, Self::EVENTS);
        let entity_participants = find_model(manifest, Self::ENTITY_PARTICIPANTS);

        let models = match (entities, relationships, events, entity_participants) {
            (Some(entities), Some(relationships), Some(events), Some(entity_participants)) => {
                Models {
                    entities,
                    relationships,
                    events,
                    entity_participants,
                    entity_traits: find_model(manifest, Self::ENTITY_TRAITS),
                    entity_identifiers: find_model(manifest, Self::ENTITY_IDENTIFIERS),
                    entity_identifiers_edges: find_model(manifest, Self::ENTITY_IDENTIFIERS_EDGES),
                    resolved_person_identifiers: find_model(
                        manifest,
                        Self::RESOLVED_PERSON_IDENTIFIERS,
                    )
                    .or_else(|| find_model(manifest, "resolved_person_identifiers")),
                    resolved_group_identifiers: find_model(
                        manifest,
                        Self::RESOLVED_GROUP_IDENTIFIERS,
                    )
                    .or_else(|| find_model(manifest, "resolved_group_identifiers")),
                }
            }
            (entities, relationships, events, participants) => {
                return Err(NexusError::configuration(format!(
                    "Required nexus models not found in manifest. Found: entities={}, relationships={}, events={}, participants={}",
                    entities.is_some(),
                    relationships.is_some(),
                    events.is_some(),
                    participants.is_some()
                )));
            }
        };

        info!(
            entity_traits = models.entity_traits.is_some(),
            entity_identifiers = models.entity_identifiers.is_some(),
            entity_identifiers_edges = models.entity_identifiers_edges.is_some(),
            resolved_person_identifiers = models.resolved_person_identifiers.is_some(),
            resolved_group_identifiers = models.resolved_group_identifiers.is_some(),
            "Discovered nexus models"
        );
        Ok(models)
    }
}

/// Exact name (or `.<name>` node id suffix) first, then case-insensitive
/// substring of the node name. The first hit wins even without a relation.
fn find_model(manifest: &Manifest, name: &str) -> Option<String> {
    let suffix = format!(".{}", name);
    let exact = manifest
        .nodes
        .iter()
        .find(|(id, node)| node.name.as_deref() == Some(name) || id.ends_with(&suffix));
    if let Some((_, node)) = exact {
        return node.relation_name.clone();
    }

    let needle = name.to_lowercase();
    manifest
        .nodes
        .values()
        .find(|node| {
            node.name
                .as_deref()
                .map_or(false, |n| n.to_lowercase().contains(&needle))
        })
        .and_then(|node| node.relation_name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write_manifest(manifest: serde_json::Value) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::write(manifest_path(dir.path()), manifest.to_string()).unwrap();
        dir
    }

    fn node(name: &str, relation: &str) -> serde_json::Value {
        json!({ "name": name, "relation_name": relation, "resource_type": "model" })
    }

    #[test]
    fn test_discover_required_models() {
        let dir = write_manifest(json!({
            "nodes": {
                "model.nexus.nexus_entities": node("nexus_entities", "`p`.`d`.`nexus_entities`"),
                "model.nexus.nexus_relationships": node("nexus_relationships", "`p`.`d`.`nexus_relationships`"),
                "model.nexus.nexus_events": node("nexus_events", "`p`.`d`.`nexus_events`"),
                "model.nexus.nexus_entity_participants": node("nexus_entity_participants", "`p`.`d`.`nexus_entity_participants`"),
                "model.nexus.nexus_entity_traits": node("nexus_entity_traits", "`p`.`d`.`nexus_entity_traits`")
            }
        }));

        let models = Models::discover(dir.path()).unwrap();
        assert_eq!(models.entities, "`p`.`d`.`nexus_entities`");
        assert_eq!(models.entity_traits.as_deref(), Some("`p`.`d`.`nexus_entity_traits`"));
        assert!(models.entity_identifiers.is_none());

        let tables = models.qualify().unwrap();
        assert_eq!(
            tables.resolved_person_identifiers.to_string(),
            "`p`.`d`.`nexus_resolved_person_identifiers`"
        );
    }

    #[test]
    fn test_discover_by_id_suffix_and_substring() {
        let dir = write_manifest(json!({
            "nodes": {
                "model.pkg.nexus_entities": { "relation_name": "a.b.nexus_entities" },
                "model.pkg.rel": node("NEXUS_RELATIONSHIPS_V2", "a.b.rels"),
                "model.pkg.ev": node("nexus_events", "a.b.events"),
                "model.pkg.pp": node("nexus_entity_participants", "a.b.pp"),
                "model.pkg.rpi": node("int_resolved_person_identifiers", "a.b.rpi")
            }
        }));

        let models = Models::discover(dir.path()).unwrap();
        assert_eq!(models.entities, "a.b.nexus_entities");
        assert_eq!(models.relationships, "a.b.rels");
        assert_eq!(models.resolved_person_identifiers.as_deref(), Some("a.b.rpi"));
        assert!(models.resolved_group_identifiers.is_none());
    }

    #[test]
    fn test_missing_required_models() {
        let dir = write_manifest(json!({
            "nodes": {
                "model.pkg.nexus_entities": node("nexus_entities", "a.b.e")
            }
        }));
        let err = Models::discover(dir.path()).unwrap_err();
        assert!(matches!(err, NexusError::Configuration(_)));
        assert!(err.to_string().contains("entities=true, relationships=false"));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let err = Models::discover(dir.path()).unwrap_err();
        assert!(matches!(err, NexusError::Configuration(_)));
        assert!(err.to_string().contains("manifest.json not found"));
    }

    #[test]
    fn test_discover_from_nested_directory() {
        let dir = write_manifest(json!({
            "nodes": {
                "model.nexus.nexus_entities": node("nexus_entities", "a.b.nexus_entities"),
                "model.nexus.nexus_relationships": node("nexus_relationships", "a.b.nexus_relationships"),
                "model.nexus.nexus_events": node("nexus_events", "a.b.nexus_events"),
                "model.nexus.nexus_entity_participants": node("nexus_entity_participants", "a.b.nexus_entity_participants")
            }
        }));
        fs::write(dir.path().join(PROJECT_FILE), "name: nexus\n").unwrap();
        let nested = dir.path().join("models").join("staging");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_project_dir(&nested).unwrap(),
            fs::canonicalize(dir.path()).unwrap()
        );
        let models = Models::discover_from(&nested).unwrap();
        assert_eq!(models.events, "a.b.nexus_events");
    }

    #[test]
    fn test_discover_from_outside_project() {
        let dir = TempDir::new().unwrap();
        let err = Models::discover_from(dir.path()).unwrap_err();
        assert!(matches!(err, NexusError::Configuration(_)));
        assert!(err.to_string().starts_with("Could not find dbt_project.yml"));
    }

    #[test]
    fn test_invalid_manifest_json() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::write(manifest_path(dir.path()), "{ not json").unwrap();
        assert!(matches!(
            Models::discover(dir.path()),
            Err(NexusError::Configuration(_))
        ));
    }
}
