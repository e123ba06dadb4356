use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::*;
use crate::error::NexusError;

/// Named catalog operations, addressable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    EntityByIdentifier,
    RelatedEntities,
    RecentEventsForEntity,
    SearchEvents,
    EventParticipants,
    ListEntities,
    ListMemberships,
    TraitHistory,
    EdgesForEntity,
    FindEdgesByIdentifier,
    SearchEdges,
    EdgesWithQualityIssues,
}

impl Operation {
    pub const ALL: [Operation; 12] = [
        Operation::EntityByIdentifier,
        Operation::RelatedEntities,
        Operation::RecentEventsForEntity,
        Operation::SearchEvents,
        Operation::EventParticipants,
        Operation::ListEntities,
        Operation::ListMemberships,
        Operation::TraitHistory,
        Operation::EdgesForEntity,
        Operation::FindEdgesByIdentifier,
        Operation::SearchEdges,
        Operation::EdgesWithQualityIssues,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::EntityByIdentifier => "entity_by_identifier",
            Operation::RelatedEntities => "related_entities",
            Operation::RecentEventsForEntity => "recent_events_for_entity",
            Operation::SearchEvents => "search_events",
            Operation::EventParticipants => "event_participants",
            Operation::ListEntities => "list_entities",
            Operation::ListMemberships => "list_memberships",
            Operation::TraitHistory => "trait_history",
            Operation::EdgesForEntity => "edges_for_entity",
            Operation::FindEdgesByIdentifier => "find_edges_by_identifier",
            Operation::SearchEdges => "search_edges",
            Operation::EdgesWithQualityIssues => "edges_with_quality_issues",
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            Operation::EntityByIdentifier => {
                "Resolve a person or group by entity id, email, domain or other identifier"
            }
            Operation::RelatedEntities => "Entities connected to an entity through relationships",
            Operation::RecentEventsForEntity => "Most recent events an entity participated in",
            Operation::SearchEvents => "Search events by text and filters",
            Operation::EventParticipants => "Persons and groups that took part in an event",
            Operation::ListEntities => "List persons and/or groups",
            Operation::ListMemberships => "List membership relationships",
            Operation::TraitHistory => "Historical values of one trait for an entity",
            Operation::EdgesForEntity => "Identifier edges of an entity with their source events",
            Operation::FindEdgesByIdentifier => "Identifier edges touching one identifier value",
            Operation::SearchEdges => "List identifier edges",
            Operation::EdgesWithQualityIssues => {
                "Identifiers with suspiciously many distinct connections"
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = NexusError;

    /// Accepts `search_events` as well as `search-events`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.name() == normalized)
            .ok_or_else(|| NexusError::validation(format!("Unknown operation: {}", s)))
    }
}

fn parse_args<T: DeserializeOwned>(op: Operation, args: Value) -> Result<T> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|e| NexusError::validation(format!("Invalid arguments for {}: {}", op, e)))
}

impl Catalog {
    /// Run an operation from loosely-typed JSON arguments.
    pub async fn run(&self, op: Operation, args: Value) -> Result<QueryResult> {
        match op {
            Operation::EntityByIdentifier => {
                self.entity_by_identifier(&parse_args(op, args)?).await
            }
            Operation::RelatedEntities => self.related_entities(&parse_args(op, args)?).await,
            Operation::RecentEventsForEntity => {
                self.recent_events_for_entity(&parse_args(op, args)?).await
            }
            Operation::SearchEvents => self.search_events(&parse_args(op, args)?).await,
            Operation::EventParticipants => self.event_participants(&parse_args(op, args)?).await,
            Operation::ListEntities => self.list_entities(&parse_args(op, args)?).await,
            Operation::ListMemberships => self.list_memberships(&parse_args(op, args)?).await,
            Operation::TraitHistory => self.trait_history(&parse_args(op, args)?).await,
            Operation::EdgesForEntity => self.edges_for_entity(&parse_args(op, args)?).await,
            Operation::FindEdgesByIdentifier => {
                self.find_edges_by_identifier(&parse_args(op, args)?).await
            }
            Operation::SearchEdges => self.search_edges(&parse_args(op, args)?).await,
            Operation::EdgesWithQualityIssues => {
                self.edges_with_quality_issues(&parse_args(op, args)?).await
            }
        }
    }
}
