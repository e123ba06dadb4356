use serde::Serialize;
use std::fmt;

use crate::error::{NexusError, Result};

/// Quote character of the dialect-neutral identifier form.
pub const CANONICAL_QUOTE: char = '`';

/// A fully segment-quoted, dialect-neutral table reference such as
/// `` `project`.`dataset`.`nexus_entities` ``.
///
/// Only [`qualify`] and the dialect scanner build these, so every segment is
/// non-empty and wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct CanonicalIdentifier {
    segments: Vec<String>,
}

impl CanonicalIdentifier {
    pub(crate) fn from_segments(segments: Vec<String>) -> Result<Self> {
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(NexusError::format(format!(
                "Invalid identifier segments: {:?}",
                segments
            )));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The unquoted table name (last segment).
    pub fn table_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Same namespace, different table name.
    pub fn sibling(&self, table: &str) -> Result<Self> {
        let mut segments = self.segments.clone();
        segments.pop();
        segments.push(table.to_string());
        Self::from_segments(segments)
    }
}

impl fmt::Display for CanonicalIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{q}{}{q}", segment, q = CANONICAL_QUOTE)?;
        }
        Ok(())
    }
}

impl From<CanonicalIdentifier> for String {
    fn from(value: CanonicalIdentifier) -> Self {
        value.to_string()
    }
}

/// Turn a manifest relation name into its canonical identifier.
///
/// Accepts `` `p`.`d`.`t` ``, `"DB"."SCHEMA"."T"` or bare `d.t`; any existing
/// quoting is stripped before the segments are re-wrapped.
pub fn qualify(relation: &str) -> Result<CanonicalIdentifier> {
    let cleaned: String = relation
        .chars()
        .filter(|c| *c != CANONICAL_QUOTE && *c != '"')
        .collect();
    let segments: Vec<String> = cleaned
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if segments.is_empty() {
        return Err(NexusError::format(format!(
            "Invalid relation_name format: {}",
            relation
        )));
    }

    CanonicalIdentifier::from_segments(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify_backtick_relation() {
        let id = qualify("`proj`.`analytics`.`nexus_entities`").unwrap();
        assert_eq!(id.to_string(), "`proj`.`analytics`.`nexus_entities`");
        assert_eq!(id.segments().len(), 3);
        assert_eq!(id.table_name(), "nexus_entities");
    }

    #[test]
    fn test_qualify_double_quoted_relation() {
        let id = qualify("\"DB\".\"SCHEMA\".\"NEXUS_EVENTS\"").unwrap();
        assert_eq!(id.to_string(), "`DB`.`SCHEMA`.`NEXUS_EVENTS`");
    }

    #[test]
    fn test_qualify_bare_and_sloppy() {
        assert_eq!(qualify("dataset.events").unwrap().to_string(), "`dataset`.`events`");
        assert_eq!(qualify(" a .. b. ").unwrap().to_string(), "`a`.`b`");
        assert_eq!(qualify("events").unwrap().to_string(), "`events`");
    }

    #[test]
    fn test_qualify_empty_is_format_error() {
        for bad in ["", "``", "...", "`.`"] {
            assert!(matches!(qualify(bad), Err(NexusError::Format(_))), "{:?}", bad);
        }
    }

    #[test]
    fn test_qualify_is_stable() {
        let once = qualify("`a`.`b`.`c`").unwrap();
        let twice = qualify(&once.to_string()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_sibling_swaps_table() {
        let id = qualify("`p`.`d`.`nexus_entities`").unwrap();
        assert_eq!(
            id.sibling("nexus_entity_traits").unwrap().to_string(),
            "`p`.`d`.`nexus_entity_traits`"
        );
    }

    #[test]
    fn test_serializes_as_string() {
        let id = qualify("d.t").unwrap();
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("`d`.`t`"));
    }
}
