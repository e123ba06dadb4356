//! Warehouse dialects.
//!
//! Statements are assembled once in canonical form (backtick-quoted identifier
//! chains) and rewritten for the target warehouse right before submission.
//! String literals are never touched, and a multi-segment chain is always
//! replaced as a unit.
use serde::{Deserialize, Serialize};
use std::fmt;

use super::identifier::CANONICAL_QUOTE;
use crate::error::{NexusError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectTag {
    BigQuery,
    Snowflake,
}

impl DialectTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectTag::BigQuery => "bigquery",
            DialectTag::Snowflake => "snowflake",
        }
    }
}

impl fmt::Display for DialectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One canonical identifier chain found in a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain<'a> {
    /// Unquoted segments, in order.
    pub segments: Vec<String>,
    /// The chain exactly as written in the statement.
    pub raw: &'a str,
}

/// Identifier conventions of one warehouse.
pub trait Dialect: Send + Sync + fmt::Debug {
    fn tag(&self) -> DialectTag;

    /// Render one canonical chain in this dialect's native form.
    fn render_chain(&self, chain: &Chain<'_>) -> Result<String>;

    /// Key under which a result column is exposed.
    fn column_key(&self, name: &str) -> String {
        name.to_string()
    }

    /// Whether text values in timestamp-like columns are re-parsed on the way out.
    fn reparses_timestamp_text(&self) -> bool {
        false
    }

    /// Rewrite every canonical identifier chain in `sql`.
    fn translate(&self, sql: &str) -> Result<String> {
        rewrite_identifiers(sql, |chain| self.render_chain(chain))
    }
}

/// Backtick quoting, case preserved. Canonical statements pass through as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BigQueryDialect;

impl Dialect for BigQueryDialect {
    fn tag(&self) -> DialectTag {
        DialectTag::BigQuery
    }

    fn render_chain(&self, chain: &Chain<'_>) -> Result<String> {
        Ok(chain.raw.to_string())
    }
}

/// Double-quote delimited, upper-cased, always `"DATABASE"."SCHEMA"."TABLE"`.
///
/// Short chains are padded with the connection's default database and schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnowflakeDialect {
    database: String,
    schema: String,
}

impl SnowflakeDialect {
    pub fn new(database: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
        }
    }

    fn quote(segment: &str) -> String {
        format!("\"{}\"", segment.to_uppercase().replace('"', "\"\""))
    }
}

impl Dialect for SnowflakeDialect {
    fn tag(&self) -> DialectTag {
        DialectTag::Snowflake
    }

    fn render_chain(&self, chain: &Chain<'_>) -> Result<String> {
        let mut padded: Vec<&str> = Vec::with_capacity(3);
        match chain.segments.len() {
            0 => {
                return Err(NexusError::format(format!(
                    "Empty identifier chain: {}",
                    chain.raw
                )))
            }
            1 => padded.extend([self.database.as_str(), self.schema.as_str()]),
            2 => padded.push(self.database.as_str()),
            _ => {}
        }
        padded.extend(chain.segments.iter().map(String::as_str));

        if padded.iter().any(|s| s.is_empty()) {
            return Err(NexusError::format(format!(
                "Cannot fully qualify {} without a default database and schema",
                chain.raw
            )));
        }
        let quoted: Vec<String> = padded.iter().map(|s| Self::quote(s)).collect();
        Ok(quoted.join("."))
    }

    fn column_key(&self, name: &str) -> String {
        name.to_lowercase()
    }

    fn reparses_timestamp_text(&self) -> bool {
        true
    }
}

/// Scan `sql` and replace each canonical identifier chain with `render(chain)`.
///
/// Single-quoted literals (with `''` escapes) and double-quoted identifiers are
/// copied verbatim.
pub fn rewrite_identifiers<F>(sql: &str, mut render: F) -> Result<String>
where
    F: FnMut(&Chain<'_>) -> Result<String>,
{
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + 32);
    let mut copied = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b'\'' => pos = skip_quoted(sql, pos, b'\'', "string literal")?,
            b'"' => pos = skip_quoted(sql, pos, b'"', "quoted identifier")?,
            b'`' => {
                let (segments, end) = read_chain(sql, pos)?;
                out.push_str(&sql[copied..pos]);
                let chain = Chain {
                    segments,
                    raw: &sql[pos..end],
                };
                out.push_str(&render(&chain)?);
                copied = end;
                pos = end;
            }
            _ => pos += 1,
        }
    }

    out.push_str(&sql[copied..]);
    Ok(out)
}

/// Position just past the quoted run starting at `start`. A doubled quote
/// character is an escape, not a terminator.
fn skip_quoted(sql: &str, start: usize, quote: u8, what: &str) -> Result<usize> {
    let bytes = sql.as_bytes();
    let mut pos = start + 1;
    while pos < bytes.len() {
        if bytes[pos] == quote {
            if bytes.get(pos + 1) == Some(&quote) {
                pos += 2;
                continue;
            }
            return Ok(pos + 1);
        }
        pos += 1;
    }
    Err(NexusError::format(format!(
        "Unterminated {} at byte {}",
        what, start
    )))
}

/// Read one backtick segment starting at `start`; returns it and the position
/// past its closing backtick.
fn read_segment(sql: &str, start: usize) -> Result<(String, usize)> {
    let body_start = start + CANONICAL_QUOTE.len_utf8();
    let close = sql[body_start..]
        .find(CANONICAL_QUOTE)
        .map(|offset| body_start + offset)
        .ok_or_else(|| {
            NexusError::format(format!("Unterminated identifier at byte {}", start))
        })?;
    let segment = sql[body_start..close].trim();
    if segment.is_empty() {
        return Err(NexusError::format(format!(
            "Empty identifier segment at byte {}",
            start
        )));
    }
    Ok((segment.to_string(), close + CANONICAL_QUOTE.len_utf8()))
}

/// Read `` `a` `` optionally followed by any number of `` . `b` `` links,
/// allowing whitespace around the dots.
fn read_chain(sql: &str, start: usize) -> Result<(Vec<String>, usize)> {
    let bytes = sql.as_bytes();
    let (first, mut end) = read_segment(sql, start)?;
    let mut segments = vec![first];

    loop {
        let mut look = end;
        while look < bytes.len() && bytes[look].is_ascii_whitespace() {
            look += 1;
        }
        if bytes.get(look) != Some(&b'.') {
            break;
        }
        look += 1;
        while look < bytes.len() && bytes[look].is_ascii_whitespace() {
            look += 1;
        }
        if bytes.get(look) != Some(&b'`') {
            break;
        }
        let (segment, next) = read_segment(sql, look)?;
        segments.push(segment);
        end = next;
    }

    Ok((segments, end))
}
