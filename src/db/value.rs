use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};

use crate::sql::Dialect;

/// Columns whose text values are treated as timestamps by dialects that
/// re-parse them.
static TIMESTAMP_COLUMN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(_at$|_time$|timestamp)").expect("valid timestamp column regex"));

/// A value as handed back by a warehouse driver, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(Value),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Timestamp without zone, interpreted as UTC.
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    /// Driver container around another value (e.g. `{ value: … }` wrappers).
    Wrapped(Box<NativeValue>),
}

impl NativeValue {
    pub fn wrapped(inner: NativeValue) -> Self {
        NativeValue::Wrapped(Box::new(inner))
    }
}

/// A driver row: column names in driver order with their raw values.
pub type NativeRow = Vec<(String, NativeValue)>;

/// A canonical row: column key to canonical scalar, in driver column order.
pub type Row = IndexMap<String, Value>;

/// Render a UTC instant the way every result exposes timestamps:
/// `2024-03-01T12:30:00.000Z`.
pub fn iso_timestamp(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Best-effort parse of a timestamp rendered as text by a warehouse.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff] [+-]HHMM`, zone-less
/// date-times (taken as UTC) and bare dates (midnight UTC).
pub fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f %z", "%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn is_timestamp_column(column: &str) -> bool {
    TIMESTAMP_COLUMN.is_match(column)
}

/// Normalize one value for the column `key` (already dialect-folded).
///
/// The timestamp heuristic applies only to bare text; wrapped values are
/// unwrapped as-is.
pub fn normalize_value(value: NativeValue, key: &str, dialect: &dyn Dialect) -> Value {
    match value {
        NativeValue::Text(s) if dialect.reparses_timestamp_text() && is_timestamp_column(key) => {
            // Unparseable text in a timestamp-named column becomes null.
            parse_timestamp_text(&s)
                .map(|dt| Value::String(iso_timestamp(&dt)))
                .unwrap_or(Value::Null)
        }
        other => canonical_value(other),
    }
}

fn canonical_value(value: NativeValue) -> Value {
    match value {
        NativeValue::Null => Value::Null,
        NativeValue::Bool(b) => Value::Bool(b),
        NativeValue::Int(i) => Value::Number(i.into()),
        NativeValue::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        NativeValue::Text(s) => Value::String(s),
        NativeValue::Json(v) => v,
        NativeValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        NativeValue::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
        NativeValue::Timestamp(naive) => Value::String(iso_timestamp(&naive.and_utc())),
        NativeValue::TimestampTz(dt) => Value::String(iso_timestamp(&dt)),
        NativeValue::Wrapped(inner) => canonical_value(*inner),
    }
}

/// Normalize a full driver row into the canonical shape.
pub fn normalize_row(row: NativeRow, dialect: &dyn Dialect) -> Row {
    let mut out = Row::with_capacity(row.len());
    for (name, value) in row {
        let key = dialect.column_key(&name);
        let value = normalize_value(value, &key, dialect);
        out.insert(key, value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{BigQueryDialect, SnowflakeDialect};
    use chrono::TimeZone;
    use serde_json::json;

    fn snowflake() -> SnowflakeDialect {
        SnowflakeDialect::new("DB", "NEXUS")
    }

    #[test]
    fn test_wrapped_values_unwrap() {
        let value = NativeValue::wrapped(NativeValue::wrapped(NativeValue::Int(7)));
        assert_eq!(normalize_value(value, "n", &BigQueryDialect), json!(7));
    }

    #[test]
    fn test_wrapped_timestamp_becomes_iso() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let value = NativeValue::wrapped(NativeValue::TimestampTz(ts));
        assert_eq!(
            normalize_value(value, "occurred_at", &BigQueryDialect),
            json!("2024-03-01T12:30:00.000Z")
        );
    }

    #[test]
    fn test_naive_timestamp_and_date() {
        let naive = NaiveDate::from_ymd_opt(2023, 12, 31)
            .unwrap()
            .and_hms_milli_opt(23, 59, 59, 250)
            .unwrap();
        assert_eq!(
            normalize_value(NativeValue::Timestamp(naive), "x", &BigQueryDialect),
            json!("2023-12-31T23:59:59.250Z")
        );
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(
            normalize_value(NativeValue::Date(date), "d", &BigQueryDialect),
            json!("2024-01-02")
        );
    }

    #[test]
    fn test_bigquery_keeps_text_as_is() {
        let value = NativeValue::Text("not a date".into());
        assert_eq!(
            normalize_value(value, "created_at", &BigQueryDialect),
            json!("not a date")
        );
    }

    #[test]
    fn test_snowflake_reparses_timestamp_columns() {
        let value = NativeValue::Text("2024-05-06 07:08:09.123 -0200".into());
        assert_eq!(
            normalize_value(value, "established_at", &snowflake()),
            json!("2024-05-06T09:08:09.123Z")
        );
    }

    #[test]
    fn test_snowflake_nulls_unparseable_timestamp_text() {
        let value = NativeValue::Text("sometime last week".into());
        assert_eq!(normalize_value(value, "event_time", &snowflake()), Value::Null);
    }

    #[test]
    fn test_snowflake_unwraps_text_without_reparsing() {
        let value = NativeValue::wrapped(NativeValue::Text("pending".into()));
        assert_eq!(normalize_value(value, "status_at", &snowflake()), json!("pending"));
    }

    #[test]
    fn test_snowflake_leaves_other_text() {
        let value = NativeValue::Text("sometime last week".into());
        assert_eq!(
            normalize_value(value, "description", &snowflake()),
            json!("sometime last week")
        );
    }

    #[test]
    fn test_normalize_row_lowercases_for_snowflake() {
        let row: NativeRow = vec![
            ("ENTITY_ID".into(), NativeValue::Text("p_1".into())),
            ("OCCURRED_AT".into(), NativeValue::Text("2024-01-01".into())),
            ("SCORE".into(), NativeValue::Float(1.5)),
        ];
        let out = normalize_row(row, &snowflake());
        let keys: Vec<&str> = out.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["entity_id", "occurred_at", "score"]);
        assert_eq!(out["occurred_at"], json!("2024-01-01T00:00:00.000Z"));
        assert_eq!(out["score"], json!(1.5));
    }

    #[test]
    fn test_normalize_row_keeps_case_for_bigquery() {
        let row: NativeRow = vec![("Entity_Id".into(), NativeValue::Null)];
        let out = normalize_row(row, &BigQueryDialect);
        assert!(out.contains_key("Entity_Id"));
    }

    #[test]
    fn test_non_finite_float_is_null() {
        assert_eq!(
            normalize_value(NativeValue::Float(f64::NAN), "x", &BigQueryDialect),
            Value::Null
        );
    }

    #[test]
    fn test_parse_timestamp_text_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        for text in [
            "2024-02-03T04:05:06Z",
            "2024-02-03T06:05:06+02:00",
            "2024-02-03 04:05:06",
            "2024-02-03T04:05:06",
            "2024-02-03 04:05:06.000 +0000",
        ] {
            assert_eq!(parse_timestamp_text(text), Some(expected), "{}", text);
        }
        assert!(parse_timestamp_text("").is_none());
        assert!(parse_timestamp_text("2024-13-45").is_none());
    }

    #[test]
    fn test_timestamp_column_pattern() {
        assert!(is_timestamp_column("occurred_at"));
        assert!(is_timestamp_column("EVENT_TIME"));
        assert!(is_timestamp_column("load_timestamp_utc"));
        assert!(!is_timestamp_column("attribute"));
        assert!(!is_timestamp_column("time_zone"));
    }
}
