use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::error::Error as StdError;
use std::time::Duration;
use tokio_postgres::types::{FromSql, Type};

use super::value::{NativeRow, NativeValue, Row};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub executed_at: DateTime<Utc>,
    /// The statement as submitted to the warehouse.
    pub query: String,
}

impl QueryResult {
    pub fn new(rows: Vec<Row>, execution_time: Duration, query: String) -> Self {
        Self {
            row_count: rows.len(),
            rows,
            execution_time_ms: execution_time.as_millis() as u64,
            executed_at: Utc::now(),
            query,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }
}

/// Backend message for a failed gateway call, with SQLSTATE and detail when
/// the server sent them.
pub fn describe_pg_error(err: &tokio_postgres::Error) -> String {
    if let Some(db_err) = err.as_db_error() {
        let mut message = format!("{} (SQLSTATE {})", db_err.message(), db_err.code().code());
        if let Some(detail) = db_err.detail() {
            message.push_str(&format!(": {}", detail));
        }
        message
    } else {
        match err.source() {
            Some(source) => format!("{}: {}", err, source),
            None => err.to_string(),
        }
    }
}

pub(crate) fn parse_rows(rows: &[tokio_postgres::Row]) -> Vec<NativeRow> {
    rows.iter()
        .map(|row| {
            row.columns()
                .iter()
                .enumerate()
                .map(|(i, col)| (col.name().to_string(), extract_value(row, i, col.type_())))
                .collect()
        })
        .collect()
}

fn extract_value(row: &tokio_postgres::Row, idx: usize, pg_type: &Type) -> NativeValue {
    match *pg_type {
        Type::BOOL => get::<bool>(row, idx).map(NativeValue::Bool),
        Type::INT2 => get::<i16>(row, idx).map(|v| NativeValue::Int(v.into())),
        Type::INT4 => get::<i32>(row, idx).map(|v| NativeValue::Int(v.into())),
        Type::INT8 => get::<i64>(row, idx).map(NativeValue::Int),
        Type::FLOAT4 => get::<f32>(row, idx).map(|v| NativeValue::Float(v.into())),
        Type::FLOAT8 => get::<f64>(row, idx).map(NativeValue::Float),
        Type::NUMERIC => get::<Numeric>(row, idx).map(|n| n.into_native()),
        Type::DATE => get::<NaiveDate>(row, idx).map(NativeValue::Date),
        Type::TIME => get::<NaiveTime>(row, idx).map(NativeValue::Time),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx).map(NativeValue::Timestamp),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx).map(NativeValue::TimestampTz),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx).map(NativeValue::Json),
        // Fallback: try to get as string
        _ => get::<String>(row, idx).map(NativeValue::Text),
    }
    .unwrap_or(NativeValue::Null)
}

fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, idx: usize) -> Option<T> {
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}

/// A `numeric` value. NaN and the infinities have no `Decimal` form.
#[derive(Debug, Clone, PartialEq)]
enum Numeric {
    Finite(Decimal),
    Special(&'static str),
}

impl Numeric {
    const NAN: u16 = 0xC000;
    const POS_INFINITY: u16 = 0xD000;
    const NEG_INFINITY: u16 = 0xF000;

    /// Whole values become integers, others floats. Anything that fits
    /// neither is kept as text.
    fn into_native(self) -> NativeValue {
        match self {
            Numeric::Special(text) => NativeValue::Text(text.to_string()),
            Numeric::Finite(d) => {
                let whole = if d.fract().is_zero() { d.to_i64() } else { None };
                whole
                    .map(NativeValue::Int)
                    .or_else(|| d.to_f64().filter(|f| f.is_finite()).map(NativeValue::Float))
                    .unwrap_or_else(|| NativeValue::Text(d.to_string()))
            }
        }
    }
}

impl<'a> FromSql<'a> for Numeric {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let sign = raw.get(4..6).map(|w| u16::from_be_bytes([w[0], w[1]]));
        match sign {
            Some(Self::NAN) => Ok(Numeric::Special("NaN")),
            Some(Self::POS_INFINITY) => Ok(Numeric::Special("Infinity")),
            Some(Self::NEG_INFINITY) => Ok(Numeric::Special("-Infinity")),
            _ => Decimal::from_sql(ty, raw).map(Numeric::Finite),
        }
    }

    fn accepts(ty: &Type) -> bool {
        <Decimal as FromSql>::accepts(ty)
    }
}
