use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::connection::{GatewayConfig, WarehouseTarget};
use super::driver::{Connector, PgConnector};
use super::query::QueryResult;
use super::value::normalize_row;
use crate::error::{NexusError, Result};
use crate::sql::{Dialect, DialectTag};

/// A warehouse back-end: a dialect strategy plus a way to open sessions.
#[derive(Clone)]
pub struct Warehouse {
    dialect: Arc<dyn Dialect>,
    connector: Arc<dyn Connector>,
}

impl std::fmt::Debug for Warehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warehouse")
            .field("dialect", &self.dialect)
            .finish_non_exhaustive()
    }
}

impl Warehouse {
    pub fn new(dialect: Arc<dyn Dialect>, connector: Arc<dyn Connector>) -> Self {
        Self { dialect, connector }
    }

    /// Validate the target and wire it to a gateway pool.
    pub fn connect(target: &WarehouseTarget, gateway: &GatewayConfig) -> Result<Self> {
        let dialect = target.dialect()?;
        let connector = PgConnector::new(gateway, target)?;
        info!(
            target = %target.display_string(),
            gateway = %gateway.display_string(),
            "Warehouse configured"
        );
        Ok(Self::new(dialect, Arc::new(connector)))
    }

    pub fn dialect_tag(&self) -> DialectTag {
        self.dialect.tag()
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Translate and run one canonical statement.
    pub async fn execute(&self, canonical_sql: &str) -> Result<QueryResult> {
        let sql = self.dialect.translate(canonical_sql)?;
        debug!(dialect = %self.dialect_tag(), sql = %preview(&sql), "Executing statement");

        let start = Instant::now();
        let mut session = self
            .connector
            .connect()
            .await
            .map_err(|e| self.failure(&e))?;
        let outcome = session.query(&sql).await;
        let elapsed = start.elapsed();

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close warehouse session");
        }

        let native_rows = outcome.map_err(|e| self.failure(&e))?;
        let rows: Vec<_> = native_rows
            .into_iter()
            .map(|row| normalize_row(row, self.dialect.as_ref()))
            .collect();

        info!(
            dialect = %self.dialect_tag(),
            rows = rows.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Query complete"
        );
        Ok(QueryResult::new(rows, elapsed, sql))
    }

    fn failure(&self, err: &NexusError) -> NexusError {
        let label = match self.dialect_tag() {
            DialectTag::BigQuery => "BigQuery",
            DialectTag::Snowflake => "Snowflake",
        };
        NexusError::warehouse(format!("{} query failed: {}", label, err))
    }
}

/// Statement flattened to one line and capped for log output.
fn preview(sql: &str) -> String {
    const MAX: usize = 200;
    let flat: String = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > MAX {
        let cut: String = flat.chars().take(MAX).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}
