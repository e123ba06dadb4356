use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tracing::debug;

use super::connection::{GatewayConfig, WarehouseTarget};
use super::query::{describe_pg_error, parse_rows};
use super::value::NativeRow;
use crate::error::{NexusError, Result};

/// Opens sessions against a warehouse endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Session>>;
}

/// One acquired connection. Consumed by `close`.
#[async_trait]
pub trait Session: Send {
    async fn query(&mut self, sql: &str) -> Result<Vec<NativeRow>>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Connector for a PostgreSQL-wire gateway in front of the warehouse.
#[derive(Clone)]
pub struct PgConnector {
    pool: Pool,
}

impl PgConnector {
    /// Pool against `config`, opening each session with the target's
    /// settings.
    pub fn new(config: &GatewayConfig, target: &WarehouseTarget) -> Result<Self> {
        Ok(Self {
            pool: config.build_pool(&target.session_settings())?,
        })
    }
}

impl std::fmt::Debug for PgConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("PgConnector")
            .field("size", &status.size)
            .field("available", &status.available)
            .finish()
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn Session>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| NexusError::warehouse(format!("Failed to acquire connection: {}", e)))?;
        Ok(Box::new(PgSession { client }))
    }
}

struct PgSession {
    client: Object,
}

#[async_trait]
impl Session for PgSession {
    async fn query(&mut self, sql: &str) -> Result<Vec<NativeRow>> {
        let rows = self
            .client
            .query(sql, &[])
            .await
            .map_err(|e| NexusError::warehouse(describe_pg_error(&e)))?;
        Ok(parse_rows(&rows))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        // Dropping the pooled object hands the client back to the pool.
        if self.client.is_closed() {
            debug!("Gateway connection closed by server; pool will discard it");
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::scripted::ScriptedConnector;
    use super::*;
    use crate::db::value::NativeValue;

    #[tokio::test]
    async fn test_scripted_connector_replays_in_order() {
        let connector = ScriptedConnector::new()
            .respond(vec![vec![("a".into(), NativeValue::Int(1))]])
            .fail("boom");

        let mut session = connector.connect().await.unwrap();
        assert_eq!(session.query("q1").await.unwrap().len(), 1);
        assert_eq!(
            session.query("q2").await.unwrap_err(),
            NexusError::warehouse("boom")
        );
        assert!(session.query("q3").await.unwrap().is_empty());
        session.close().await.unwrap();

        assert_eq!(connector.statements(), vec!["q1", "q2", "q3"]);
        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.closed(), 1);
    }

    #[tokio::test]
    async fn test_pg_connector_unreachable_gateway() {
        let config = GatewayConfig {
            host: "127.0.0.1".into(),
            port: 1,
            ssl_mode: crate::db::SslMode::Disable,
            connect_timeout_secs: 1,
            ..Default::default()
        };
        let target = WarehouseTarget::Bigquery(crate::db::BigQueryTarget {
            project: Some("acme".into()),
            ..Default::default()
        });
        let connector = PgConnector::new(&config, &target).unwrap();
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, NexusError::Warehouse(_)));
    }
}
