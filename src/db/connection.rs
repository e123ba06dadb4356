use anyhow::Context;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use postgres_native_tls::MakeTlsConnector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::NoTls;

use crate::error::{NexusError, Result};
use crate::sql::{BigQueryDialect, Dialect, DialectTag, SnowflakeDialect};

/// Warehouse descriptor, tagged by `type` the way transformation-tool
/// profiles are.
///
/// Secrets never live here: the login password belongs to `[gateway]`.
/// Everything else is forwarded to the gateway as session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WarehouseTarget {
    Bigquery(BigQueryTarget),
    Snowflake(SnowflakeTarget),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BigQueryTarget {
    #[serde(default)]
    pub project: Option<String>,
    /// `project.dataset` or just `dataset`.
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// `service-account`, `oauth` or unset (application default credentials).
    #[serde(default)]
    pub method: Option<String>,
    /// Service-account key file, as seen by the gateway host.
    #[serde(default)]
    pub keyfile: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SnowflakeTarget {
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub user: String,
    /// Key-pair authentication; the key file as seen by the gateway host.
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub warehouse: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub role: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl BigQueryTarget {
    /// Explicit project, else the first segment of a `project.dataset` value.
    pub fn project_id(&self) -> Option<&str> {
        non_empty(&self.project).or_else(|| {
            non_empty(&self.dataset)
                .filter(|d| d.contains('.'))
                .and_then(|d| d.split('.').next())
                .filter(|p| !p.is_empty())
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_id().is_none() {
            return Err(NexusError::configuration("BigQuery project ID is required"));
        }
        if self.method.as_deref() == Some("service-account") && non_empty(&self.keyfile).is_none()
        {
            return Err(NexusError::configuration(
                "BigQuery service-account authentication requires keyfile",
            ));
        }
        Ok(())
    }

    fn session_settings(&self) -> Vec<(&'static str, String)> {
        let mut settings = Vec::new();
        if let Some(project) = self.project_id() {
            settings.push(("project", project.to_string()));
        }
        for (name, value) in [
            ("dataset", &self.dataset),
            ("location", &self.location),
            ("method", &self.method),
            ("keyfile", &self.keyfile),
        ] {
            if let Some(value) = non_empty(value) {
                settings.push((name, value.to_string()));
            }
        }
        settings
    }
}

impl SnowflakeTarget {
    pub fn uses_key_pair(&self) -> bool {
        non_empty(&self.private_key_path).is_some()
    }

    /// Password authentication needs the gateway login password.
    pub fn requires_password(&self) -> bool {
        !self.uses_key_pair()
    }

    pub fn validate(&self) -> Result<()> {
        if self.account.trim().is_empty() || self.user.trim().is_empty() {
            return Err(NexusError::configuration(
                "Snowflake account and user are required",
            ));
        }
        if self.warehouse.trim().is_empty()
            || self.database.trim().is_empty()
            || self.schema.trim().is_empty()
        {
            return Err(NexusError::configuration(
                "Snowflake warehouse, database, and schema are required",
            ));
        }
        Ok(())
    }

    fn session_settings(&self) -> Vec<(&'static str, String)> {
        let mut settings = vec![
            ("account", self.account.trim().to_string()),
            ("user", self.user.trim().to_string()),
            ("warehouse", self.warehouse.trim().to_string()),
            ("database", self.database.trim().to_string()),
            ("schema", self.schema.trim().to_string()),
        ];
        for (name, value) in [("role", &self.role), ("private_key_path", &self.private_key_path)] {
            if let Some(value) = non_empty(value) {
                settings.push((name, value.to_string()));
            }
        }
        settings
    }
}

impl WarehouseTarget {
    pub fn tag(&self) -> DialectTag {
        match self {
            WarehouseTarget::Bigquery(_) => DialectTag::BigQuery,
            WarehouseTarget::Snowflake(_) => DialectTag::Snowflake,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            WarehouseTarget::Bigquery(target) => target.validate(),
            WarehouseTarget::Snowflake(target) => target.validate(),
        }
    }

    /// Whether the gateway login needs a password for this target.
    pub fn requires_password(&self) -> bool {
        match self {
            WarehouseTarget::Bigquery(_) => false,
            WarehouseTarget::Snowflake(target) => target.requires_password(),
        }
    }

    /// `(name, value)` pairs the gateway uses to open the warehouse session,
    /// led by the warehouse type.
    pub fn session_settings(&self) -> Vec<(&'static str, String)> {
        let mut settings = vec![("type", self.tag().as_str().to_string())];
        settings.extend(match self {
            WarehouseTarget::Bigquery(target) => target.session_settings(),
            WarehouseTarget::Snowflake(target) => target.session_settings(),
        });
        settings
    }

    /// Identifier strategy for this warehouse. Validates first so a Snowflake
    /// dialect never lacks its default database and schema.
    pub fn dialect(&self) -> Result<Arc<dyn Dialect>> {
        self.validate()?;
        Ok(match self {
            WarehouseTarget::Bigquery(_) => Arc::new(BigQueryDialect),
            WarehouseTarget::Snowflake(target) => Arc::new(SnowflakeDialect::new(
                target.database.trim(),
                target.schema.trim(),
            )),
        })
    }

    pub fn display_string(&self) -> String {
        match self {
            WarehouseTarget::Bigquery(target) => format!(
                "bigquery:{}",
                target.project_id().unwrap_or("<unknown project>")
            ),
            WarehouseTarget::Snowflake(target) => format!(
                "snowflake:{}@{}/{}.{}",
                target.user, target.account, target.database, target.schema
            ),
        }
    }
}

/// The PostgreSQL-wire endpoint that fronts the warehouse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Prompt for a password when none is configured. Targets that log in
    /// with a password imply it.
    pub password_required: bool,
    pub ssl_mode: SslMode,
    /// Accept invalid/self-signed certificates. Use with caution.
    pub accept_invalid_certs: bool,
    /// Optional path to a custom CA certificate file (PEM format).
    pub ca_cert_path: Option<String>,
    pub pool_size: usize,
    pub connect_timeout_secs: u64,
}

/// SSL/TLS connection modes, matching the libpq `sslmode` parameter:
/// - `Disable`: No SSL (unencrypted)
/// - `Prefer`: Try SSL first, fall back to non-SSL (default)
/// - `Require`: Require SSL but don't verify certificate
/// - `VerifyCa`: Require SSL and verify the server certificate is signed by a trusted CA
/// - `VerifyFull`: Like VerifyCa, but also verify the server hostname matches the certificate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    /// Value for the `sslmode` connection parameter. tokio-postgres only knows
    /// disable/prefer/require; verification is the TLS connector's job.
    fn as_param(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => "require",
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: 5432,
            database: String::from("warehouse"),
            username: String::from("nexus"),
            password: String::new(),
            password_required: false,
            ssl_mode: SslMode::default(),
            accept_invalid_certs: false,
            ca_cert_path: None,
            pool_size: 4,
            connect_timeout_secs: 15,
        }
    }
}

impl GatewayConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={} sslmode={} connect_timeout={}",
            quote_conn_value(&self.host),
            self.port,
            quote_conn_value(&self.database),
            quote_conn_value(&self.username),
            quote_conn_value(&self.password),
            self.ssl_mode.as_param(),
            self.connect_timeout_secs
        )
    }

    pub fn display_string(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(NexusError::configuration("Gateway host is required"));
        }
        if self.username.trim().is_empty() {
            return Err(NexusError::configuration("Gateway username is required"));
        }
        if self.pool_size == 0 {
            return Err(NexusError::configuration(
                "Gateway pool_size must be at least 1",
            ));
        }
        Ok(())
    }

    /// Build a connection pool whose sessions carry `settings` as `nexus.*`
    /// startup options. No connection is opened until the first query.
    pub fn build_pool(&self, settings: &[(&'static str, String)]) -> Result<Pool> {
        self.validate()?;
        let mut pg_config: tokio_postgres::Config = self
            .connection_string()
            .parse()
            .map_err(|e: tokio_postgres::Error| NexusError::configuration(e.to_string()))?;
        if !settings.is_empty() {
            pg_config.options(&startup_options(settings));
        }
        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let manager = match self.ssl_mode {
            SslMode::Disable => Manager::from_config(pg_config, NoTls, manager_config),
            SslMode::Prefer | SslMode::Require => {
                let tls = build_tls_connector(self, false)
                    .map_err(|e| NexusError::configuration(format!("{:#}", e)))?;
                Manager::from_config(pg_config, tls, manager_config)
            }
            SslMode::VerifyCa | SslMode::VerifyFull => {
                let tls = build_tls_connector(self, true)
                    .map_err(|e| NexusError::configuration(format!("{:#}", e)))?;
                Manager::from_config(pg_config, tls, manager_config)
            }
        };

        Pool::builder(manager)
            .max_size(self.pool_size)
            .runtime(Runtime::Tokio1)
            .create_timeout(Some(Duration::from_secs(self.connect_timeout_secs)))
            .build()
            .map_err(|e| NexusError::configuration(format!("Failed to build pool: {}", e)))
    }
}

/// Build a TLS connector with appropriate certificate configuration.
///
/// # Arguments
/// * `config` - Gateway configuration
/// * `strict_verify` - If true, always verify certificates (for verify-ca/verify-full modes)
fn build_tls_connector(
    config: &GatewayConfig,
    strict_verify: bool,
) -> anyhow::Result<MakeTlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();

    if config.accept_invalid_certs && !strict_verify {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    } else if let Some(ca_path) = &config.ca_cert_path {
        let ca_data = std::fs::read(ca_path)
            .with_context(|| format!("Failed to read CA certificate file: {}", ca_path))?;
        let cert = native_tls::Certificate::from_pem(&ca_data)
            .context("Failed to parse CA certificate")?;
        builder.add_root_certificate(cert);
    }

    let connector = builder.build().context("Failed to build TLS connector")?;

    Ok(MakeTlsConnector::new(connector))
}

/// `-c nexus.<name>=<value>` pairs for the `options` startup parameter.
/// Spaces and backslashes in values are backslash-escaped.
pub fn startup_options(settings: &[(&'static str, String)]) -> String {
    settings
        .iter()
        .map(|(name, value)| {
            let escaped = value.replace('\\', "\\\\").replace(' ', "\\ ");
            format!("-c nexus.{}={}", name, escaped)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote a value for use in a libpq key=value connection string.
/// Wraps in single quotes and escapes backslashes and single quotes.
fn quote_conn_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}
