use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::catalog::Models;
use crate::db::{GatewayConfig, WarehouseTarget};

/// Environment variable consulted for the gateway password.
pub const PASSWORD_ENV: &str = "NEXUS_GATEWAY_PASSWORD";

/// Contents of `nexus.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub target: WarehouseTarget,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

/// Where the model relation names come from: explicit names win over a
/// project directory to discover them in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelsConfig {
    #[serde(default)]
    pub project_dir: Option<PathBuf>,
    #[serde(default)]
    pub relations: Option<Models>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nexus-query")
            .join("nexus.toml")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        debug!(path = %path.display(), target = %config.target.display_string(), "Loaded config");
        Ok(config)
    }

    /// Relation names from, in order: a `--project-dir` override, explicit
    /// `[models.relations]`, `[models] project_dir`, the project enclosing the
    /// working directory.
    pub fn resolve_models(&self, project_dir: Option<&Path>) -> crate::error::Result<Models> {
        if let Some(dir) = project_dir {
            return Models::discover(dir);
        }
        if let Some(relations) = &self.models.relations {
            return Ok(relations.clone());
        }
        match &self.models.project_dir {
            Some(dir) => Models::discover(dir),
            None => Models::discover_from(Path::new(".")),
        }
    }

    /// Whether a missing gateway password has to be asked for.
    pub fn password_required(&self) -> bool {
        self.gateway.password_required || self.target.requires_password()
    }

    /// Fill an empty gateway password from `env`, otherwise from `prompt`
    /// when one is required. Without either the gateway is reached with no
    /// password (trust or certificate auth).
    pub fn resolve_password<F>(&mut self, env: Option<String>, prompt: F) -> Result<()>
    where
        F: FnOnce(&str) -> std::io::Result<String>,
    {
        if !self.gateway.password.is_empty() {
            return Ok(());
        }
        if let Some(pw) = env.filter(|pw| !pw.is_empty()) {
            self.gateway.password = pw;
            return Ok(());
        }
        if !self.password_required() {
            debug!(gateway = %self.gateway.display_string(), "No gateway password configured");
            return Ok(());
        }
        let message = format!("Password for {}: ", self.gateway.display_string());
        self.gateway.password = prompt(&message).context("Failed to read gateway password")?;
        Ok(())
    }
}
