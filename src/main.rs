use anyhow::{anyhow, Context, Result};
use clap::Parser;
use nexus_query::catalog::{Catalog, Operation};
use nexus_query::config::{Config, PASSWORD_ENV};
use nexus_query::db::Warehouse;
use nexus_query::error::NexusError;
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Query the nexus entity/event models in BigQuery or Snowflake
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (defaults to nexus.toml in the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Project directory whose target/manifest.json names the models
    #[arg(long = "project-dir")]
    project_dir: Option<PathBuf>,

    /// Operation to run, or `operations` to list them
    operation: String,

    /// Operation arguments as a JSON object (`-` reads stdin)
    #[arg(long)]
    args: Option<String>,

    /// Print compact JSON
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.operation == "operations" {
        for op in Operation::ALL {
            println!("{:<28} {}", op.name(), op.summary());
        }
        return Ok(());
    }

    let operation: Operation = cli.operation.parse().map_err(describe)?;
    let args = read_args(cli.args.as_deref())?;

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)?;
    config.target.validate().map_err(describe)?;

    // Resolve password: NEXUS_GATEWAY_PASSWORD env var, then a prompt if one is required
    config.resolve_password(std::env::var(PASSWORD_ENV).ok(), |prompt| {
        rpassword::read_password_from_tty(Some(prompt))
    })?;

    let tables = config
        .resolve_models(cli.project_dir.as_deref())
        .and_then(|models| models.qualify())
        .map_err(describe)?;
    let warehouse = Warehouse::connect(&config.target, &config.gateway).map_err(describe)?;
    let catalog = Catalog::new(warehouse, tables);

    let result = catalog.run(operation, args).await.map_err(describe)?;

    let output = if cli.compact {
        serde_json::to_string(&result)?
    } else {
        serde_json::to_string_pretty(&result)?
    };
    println!("{}", output);
    Ok(())
}

fn read_args(raw: Option<&str>) -> Result<Value> {
    let text = match raw {
        None => return Ok(Value::Null),
        Some("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read arguments from stdin")?;
            buf
        }
        Some(text) => text.to_string(),
    };
    serde_json::from_str(&text).context("--args must be a JSON object")
}

fn describe(err: NexusError) -> anyhow::Error {
    anyhow!("{}: {}", err.kind(), err)
}
