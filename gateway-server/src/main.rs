mod config;
mod logging;

use anyhow::Context;
use clap::Parser;
use gateway_core::datasource::{MemorySource, PersistentSource};
use gateway_core::Catalog;
use gateway_mysql::{run, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Command-line flags mirror the config struct one-for-one (§6 CLI
/// surface); anything not passed falls back to the config file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON config file. Falls back to $SQLEXEC_CONFIG, then
    /// ./config.json, then /etc/sqlexec-gatewayd/config.json.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut cfg = config::Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(host) = args.host {
        cfg.server.host = host;
    }
    if let Some(port) = args.port {
        cfg.server.port = port;
    }

    logging::init(&cfg.logging);
    info!(host = %cfg.server.host, port = cfg.server.port, "starting sqlexec-gatewayd");

    let catalog = Arc::new(Catalog::new());
    wire_default_source(&catalog, &cfg.database).context("wiring default data source")?;

    let server_config = ServerConfig {
        host: cfg.server.host,
        port: cfg.server.port,
        server_version: cfg.server.server_version,
        max_connections: cfg.database.max_connections,
    };

    run(server_config, catalog).await
}

/// The backend new `CREATE TABLE` statements land on, chosen from
/// `database.enabled_sources[0]` (§6). `"memory"` (default) or
/// `"persistent"` against `database.database_dir`.
fn wire_default_source(catalog: &Arc<Catalog>, database: &config::DatabaseSection) -> anyhow::Result<()> {
    let backend = database.enabled_sources.first().map(String::as_str).unwrap_or("memory");
    match backend {
        "memory" => {
            catalog.set_default_source(Arc::new(MemorySource::new()));
        }
        "persistent" => {
            let dir = database
                .database_dir
                .clone()
                .context("database.database_dir is required when enabled_sources includes \"persistent\"")?;
            catalog.set_default_source(Arc::new(PersistentSource::new(dir)));
        }
        other => anyhow::bail!("unknown data source kind {other:?}"),
    }
    Ok(())
}
