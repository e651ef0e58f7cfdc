//! Logbook server
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (registration closed)
//! logbook
//!
//! # Open registration and listen on a custom address
//! logbook --allow-registration --listen 127.0.0.1:8080
//!
//! # Use a specific config file
//! logbook --config /etc/logbook/config.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use logbook::{Config, HttpServer, LogDb, Services};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "logbook")]
#[command(about = "Personal event logs with share links")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "LOGBOOK_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the database
    #[arg(long, env = "LOGBOOK_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:4000
    #[arg(long, env = "LOGBOOK_LISTEN")]
    listen: Option<String>,

    /// Let anyone create an account
    #[arg(long, env = "LOGBOOK_ALLOW_REGISTRATION")]
    allow_registration: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("logbook=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(listen) = args.listen {
        config.listen_address = listen;
    }
    if args.allow_registration {
        config.allow_registration = true;
    }

    let addr = config.listen_addr()?;

    info!(
        storage_dir = %config.storage_dir.display(),
        listen = %addr,
        allow_registration = config.allow_registration,
        "Starting logbook"
    );

    tokio::fs::create_dir_all(&config.storage_dir).await?;

    if args.config.is_none() {
        let config_path = config.config_path();
        if !config_path.exists() {
            config.save(&config_path)?;
            info!(path = %config_path.display(), "Created default config");
        }
    }

    let db = Arc::new(LogDb::open(&config.database_path())?);
    let stats = db.stats()?;
    info!(
        users = stats.user_count,
        logs = stats.log_count,
        entries = stats.entry_count,
        "Database opened"
    );

    let services = Arc::new(Services::new(db, &config));
    let server = Arc::new(HttpServer::new(services, addr));

    info!("HTTP API available at http://{}", addr);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
