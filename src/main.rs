use anyhow::Result;
use bodega_sync::api::ApiClient;
use bodega_sync::config;
use bodega_sync::db::{self, MovementRepo, SqliteStore};
use bodega_sync::secrets::{Credentials, FileSecrets};
use bodega_sync::sync;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/bodega.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;
    let repo = MovementRepo::new(SqliteStore::new(pool));

    let secrets_path = PathBuf::from(&cfg.app.data_dir).join("secrets.json");
    let creds = Arc::new(Credentials::new(Box::new(
        FileSecrets::open(secrets_path).await?,
    )));
    let api = ApiClient::from_config(&cfg, creds.clone())?;

    if creds.token().await.is_none() && creds.remembered_login().await.is_none() {
        warn!("no session token and no remembered login; submissions will fail until an operator logs in");
    }

    info!("starting sync loop");
    let poll_sleep = Duration::from_millis(cfg.app.poll_interval_ms);
    loop {
        match sync::process_pending(&repo, &api).await {
            Ok(submitted) => {
                if !submitted {
                    tokio::time::sleep(poll_sleep).await;
                }
            }
            Err(err) => {
                error!(?err, "sync pass failed; records stay pending");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
