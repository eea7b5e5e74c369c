use anyhow::Result;
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    services::{
        disk_drive::DiskDrive,
        drive::{DRIVE_NAME, Drive},
        file_service::FileService,
        memory_drive::MemoryDrive,
    },
    state::AppState,
};

mod auth;
mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
mod views;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting personal-drive with config: {:?}", cfg);
    if cfg.admin.is_demo() {
        tracing::warn!("Running with demo credentials; uploads and deletes are disabled");
    }

    // --- Open the drive ---
    let drive: Arc<dyn Drive> = if cfg.in_memory {
        if migrate {
            tracing::warn!("Nothing to migrate for the in-memory drive");
            return Ok(());
        }
        Arc::new(MemoryDrive::new())
    } else {
        let disk = open_disk_drive(&cfg).await?;
        disk.migrate().await?;
        if migrate {
            tracing::info!("Database migration complete.");
            return Ok(()); // exit after migration
        }
        Arc::new(disk)
    };
    tracing::info!("Using {} backend for `{}`", drive.backend(), DRIVE_NAME);

    // --- Build router ---
    let state = AppState::new(FileService::new(drive), cfg.admin.clone());
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the storage directory and SQLite file if needed and connect.
async fn open_disk_drive(cfg: &config::AppConfig) -> Result<DiskDrive> {
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(DiskDrive::new(Arc::new(db), cfg.storage_dir.clone()))
}
