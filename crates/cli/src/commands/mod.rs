//! CLI subcommands.

pub mod legacy;
pub mod migrate;
pub mod purchases;
pub mod stock;

use std::sync::Arc;

use thiserror::Error;

use voucher_store_shop::config::{ConfigError, ShopConfig, StoreBackend};
use voucher_store_shop::db::{self, PgStore, RepositoryError};
use voucher_store_shop::services::{
    CatalogLoadError, EmailService, EngineError, FulfilmentEngine, Notifier, NtfyClient,
    NtfyError, RandomIds, SystemClock, load_catalog,
};

/// Errors shared by the engine-backed commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("STORE_BACKEND=memory keeps no data between runs; use the postgres backend")]
    MemoryBackend,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogLoadError),

    #[error("SMTP configuration error: {0}")]
    Smtp(String),

    #[error("ntfy configuration error: {0}")]
    Ntfy(#[from] NtfyError),

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the fulfilment engine the shop service would run with.
///
/// Uses the same environment as the `voucher-store` binary so that
/// notifications sent from the CLI go out over the same channels.
pub async fn engine_from_env() -> Result<FulfilmentEngine, CommandError> {
    let config = ShopConfig::from_env()?;
    let StoreBackend::Postgres(url) = &config.backend else {
        return Err(CommandError::MemoryBackend);
    };

    let catalog = load_catalog(&config.catalog_path).await?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(url).await?;

    let email = config
        .email
        .as_ref()
        .map(EmailService::new)
        .transpose()
        .map_err(|e| CommandError::Smtp(e.to_string()))?;
    let ntfy = NtfyClient::new(config.ntfy_base_url.clone())?;

    Ok(FulfilmentEngine::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(catalog),
        Arc::new(SystemClock),
        Arc::new(RandomIds),
        Arc::new(Notifier::new(email, ntfy)),
    ))
}
