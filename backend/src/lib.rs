//! Dual-currency ledger for a money-transfer agent, served over a local
//! HTTP API.
//!
//! - [`domain`]: the ledger, its derived balances and the persistence-aware service
//! - [`storage`]: key-value stores the service persists through
//! - [`db`]: the SQLite table behind the default store
//! - [`rest`]: axum handlers and router
//! - [`config`]: YAML and environment configuration

pub mod config;
pub mod db;
pub mod domain;
pub mod logging;
pub mod rest;
pub mod storage;

use anyhow::Result;
use axum::Router;
use tracing::info;

use crate::config::AppConfig;
use crate::db::DbConnection;
use crate::domain::LedgerService;
pub use crate::rest::AppState;
use crate::rest::{cors_layer, create_router};

/// Open the database, load the ledger and build the router
pub async fn initialize_backend(config: &AppConfig) -> Result<Router> {
    info!("Setting up database at {}", config.database_url);
    let db = DbConnection::new(&config.database_url).await?;

    let ledger = LedgerService::open(db, config.ledger_settings()).await;
    let cors = cors_layer(&config.allowed_origin)?;

    Ok(create_router(AppState::new(ledger), cors))
}
