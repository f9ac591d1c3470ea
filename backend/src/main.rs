use anyhow::Result;
use tracing::info;

use agent_finance::config::AppConfig;
use agent_finance::{initialize_backend, logging};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = AppConfig::from_env()?;
    let app = initialize_backend(&config).await?;

    info!("Starting server on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
