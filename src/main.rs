use library_store::config::Config;
use library_store::database::{SqliteLibraryRepository, establish_pool};
use library_store::http::{AppState, HttpServer, HttpServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let pool = establish_pool(config.database_url(), config.max_connections()).await?;

    let state = AppState::new(SqliteLibraryRepository::new(pool.clone()));
    let server_config = HttpServerConfig::new(config.server_port());
    let http_server = HttpServer::new(state, server_config).await?;
    http_server.run().await?;

    pool.close().await;

    Ok(())
}
