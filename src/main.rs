use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use filmboard::config::{Cli, Config, StorageBackend};
use filmboard::db;
use filmboard::routes;
use filmboard::service::{FilmService, UserService};
use filmboard::state::AppState;
use filmboard::storage::{
    DynCatalogStorage, DynFilmStorage, DynUserStorage, InMemoryStorage, SqliteStorage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Pick the store backend
    let (users_store, films_store, catalog_store): (
        DynUserStorage,
        DynFilmStorage,
        DynCatalogStorage,
    ) = match config.database.backend {
        StorageBackend::Sqlite => {
            let pool = db::create_pool(config.db_path())?;
            db::run_migrations(&pool)?;
            let store = Arc::new(SqliteStorage::new(pool));
            (store.clone(), store.clone(), store)
        }
        StorageBackend::Memory => {
            tracing::info!("Using in-memory storage; data will not survive a restart");
            let store = Arc::new(InMemoryStorage::new());
            (store.clone(), store.clone(), store)
        }
    };

    // Build app state
    let state = AppState {
        config: config.clone(),
        users: UserService::new(users_store.clone()),
        films: FilmService::new(films_store, users_store, catalog_store),
    };

    let app = routes::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
