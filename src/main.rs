use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use tally::analytics::{ClickRecorder, GeoResolver};
use tally::config::{Config, DatabaseBackend};
use tally::storage::{CachedStorage, MemoryStorage, PostgresStorage, SqliteStorage, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let backend: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(SqliteStorage::new(&config.database.url, config.database.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.database.url);
            Arc::new(
                PostgresStorage::new(&config.database.url, config.database.max_connections).await?,
            )
        }
        DatabaseBackend::Memory => {
            info!("Using in-memory storage (nothing persists across restarts)");
            Arc::new(MemoryStorage::new())
        }
    };

    info!("Initializing database...");
    backend.init().await?;
    info!("Database initialized successfully");

    let storage: Arc<dyn Storage> = if config.cache.enabled {
        info!(
            "Link lookup cache enabled ({} entries, {}s TTL)",
            config.cache.max_entries, config.cache.ttl_secs
        );
        Arc::new(CachedStorage::new(
            backend,
            config.cache.max_entries,
            config.cache.ttl_secs,
        ))
    } else {
        backend
    };

    let geo = GeoResolver::new(&config.analytics)?;
    if config.analytics.geo_enabled {
        info!(
            "Geolocation lookups via {} (timeout {}ms)",
            config.analytics.geo_api_url, config.analytics.geo_timeout_ms
        );
    } else {
        info!("Geolocation lookups disabled; clicks record location as Unknown");
    }
    info!(
        "Bucket day keys use fixed offset UTC{:+03}",
        config.analytics.utc_offset_hours
    );

    let recorder = Arc::new(ClickRecorder::new(
        Arc::clone(&storage),
        geo,
        config.analytics.bucket_offset(),
    ));

    let api_router = tally::api::create_api_router(Arc::clone(&storage));
    let redirect_router = tally::redirect::create_redirect_router(
        Arc::clone(&storage),
        recorder,
        config.analytics.clone(),
    );

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("🚀 API server listening on http://{}", api_addr);
    info!("   - Stats available at http://{}/api/stats/{{link_id}}", api_addr);

    let redirect_addr = format!(
        "{}:{}",
        config.redirect_server.host, config.redirect_server.port
    );
    let redirect_listener = tokio::net::TcpListener::bind(&redirect_addr).await?;
    info!("🚀 Redirect server listening on http://{}", redirect_addr);

    tokio::try_join!(
        axum::serve(
            api_listener,
            api_router.into_make_service_with_connect_info::<SocketAddr>(),
        ),
        axum::serve(
            redirect_listener,
            redirect_router.into_make_service_with_connect_info::<SocketAddr>(),
        ),
    )?;

    Ok(())
}
