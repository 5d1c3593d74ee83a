use std::sync::Arc;

use foodgram_sdk::{
    actions::PgStore,
    config::Config,
    routes::{routes, AppContext},
    storage::LocalStorage,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::load()?;

    log::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let cache = match &config.redis_url {
        Some(url) => {
            log::info!("Connecting to redis...");
            let client = redis::Client::open(url.as_str())?;
            Some(client.get_multiplexed_async_connection().await?)
        }
        None => {
            log::warn!("REDIS_URL not set, caching disabled");
            None
        }
    };

    let context = AppContext::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(LocalStorage::new(&config.media_root, &config.media_url)),
        cache,
        &config.public_url,
        config.jwt_secret.as_bytes(),
    );

    let (address, server) = warp::serve(routes(context))
        .try_bind_with_graceful_shutdown((config.host, config.port), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {e}");
            }
        })?;
    log::info!("Server running on {address}");

    server.await;
    log::info!("Server shutting down...");
    Ok(())
}
