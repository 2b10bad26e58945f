use std::net::SocketAddr;
use std::sync::Arc;

use manhub_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes,
    services::profile_service::{InMemoryUserDirectory, PgUserDirectory, UserDirectory},
    AppState,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    init_config()?;
    let config = get_config();

    let users: Arc<dyn UserDirectory> = match &config.database_url {
        Some(database_url) => {
            let pool = create_pool(database_url).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            Arc::new(PgUserDirectory::new(pool))
        }
        None => {
            warn!("DATABASE_URL is not set, profiles are kept in memory");
            Arc::new(InMemoryUserDirectory::new())
        }
    };

    match config.init_data_max_age {
        Some(max_age) => info!(max_age_secs = max_age.as_secs(), "initData staleness window enabled"),
        None => warn!("INIT_DATA_MAX_AGE_SECS is not set, initData auth_date is not checked and captured payloads can be replayed"),
    }

    let app = routes::router(AppState::new(config, users))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
