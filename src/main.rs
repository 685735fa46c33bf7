mod config;
mod error;
mod interceptor;
mod middleware;
mod models;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use axum::{middleware as axum_mw, Router};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use config::Config;
use interceptor::DbSink;
use services::graph_cache::GraphCache;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!("starting llm-usage-proxy on {}", config.listen_addr);

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("database migrations applied");

    services::model_registry::seed_from_config(&db, &config).await?;

    let state = Arc::new(AppState {
        usage_sink: Arc::new(DbSink::new(db.clone())),
        db,
        config: config.clone(),
        http_client: reqwest::Client::new(),
        graph_cache: Arc::new(GraphCache::new()),
    });

    let admin_routes = routes::admin::router().route_layer(axum_mw::from_fn_with_state(
        state.clone(),
        middleware::auth::admin_auth,
    ));

    let api_routes = routes::models::router()
        .merge(routes::proxy::router())
        .route_layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::user_key_auth,
        ));

    let app = Router::new()
        .nest("/admin", admin_routes)
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("listening on {}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shut down cleanly");
    Ok(())
}

/// Waits for SIGINT or SIGTERM so the DB pool closes gracefully (§6's
/// exit-code table: graceful shutdown, not a fatal exit).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
