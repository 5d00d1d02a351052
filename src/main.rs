mod api;
mod assemble;
mod auth;
mod config;
mod db;
mod digest;
mod error;
mod pipeline;
mod reclaim;
mod storage;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{HeaderName, HeaderValue};
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use config::Config;
use storage::S3ObjectStore;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blockbox=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(
        env = %config.app_env,
        block_size_mb = config.block_size_mb,
        "configuration loaded"
    );

    // Metadata store
    let db = db::init_database(&config.database_url())
        .await
        .expect("Failed to initialize database");
    tracing::info!("Database initialized");

    // Object store
    let object_store = Arc::new(S3ObjectStore::from_config(&config));
    tracing::info!(
        endpoint = %config.s3_endpoint,
        bucket = %config.s3_bucket,
        "Object store configured"
    );

    let app_port = config.app_port;
    let state = Arc::new(AppState::new(config, db, object_store));

    let app = api::router()
        .with_state(state)
        // Uploads may be tens of gigabytes; the pipeline bounds memory, not
        // the body limit.
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ));

    let addr: SocketAddr = format!("0.0.0.0:{}", app_port)
        .parse()
        .expect("Invalid APP_PORT");
    tracing::info!("blockbox listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
