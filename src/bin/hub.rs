//! Standalone log hub.
//!
//! Binds the ingestion/broadcast endpoints on one address and runs until
//! interrupted. The listen address comes from the first CLI argument,
//! then the `LOGVINE_ADDR` environment variable, then the default below.

use std::env;
use std::sync::Arc;

use axum::middleware;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use logvine::hub::Hub;
use logvine::logger::Logger;
use logvine::trace::{TraceMiddleware, propagate};

const DEFAULT_ADDR: &str = "127.0.0.1:2022";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let addr = env::args()
        .nth(1)
        .or_else(|| env::var("LOGVINE_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_owned());

    let logger = Arc::new(Logger::default());
    let hub = Hub::new();
    let app = hub.router().layer(middleware::from_fn_with_state(
        TraceMiddleware::new(logger),
        propagate,
    ));

    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "logvine hub listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("install ctrl-c handler");
    info!("shutdown signal received, draining connections");
}
