//! Party registry HTTP server.
//!
//! Run from repo root: `cargo run -p party-server`
//! Needs `PARTY_JWT_SECRET` (32+ bytes) and `DATABASE_URL` or `PARTY_DATABASE_URL`.

use anyhow::Context;
use party_registry::{app_router, bootstrap, init_tracing, Settings};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_tracing();

    let address = settings.bind_address();
    let state = bootstrap(settings).await.context("starting up")?;
    let app = app_router(state);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {}", address))?;
    tracing::info!("Party registry listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
