use crate::config::AppConfig;
use crate::reconciler;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use log::{error, info};
use reqwest::Client;
use std::net::SocketAddr;
use std::sync::Arc;

struct AppState {
    config: AppConfig,
    http: Client,
}

/// Stateless HTTP trigger: `GET /` runs one reconciliation pass. Per-list
/// failures are reported in the 200 body; only configuration, feed, and
/// store-connection failures produce a 500.
pub async fn serve(config: AppConfig, http: Client) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = Arc::new(AppState { config, http });
    let app = Router::new()
        .route("/", get(trigger_run))
        .with_state(state);

    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .await
        .context("HTTP server terminated")?;
    Ok(())
}

async fn trigger_run(State(state): State<Arc<AppState>>) -> (StatusCode, String) {
    match reconciler::execute(&state.config, &state.http).await {
        Ok(summary) => (StatusCode::OK, summary.to_text()),
        Err(err) => {
            error!("An error occurred: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("An error occurred: {err}"),
            )
        }
    }
}
