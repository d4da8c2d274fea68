//! HTTP front end for the orchestrator
//!
//! Exposes `POST /execute` plus discovery and health routes. A client that
//! disconnects mid-request drops the handler future; the environment guard
//! then reclaims the container.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use drydock::{ExecutionRequest, Orchestrator};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct LanguagesResponse {
    languages: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(orchestrator: Orchestrator) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/languages", get(languages))
        .route("/execute", post(execute))
        .layer(TraceLayer::new_for_http())
        .with_state(orchestrator)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn languages(State(orchestrator): State<Orchestrator>) -> Json<LanguagesResponse> {
    Json(LanguagesResponse {
        languages: orchestrator
            .languages()
            .into_iter()
            .map(str::to_owned)
            .collect(),
    })
}

async fn execute(
    State(orchestrator): State<Orchestrator>,
    Json(request): Json<ExecutionRequest>,
) -> Response {
    if let Err(e) = orchestrator.validate(&request) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response();
    }

    Json(orchestrator.execute(&request).await).into_response()
}

/// Serve until Ctrl-C, letting in-flight executions finish
pub async fn serve(addr: SocketAddr, orchestrator: Orchestrator) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router(orchestrator))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutting down, waiting for in-flight executions");
}
