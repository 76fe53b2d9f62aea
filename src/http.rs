//! HTTP interface.
//!
//! | Method | Path | Result |
//! |---|---|---|
//! | `POST` | `/api/audit/export/pack` | ZIP proof pack |
//! | `GET` | `/api/audit/packs` | ledger entries of the caller's organization |
//! | `GET` | `/api/audit/packs/:pack_id` | one ledger entry |
//! | `GET` | `/api/audit/packs/:pack_id/download` | stored archive |
//! | `GET` | `/api/audit/packs/:pack_id/verify` | [`crate::integrity::VerificationReport`] |
//! | `POST` | `/api/reports/runs` | new draft run |
//! | `GET` | `/api/reports/runs/:run_id` | run state |
//! | `POST` | `/api/reports/runs/:run_id/artifacts` | attach an artifact |
//! | `POST` | `/api/reports/runs/:run_id/status` | status transition |
//! | `GET` | `/api/reports/runs/:run_id/verify` | run verification |
//! | `GET` | `/health` | liveness |
//!
//! Every response, including errors, carries `X-Request-ID`; a supplied
//! `traceparent` is echoed. Errors follow [`error_response`], including
//! unknown routes and unsupported methods.

pub mod error_response;
pub mod handlers;
pub mod middleware;

use crate::pack::PackService;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Upper bound on request bodies; attachments arrive base64-encoded.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: PackService,
}

impl AppState {
    pub fn new(service: PackService) -> Self {
        Self { service }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/audit/export/pack", post(handlers::export_pack))
        .route("/api/audit/packs", get(handlers::list_packs))
        .route("/api/audit/packs/:pack_id", get(handlers::get_pack))
        .route("/api/audit/packs/:pack_id/download", get(handlers::download_pack))
        .route("/api/audit/packs/:pack_id/verify", get(handlers::verify_pack))
        .route("/api/reports/runs", post(handlers::create_run))
        .route("/api/reports/runs/:run_id", get(handlers::get_run))
        .route("/api/reports/runs/:run_id/artifacts", post(handlers::attach_artifact))
        .route("/api/reports/runs/:run_id/status", post(handlers::transition_run))
        .route("/api/reports/runs/:run_id/verify", get(handlers::verify_run))
        // Applies to the routes above, so it must follow them.
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(middleware::request_context))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

/// Serve until Ctrl-C.
///
/// # Errors
///
/// Returns error if the listener fails.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}
