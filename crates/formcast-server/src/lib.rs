// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// formcast-server — HTTP surface that downloads PDF templates, fills their
// placeholders from the submitted fields and mails the results.

pub mod error;
pub mod request;
pub mod routes;
pub mod state;
pub mod workspace;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use formcast_core::error::FormcastError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

/// Build the router with all endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .route("/api/pdf/send", post(routes::send::send_pdfs))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Bind to the configured address and serve until the process exits.
pub async fn serve(state: AppState) -> Result<(), FormcastError> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
