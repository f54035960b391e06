// ==============================================================================
// main.rs - Clinical Genomics API Gateway Entry Point
// ==============================================================================
// Description: Axum web server for order intake, status queries and upload
//              requests
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-10-19
// Version: 1.1.0
// ==============================================================================

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};

mod handlers;
mod middleware;
mod models;
mod queue;
mod state;

use state::AppState;

const DEFAULT_PORT: u16 = 8099;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    info!("Starting API Gateway v{}", env!("CARGO_PKG_VERSION"));

    let server_port = match std::env::var("GATEWAY_PORT") {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("GATEWAY_PORT must be a port number, got {:?}", raw))?,
        Err(_) => DEFAULT_PORT,
    };

    let state = AppState::new()
        .await
        .context("Failed to initialize application state")?;

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], server_port));
    info!("API Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/cases", get(handlers::list_cases))
        .route("/cases/{case_id}", get(handlers::get_case))
        .route("/samples", get(handlers::list_samples))
        .route("/samples/{sample_id}", get(handlers::get_sample))
        .route("/applications", get(handlers::list_applications))
        .route("/orders/{order_type}/validate", post(handlers::validate_order))
        .route("/orders/{order_type}", post(handlers::submit_order))
        .route("/uploads/{case_id}", post(handlers::request_upload))
        .route("/uploads/{case_id}/ws", get(handlers::upload_progress_ws));

    // Comma-separated, e.g. CORS_ALLOWED_ORIGINS=https://orders.example.com
    let cors_origins =
        std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let allowed_origins: Vec<_> = cors_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-forwarded-email"),
        ])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(handlers::root))
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                // Orders are JSON, a few MB at most
                .layer(DefaultBodyLimit::max(10 * 1024 * 1024)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let app = build_router(AppState::lazy(30));
        let response = app
            .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[tokio::test]
    async fn test_cases_without_email_header_is_unauthorized() {
        let app = build_router(AppState::lazy(30));
        let response = app
            .oneshot(Request::builder().uri("/api/v1/cases").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upload_request_without_email_header_is_unauthorized() {
        let app = build_router(AppState::lazy(30));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/uploads/grumpyowl")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
