//! Route configuration and setup.

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use imgvet_core::Config;

use crate::api_doc::ApiDoc;
use crate::auth::{auth_middleware, AuthFailureLimiter, AuthState};
use crate::handlers;
use crate::state::AppState;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router<()>, anyhow::Error> {
    let cors = setup_cors(config)?;

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/status/{corr_id}", get(handlers::status::get_status))
        .route(
            "/api/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );

    let mut ingest_routes = Router::new().route("/ingest", post(handlers::ingest::ingest));
    if let Some(auth_state) = setup_auth_middleware(config)? {
        ingest_routes = ingest_routes.layer(axum::middleware::from_fn_with_state(
            Arc::new(auth_state),
            auth_middleware,
        ));
    }

    // The request body limit guards the transport; the handler still checks
    // the configured cap itself so rejected uploads get a typed 413 body.
    let app = public_routes
        .merge(ingest_routes)
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes * 2))
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let cors = if config.cors_origins.contains(&"*".to_string()) {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    } else {
        let origins: Result<Vec<HeaderValue>, _> =
            config.cors_origins.iter().map(|o| o.parse()).collect();
        CorsLayer::new()
            .allow_origin(origins.unwrap_or_default())
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    };
    Ok(cors)
}

fn setup_auth_middleware(config: &Config) -> Result<Option<AuthState>, anyhow::Error> {
    let Some(master_api_key) = config.master_api_key.clone() else {
        tracing::warn!("MASTER_API_KEY not set, ingest endpoint is unauthenticated");
        return Ok(None);
    };

    if config.is_production() && master_api_key.len() < 32 {
        return Err(anyhow::anyhow!(
            "MASTER_API_KEY must be at least 32 characters long in production"
        ));
    }

    Ok(Some(AuthState {
        master_api_key,
        auth_failure_limiter: Some(Arc::new(AuthFailureLimiter::new(10, 900))),
    }))
}
