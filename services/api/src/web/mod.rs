pub mod auth;
pub mod instructions;
pub mod middleware;
pub mod rest;
pub mod state;

use std::sync::Arc;

use ats_gate_core::gate::GateError;
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tracing::error;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use middleware::require_auth;
pub use rest::ApiDoc;
pub use state::AppState;

/// Uploads larger than this are rejected before they reach a handler.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Converts a gate failure into the status and message shown to the caller.
pub fn gate_error_response(e: GateError) -> (StatusCode, String) {
    let status = match &e {
        GateError::DuplicateIdentity => StatusCode::CONFLICT,
        GateError::QuotaExceeded { .. } => {
            return (
                StatusCode::PAYMENT_REQUIRED,
                format!("{}. Choose a plan at /plans to continue.", e),
            )
        }
        GateError::NoDocumentProvided => StatusCode::BAD_REQUEST,
        GateError::ConversionFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
        GateError::EngineFailure(_) => StatusCode::BAD_GATEWAY,
        GateError::Persistence(_) | GateError::Credential(_) => {
            error!("Gate operation failed: {:?}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            );
        }
    };
    (status, e.to_string())
}

/// Builds the full router: public auth routes, protected analysis routes and the Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/plans", get(rest::list_plans_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/usage", get(rest::usage_handler))
        .route(
            "/analyses",
            post(rest::create_analysis_handler).get(rest::list_analyses_handler),
        )
        .route("/checkout", post(rest::checkout_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
