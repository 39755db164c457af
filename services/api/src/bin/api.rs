//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, OpenAiAnalysisAdapter, PdftoppmRenderer, StripeCheckoutAdapter},
    config::Config,
    error::ApiError,
    web::{self, state::AppState},
};
use ats_gate_core::{gate::AccessGate, ports::PaymentGateway};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!(?config, "Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    // An unreachable store halts startup instead of serving in a degraded state.
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let engine = Arc::new(OpenAiAnalysisAdapter::from_config(&config.engine));
    let renderer = Arc::new(PdftoppmRenderer::new(
        config.pdftoppm_path.clone(),
        config.render_dpi,
    ));
    let payments: Option<Arc<dyn PaymentGateway>> = match &config.payment {
        Some(payment) => Some(Arc::new(StripeCheckoutAdapter::new(
            reqwest::Client::new(),
            payment.clone(),
        ))),
        None => {
            warn!("STRIPE_SECRET_KEY not set; checkout is disabled.");
            None
        }
    };

    // --- 4. Build the Access Gate and the Shared AppState ---
    let gate = AccessGate::new(
        db_adapter.clone(),
        db_adapter.clone(),
        engine,
        renderer,
        config.analysis_quota,
    );
    let app_state = Arc::new(AppState {
        gate,
        identities: db_adapter.clone(),
        sessions: db_adapter,
        payments,
    });

    let cors_origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let app = web::router(app_state).layer(cors);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
