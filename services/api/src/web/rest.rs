//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the analysis, usage and billing endpoints
//! and the master definition for the OpenAPI specification.

use ats_gate_core::domain::{
    AnalysisCategory, Plan, RecordedAnalysis, SessionContext, UsageRecord, UsageSummary,
};
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::web::{
    auth::{AuthResponse, LoginRequest, RegisterRequest},
    gate_error_response,
    instructions::instruction_for,
    state::AppState,
};

const EMPTY_CONTEXT_WARNING: &str =
    "No job description was provided; the analysis only considers the résumé.";

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::register_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        usage_handler,
        create_analysis_handler,
        list_analyses_handler,
        list_plans_handler,
        checkout_handler,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            AuthResponse,
            UsageResponse,
            AnalysisResponse,
            UsageRecordResponse,
            PlanResponse,
            CheckoutRequest,
            CheckoutResponse
        )
    ),
    tags(
        (name = "ATS Résumé Analyzer API", description = "Account, quota-gated analysis and checkout endpoints.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UsageResponse {
    pub used: u64,
    pub quota: u32,
    pub remaining: u64,
}

impl From<UsageSummary> for UsageResponse {
    fn from(summary: UsageSummary) -> Self {
        Self {
            used: summary.used,
            quota: summary.quota,
            remaining: summary.remaining,
        }
    }
}

/// The result of one analysis, already recorded against the caller's quota.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AnalysisResponse {
    pub record_id: Uuid,
    pub category: String,
    pub result_text: String,
    pub created_at: DateTime<Utc>,
    pub usage: UsageResponse,
    /// Non-fatal notices about the request, e.g. an empty job description.
    pub warnings: Vec<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UsageRecordResponse {
    pub id: Uuid,
    pub category: String,
    pub context_text: String,
    pub result_text: String,
    pub created_at: DateTime<Utc>,
}

impl From<UsageRecord> for UsageRecordResponse {
    fn from(record: UsageRecord) -> Self {
        Self {
            id: record.id,
            category: record.category.to_string(),
            context_text: record.context_text,
            result_text: record.result_text,
            created_at: record.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PlanResponse {
    pub slug: String,
    pub name: String,
    pub amount_cents: u64,
    pub currency: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// One of the plan slugs listed by `GET /plans`.
    pub plan: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub redirect_url: String,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// How many analyses the caller has used and how many remain.
#[utoipa::path(
    get,
    path = "/usage",
    responses(
        (status = 200, description = "Current usage", body = UsageResponse),
        (status = 401, description = "Not logged in"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn usage_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionContext>,
) -> Result<Json<UsageResponse>, (StatusCode, String)> {
    let summary = state
        .gate
        .usage(session.account.id)
        .await
        .map_err(gate_error_response)?;
    Ok(Json(summary.into()))
}

/// Run one analysis of an uploaded résumé against a job description.
///
/// Accepts a multipart/form-data request with a `category` text part
/// (`evaluation`, `improvement-tips` or `match-percentage`), an optional
/// `context` text part holding the job description, and a `document` PDF part.
#[utoipa::path(
    post,
    path = "/analyses",
    request_body(content_type = "multipart/form-data", description = "Category, job description and résumé PDF."),
    responses(
        (status = 200, description = "Analysis completed and recorded", body = AnalysisResponse),
        (status = 400, description = "Missing document or invalid category"),
        (status = 401, description = "Not logged in"),
        (status = 402, description = "Free quota used up; choose a plan"),
        (status = 422, description = "The document could not be converted"),
        (status = 502, description = "The analysis engine failed")
    )
)]
pub async fn create_analysis_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionContext>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut category: Option<String> = None;
    let mut context_text = String::new();
    let mut document: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let name = field.name().unwrap_or_default().to_string();
        let read_error = |e: axum::extract::multipart::MultipartError| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read field '{}': {}", name, e),
            )
        };
        match name.as_str() {
            "category" => category = Some(field.text().await.map_err(read_error)?),
            "context" => context_text = field.text().await.map_err(read_error)?,
            "document" => document = Some(field.bytes().await.map_err(read_error)?.to_vec()),
            _ => {}
        }
    }

    let category: AnalysisCategory = category
        .ok_or((
            StatusCode::BAD_REQUEST,
            "Multipart form must include a category".to_string(),
        ))?
        .trim()
        .parse()
        .map_err(|e: ats_gate_core::domain::UnknownCategory| {
            (StatusCode::BAD_REQUEST, e.to_string())
        })?;

    let mut warnings = Vec::new();
    if context_text.trim().is_empty() {
        warnings.push(EMPTY_CONTEXT_WARNING.to_string());
    }

    let RecordedAnalysis { record, usage } = state
        .gate
        .run_analysis(
            &session,
            category,
            &context_text,
            document.as_deref(),
            instruction_for(category),
        )
        .await
        .map_err(gate_error_response)?;
    info!(account_id = %session.account.id, %category, used = usage.used, "Analysis served.");

    Ok(Json(AnalysisResponse {
        record_id: record.id,
        category: record.category.to_string(),
        result_text: record.result_text,
        created_at: record.created_at,
        usage: usage.into(),
        warnings,
    }))
}

/// The caller's past analyses, newest first.
#[utoipa::path(
    get,
    path = "/analyses",
    responses(
        (status = 200, description = "Recorded analyses", body = Vec<UsageRecordResponse>),
        (status = 401, description = "Not logged in"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_analyses_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionContext>,
) -> Result<Json<Vec<UsageRecordResponse>>, (StatusCode, String)> {
    let records = state
        .gate
        .history(&session)
        .await
        .map_err(gate_error_response)?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// The paid plans offered once the free quota is used up.
#[utoipa::path(
    get,
    path = "/plans",
    responses(
        (status = 200, description = "Plan catalogue", body = Vec<PlanResponse>)
    )
)]
pub async fn list_plans_handler() -> Json<Vec<PlanResponse>> {
    Json(
        Plan::ALL
            .into_iter()
            .map(|plan| PlanResponse {
                slug: plan.slug().to_string(),
                name: plan.display_name().to_string(),
                amount_cents: plan.amount_cents(),
                currency: Plan::CURRENCY.to_string(),
            })
            .collect(),
    )
}

/// Start a checkout with the payment provider and return where to send the user.
#[utoipa::path(
    post,
    path = "/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checkout started", body = CheckoutResponse),
        (status = 400, description = "Unknown plan"),
        (status = 401, description = "Not logged in"),
        (status = 502, description = "Payment provider error"),
        (status = 503, description = "Payments are not configured")
    )
)]
pub async fn checkout_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionContext>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, (StatusCode, String)> {
    let plan: Plan = req
        .plan
        .parse()
        .map_err(|e: ats_gate_core::domain::UnknownPlan| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let payments = state.payments.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "Payments are not configured".to_string(),
    ))?;

    let checkout = payments
        .start_checkout(plan, &session.account)
        .await
        .map_err(|e| {
            error!("Failed to start checkout: {:?}", e);
            (
                StatusCode::BAD_GATEWAY,
                "Failed to start checkout".to_string(),
            )
        })?;

    Ok(Json(CheckoutResponse {
        session_id: checkout.id,
        redirect_url: checkout.redirect_url,
    }))
}
