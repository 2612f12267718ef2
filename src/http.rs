//! # HTTP Surface
//!
//! The controller in front of the reconciler: request validation, the
//! `/identify` and `/contacts` endpoints, CORS, and error mapping. Validation
//! failures are rejected here and never reach the core; any core failure maps
//! to one opaque server error so no partial view is ever returned.

use crate::config::defaults::{MAX_PHONE_DIGITS, MIN_PHONE_DIGITS};
use crate::config::ListingConfig;
use crate::listing::{ContactPage, PageRequest};
use crate::model::{ConsolidatedIdentity, ContactId, Observation};
use crate::IdentityEngine;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<IdentityEngine>,
    pub listing: ListingConfig,
}

/// Build the application router.
pub fn router(engine: Arc<IdentityEngine>, listing: ListingConfig) -> Router {
    let state = AppState { engine, listing };
    Router::new()
        .route("/identify", post(identify_handler))
        .route("/contacts", get(list_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(
    engine: Arc<IdentityEngine>,
    listing: ListingConfig,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "identity service listening");
    axum::serve(listener, router(engine, listing).into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactView {
    pub primary_contact_id: ContactId,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<ContactId>,
}

impl From<ConsolidatedIdentity> for ContactView {
    fn from(identity: ConsolidatedIdentity) -> Self {
        Self {
            primary_contact_id: identity.primary_id,
            emails: identity.emails,
            phone_numbers: identity.phones,
            secondary_contact_ids: identity.secondary_ids,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IdentifyResponse {
    pub contact: ContactView,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: "internal server error".to_string(),
        }),
    )
        .into_response()
}

async fn identify_handler(
    State(state): State<AppState>,
    Json(request): Json<IdentifyRequest>,
) -> Response {
    let observation = match validate_identify(&request) {
        Ok(observation) => observation,
        Err(message) => return bad_request(message),
    };

    match state.engine.identify(&observation) {
        Ok(identity) => (
            StatusCode::OK,
            Json(IdentifyResponse {
                contact: identity.into(),
            }),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, observation = %observation, "identify failed");
            internal_error()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
    pub page: Option<u32>,
}

async fn list_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ContactPage>, Response> {
    let limit = params
        .limit
        .unwrap_or(state.listing.default_limit)
        .min(state.listing.max_limit);
    let request = PageRequest::new(limit, params.page.unwrap_or(1));

    match state.engine.list_contacts(&request) {
        Ok(page) => Ok(Json(page)),
        Err(err) => {
            tracing::error!(error = %err, "listing failed");
            Err(internal_error())
        }
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Validate an identify request into an observation.
///
/// At least one field must be present after trimming; a present email must be
/// well formed and a present phone must be 4-15 digits once separators are
/// stripped.
pub fn validate_identify(request: &IdentifyRequest) -> Result<Observation, String> {
    let observation = Observation::new(request.email.clone(), request.phone_number.clone());
    if observation.is_empty() {
        return Err("either email or phoneNumber is required".to_string());
    }
    if let Some(email) = observation.email.as_deref() {
        if !is_valid_email(email) {
            return Err(format!("malformed email: {email}"));
        }
    }
    if let Some(phone) = observation.phone.as_deref() {
        if !is_valid_phone(phone) {
            return Err(format!("malformed phoneNumber: {phone}"));
        }
    }
    Ok(observation)
}

fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    !local.is_empty() && !domain.is_empty() && !domain.contains('@')
}

fn is_valid_phone(phone: &str) -> bool {
    let stripped: String = phone
        .strip_prefix('+')
        .unwrap_or(phone)
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&stripped.len())
        && stripped.chars().all(|c| c.is_ascii_digit())
}
