//! REST endpoints for the refund acknowledgement flow.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

use super::manager::AckManager;
use crate::error::AckError;

/// Shared state for acknowledgement routes.
#[derive(Clone)]
pub struct AckRouteState {
    pub manager: Arc<AckManager>,
}

/// Build the service router: health check plus acknowledgement API.
pub fn ack_routes(state: AckRouteState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/acknowledgements", get(list_acks).post(acknowledge))
        .route("/api/acknowledgements/upi", post(submit_upi))
        .with_state(state)
        .layer(cors)
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "resolvx"
    }))
}

// ── Request adapter ─────────────────────────────────────────────────

/// Accepted spellings for each request field. Callers send camelCase,
/// PascalCase or snake_case depending on their vintage.
const BOOKING_ID: &[&str] = &["bookingId", "BookingId", "booking_id"];
const CUSTOMER_EMAIL: &[&str] = &["customerEmail", "CustomerEmail", "customer_email"];
const TICKET_REFERENCE: &[&str] = &["ticketReference", "TicketReference", "ticket_reference"];
const UPI_ID: &[&str] = &["upiId", "UpiId", "UPIId", "upi_id"];

/// Canonical request body after key normalization.
#[derive(Debug, Default, PartialEq, Eq)]
struct AckRequest {
    booking_id: String,
    customer_email: String,
    ticket_reference: Option<String>,
    upi_id: Option<String>,
}

impl AckRequest {
    fn from_value(body: &Value) -> Result<Self, String> {
        let obj = body
            .as_object()
            .ok_or_else(|| "request body must be a JSON object".to_string())?;
        let field = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| obj.get(*n))
                .and_then(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
        };
        Ok(Self {
            booking_id: field(BOOKING_ID).ok_or("bookingId is required")?,
            customer_email: field(CUSTOMER_EMAIL).ok_or("customerEmail is required")?,
            ticket_reference: field(TICKET_REFERENCE),
            upi_id: field(UPI_ID),
        })
    }
}

fn parse_body(body: Result<Json<Value>, JsonRejection>) -> Result<AckRequest, Response> {
    let Json(value) = body.map_err(|e| bad_request(e.body_text()))?;
    AckRequest::from_value(&value).map_err(bad_request)
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message.into()})),
    )
        .into_response()
}

fn error_response(err: AckError) -> Response {
    let status = match &err {
        AckError::NotFound { .. } => StatusCode::NOT_FOUND,
        AckError::InvalidState { .. } | AckError::Contended { .. } => StatusCode::CONFLICT,
        AckError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        AckError::Store(e) => {
            error!("Acknowledgement store failure: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

// ── Handlers ────────────────────────────────────────────────────────

/// POST /api/acknowledgements
async fn acknowledge(
    State(state): State<AckRouteState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let req = match parse_body(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match state
        .manager
        .acknowledge(&req.booking_id, &req.customer_email, req.ticket_reference.as_deref())
        .await
    {
        Ok(out) => (StatusCode::OK, Json(out)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/acknowledgements/upi
async fn submit_upi(
    State(state): State<AckRouteState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let req = match parse_body(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let Some(upi_id) = req.upi_id.as_deref() else {
        return bad_request("upiId is required");
    };
    match state
        .manager
        .submit_upi(&req.booking_id, &req.customer_email, upi_id)
        .await
    {
        Ok(out) => (StatusCode::OK, Json(out)).into_response(),
        Err(e) => {
            warn!(booking_id = %req.booking_id, "UPI submission rejected: {e}");
            error_response(e)
        }
    }
}

/// GET /api/acknowledgements
async fn list_acks(State(state): State<AckRouteState>) -> Response {
    match state.manager.list().await {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(e),
    }
}
