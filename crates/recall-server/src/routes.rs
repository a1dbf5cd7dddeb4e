// ============================================================================
// HTTP routes: transcript webhook, structured memory ingestion, answer pickup
// ============================================================================

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use recall_core::memory::MemoryRecord;
use recall_core::service::{NO_SESSION_ID, NO_UID};
use recall_core::{RecallError, RecallService};

pub fn router(service: RecallService) -> Router {
    Router::new()
        .route("/", get(capabilities))
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .route("/webhook/setup-status", get(setup_status))
        .route("/webhook/memory", post(ingest_memory))
        .route("/webhook/responses", get(responses))
        .with_state(service)
}

// ============================================================================
// Errors
// ============================================================================

/// Error body `{error}` with a status derived from the failure kind
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<RecallError> for ApiError {
    fn from(err: RecallError) -> Self {
        match err {
            RecallError::Validation(message) => Self::bad_request(&message),
            other => {
                error!("Request failed: {}", other);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: other.to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub segments: Vec<SegmentPayload>,
}

/// One transcript segment; fields other than `text` are ignored
#[derive(Debug, Deserialize)]
pub struct SegmentPayload {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct UidQuery {
    pub uid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

fn required<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(message))
}

// ============================================================================
// Handlers
// ============================================================================

/// Ingest a batch of live transcript segments. Answers that resolved since the
/// previous call for this session ride back as `{message}`.
pub async fn webhook(
    State(service): State<RecallService>,
    Json(request): Json<WebhookRequest>,
) -> Result<Json<Value>, ApiError> {
    let session_id = required(&request.session_id, NO_SESSION_ID)?;

    let texts: Vec<&str> = request.segments.iter().map(|s| s.text.as_str()).collect();
    debug!("[webhook] session {} sent {} segments", session_id, texts.len());

    service.process_segments(session_id, &texts).await?;

    let answers = service.take_responses(session_id).await;
    if answers.is_empty() {
        return Ok(Json(json!({ "status": "success" })));
    }

    info!("[webhook] delivering {} answers to session {}", answers.len(), session_id);
    let message = answers
        .iter()
        .map(|a| a.message.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Json(json!({ "message": message })))
}

/// Drain answers waiting for a session
pub async fn responses(
    State(service): State<RecallService>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<Value>, ApiError> {
    let session_id = required(&query.session_id, NO_SESSION_ID)?;
    let answers = service.take_responses(session_id).await;
    Ok(Json(json!({ "responses": answers })))
}

/// Store a finished conversation's structured record
pub async fn ingest_memory(
    State(service): State<RecallService>,
    Query(query): Query<UidQuery>,
    Json(record): Json<MemoryRecord>,
) -> Result<Json<Value>, ApiError> {
    let uid = required(&query.uid, NO_UID)?;

    let stored = service.ingest_memory_record(uid, &record).await?;
    info!("[memory] stored {} entries for {}", stored, uid);

    Ok(Json(json!({ "status": "success", "stored": stored })))
}

pub async fn setup_status() -> Json<Value> {
    Json(json!({ "is_setup_completed": true }))
}

pub async fn health(State(service): State<RecallService>) -> (StatusCode, Json<Value>) {
    match service.health_check().await {
        Ok(true) => (StatusCode::OK, Json(json!({ "status": "ok", "memory_store": true }))),
        Ok(false) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "memory_store": false })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "memory_store": false, "error": e.to_string() })),
        ),
    }
}

pub async fn capabilities(State(service): State<RecallService>) -> Json<Value> {
    let config = service.config();
    Json(json!({
        "name": "recall",
        "description": "Remembers what you say and answers when you forget something.",
        "trigger_phrases": config.trigger_phrases,
        "question_window_ms": config.question_window.as_millis() as u64,
        "endpoints": {
            "POST /webhook": "Live transcript segments: {session_id, segments: [{text}]}",
            "GET /webhook/responses?session_id=": "Collect recall answers for a session",
            "POST /webhook/memory?uid=": "Store a structured conversation record",
            "GET /webhook/setup-status": "Setup status",
            "GET /health": "Memory store reachability"
        }
    }))
}
