//! Database-webhook trigger: `{type, record: {id, normalized_url, ..}}`.

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
struct WebhookRecord {
    id: Uuid,
    normalized_url: String,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    record: WebhookRecord,
}

fn parse_payload(body: Option<Json<Value>>) -> Option<WebhookPayload> {
    let Json(value) = body?;
    let payload: WebhookPayload = serde_json::from_value(value).ok()?;
    (!payload.record.normalized_url.trim().is_empty()).then_some(payload)
}

/// Queue the posted job on the scheduler and acknowledge with `202`.
///
/// Processing happens on the scheduler loop, one job at a time; a job that is
/// already in flight or settled is skipped there by the conditional claim.
pub async fn job_webhook_handler(
    Extension(state): Extension<AppState>,
    body: Option<Json<Value>>,
) -> (StatusCode, Json<Value>) {
    let Some(payload) = parse_payload(body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid payload" })),
        );
    };

    let id = payload.record.id;
    info!(
        job_id = %id,
        url = %payload.record.normalized_url,
        kind = payload.kind.as_deref().unwrap_or("-"),
        "Webhook dispatch"
    );

    match state.dispatcher.dispatch(id) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "success": true, "jobId": id, "status": "queued" })),
        ),
        Err(e) => {
            error!(job_id = %id, error = %e, "Failed to queue webhook job");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}
