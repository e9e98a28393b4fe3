use axum::{extract::Extension, Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::domains::jobs::IngestRequest;
use crate::server::app::AppState;

/// Extension ingest endpoint.
///
/// Always answers 200; failures are reported as `{success: false, error}`
/// so the extension can show the message as-is.
pub async fn ingest_handler(
    Extension(state): Extension<AppState>,
    body: Option<Json<IngestRequest>>,
) -> Json<Value> {
    let Some(Json(request)) = body else {
        return Json(json!({ "success": false, "error": "Invalid JSON body in request" }));
    };

    match state.ingest.ingest(request).await {
        Ok(result) => Json(json!({
            "success": true,
            "duplicate": result.duplicate,
            "job": result.job,
        })),
        Err(e) => {
            warn!(error = %e, "Ingest failed");
            Json(json!({ "success": false, "error": format!("{e:#}") }))
        }
    }
}
