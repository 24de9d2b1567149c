//! Dialogue analysis endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::analysis::AnalysisError;

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
}

/// `POST /analyze`: run one dialogue through the analysis pipeline and
/// return the five-section record.
///
/// The model client is blocking, so the whole analysis runs on the blocking
/// pool. Processing time is the request time in UTC.
pub async fn analyze(
    State(ctx): State<ApiContext>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let analyzer = ctx.analyzer.clone();
    let processed_at = chrono::Utc::now();

    let outcome = tokio::task::spawn_blocking(move || analyzer.analyze(&request.text, processed_at))
        .await
        .map_err(|e| AnalysisError::TaskFailed(e.to_string()))??;

    if outcome.recovered {
        tracing::warn!("Model output unusable, returned fallback record");
    }
    Ok(Json(outcome.record))
}
