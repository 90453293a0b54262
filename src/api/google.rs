use super::{AppError, AppState};
use crate::ads::ClickConversionUpload;
use axum::{extract::State, response::Json, routing::post, Router};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub(super) fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/upload-click-conversions", post(upload_click_conversions))
}

#[derive(Serialize)]
struct UploadResponse {
    ok: bool,
    conversions_sent: usize,
    google_ads_response: Value,
}

/// POST /google/upload-click-conversions
///
/// Forwards pre-shaped click conversions to Google Ads with a managed token.
async fn upload_click_conversions(
    State(state): State<Arc<AppState>>,
    Json(upload): Json<ClickConversionUpload>,
) -> Result<Json<UploadResponse>, AppError> {
    let response = state
        .google_ads
        .upload_click_conversions(&state.tokens, &upload)
        .await?;

    info!(conversions = upload.conversions.len(), "Click conversions uploaded");

    Ok(Json(UploadResponse {
        ok: true,
        conversions_sent: upload.conversions.len(),
        google_ads_response: response,
    }))
}
