use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

const MISSING_FIELDS_MESSAGE: &str = "Missing text or mode";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RewriteRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteResponse {
    pub rewritten_text: String,
}

pub fn router() -> Router {
    Router::new()
        .route("/rewrite", post(rewrite))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// POST /rewrite
async fn rewrite(
    payload: Result<Json<RewriteRequest>, JsonRejection>,
) -> Result<Json<RewriteResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("rejected rewrite body: {rejection}");
        ApiError::Validation(MISSING_FIELDS_MESSAGE.to_string())
    })?;

    let text = request.text.filter(|text| !text.is_empty());
    let mode = request.mode.filter(|mode| !mode.is_empty());
    let (Some(text), Some(mode)) = (text, mode) else {
        return Err(ApiError::Validation(MISSING_FIELDS_MESSAGE.to_string()));
    };

    debug!(%mode, chars = text.chars().count(), "rewriting text");
    Ok(Json(RewriteResponse {
        rewritten_text: mock_rewrite(&text, &mode),
    }))
}

/// Canned rewrite per tone; unknown modes echo the input.
pub fn mock_rewrite(text: &str, mode: &str) -> String {
    match mode {
        "clarity" => format!("[Clear] {text} (This has been clarified for better understanding.)"),
        "professional" => {
            format!("Dear colleague, {text} Please let me know if you need any further assistance.")
        }
        "friendly" => format!("Hey! {text} 😊 Hope this helps!"),
        _ => text.to_string(),
    }
}
