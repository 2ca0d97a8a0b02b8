//! Prometheus scrape endpoint on the API listener.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

/// Render the installed Prometheus recorder in text exposition format.
///
/// # Errors
///
/// 503 when no recorder is installed on this instance.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn render(State(state): State<AppState>) -> Result<Response, AppError> {
    let handle = state
        .metrics
        .as_ref()
        .ok_or_else(|| AppError::unavailable("Metrics recorder not installed"))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response())
}
