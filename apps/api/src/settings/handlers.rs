use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::error;

use crate::errors::AppError;
use crate::models::settings::UserSettingsRow;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SaveSettingsRequest {
    pub min_calories: f64,
    pub max_calories: f64,
}

/// GET /api/v1/settings
/// 404 until a range has been saved or a streak write created the row.
pub async fn handle_get_settings(
    State(state): State<AppState>,
) -> Result<Json<UserSettingsRow>, AppError> {
    let settings = state.settings.get_once().await?;
    settings
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Settings not configured yet".to_string()))
}

/// PUT /api/v1/settings
pub async fn handle_save_settings(
    State(state): State<AppState>,
    Json(req): Json<SaveSettingsRequest>,
) -> Result<Json<UserSettingsRow>, AppError> {
    let row = state
        .settings
        .save_range(req.min_calories, req.max_calories)
        .await?;
    Ok(Json(row))
}

/// GET /api/v1/settings/live
/// SSE stream of the settings row: current value first, then one event per
/// range or streak change. The payload is `null` while the row is absent.
pub async fn handle_settings_live(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state.settings.watch().filter_map(|item| async move {
        match item {
            Ok(row) => Event::default()
                .event("settings")
                .json_data(&row)
                .ok()
                .map(Ok),
            Err(e) => {
                error!("live settings query failed: {e}");
                None
            }
        }
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}
