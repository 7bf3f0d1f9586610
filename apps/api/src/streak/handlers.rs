use axum::{extract::State, Json};

use crate::day;
use crate::errors::AppError;
use crate::state::AppState;
use crate::streak::{current_status, refresh, StreakStatus};

/// GET /api/v1/streak
/// Read-only: reports the stored streak and today's running total without
/// persisting anything.
pub async fn handle_get_streak(
    State(state): State<AppState>,
) -> Result<Json<StreakStatus>, AppError> {
    let status =
        current_status(&state.meals, &state.settings, state.day_zone, day::now_ms()).await?;
    Ok(Json(status))
}

/// POST /api/v1/streak/refresh
/// The app-activation hook: re-evaluates today (catching up on missed days,
/// e.g. after the app was closed over midnight) and persists any transition.
pub async fn handle_refresh_streak(
    State(state): State<AppState>,
) -> Result<Json<StreakStatus>, AppError> {
    let status = refresh(
        &state.meals,
        &state.settings,
        &state.events,
        state.day_zone,
        day::now_ms(),
    )
    .await?;
    Ok(Json(status))
}
