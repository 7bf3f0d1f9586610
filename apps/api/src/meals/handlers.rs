use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error};

use crate::day;
use crate::errors::AppError;
use crate::meals::store::is_meal_change;
use crate::models::meal::{DayTotals, SavedMealRow};
use crate::state::AppState;

const SSE_KEEPALIVE: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
pub struct DayQuery {
    /// Local calendar day as `YYYY-MM-DD`; omitted means "no day filter"
    /// for listing and "today" for the live view.
    pub date: Option<String>,
}

#[derive(Serialize)]
pub struct MealListResponse {
    pub meals: Vec<SavedMealRow>,
    /// Aggregates over exactly the meals in this response.
    pub totals: DayTotals,
}

fn day_window(state: &AppState, date: &str) -> Result<(i64, i64), AppError> {
    day::parse_local_date(state.day_zone, date).ok_or_else(|| {
        AppError::Validation(format!("invalid date '{date}', expected YYYY-MM-DD"))
    })
}

/// GET /api/v1/meals?date=YYYY-MM-DD
pub async fn handle_list_meals(
    State(state): State<AppState>,
    Query(query): Query<DayQuery>,
) -> Result<Json<MealListResponse>, AppError> {
    let meals = match query.date.as_deref() {
        Some(date) => {
            let (start, end) = day_window(&state, date)?;
            state.meals.list_between(start, end).await?
        }
        None => state.meals.list_all().await?,
    };
    let totals = DayTotals::accumulate(&meals);
    Ok(Json(MealListResponse { meals, totals }))
}

/// GET /api/v1/meals/:id
pub async fn handle_get_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SavedMealRow>, AppError> {
    let meal = state.meals.get_by_id(id).await?;
    meal.map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Meal {id} not found")))
}

/// DELETE /api/v1/meals/:id
/// Deleting a meal that no longer exists is a no-op, not an error.
pub async fn handle_delete_meal(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.meals.delete_by_id(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/meals
pub async fn handle_delete_all_meals(
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    state.meals.delete_all().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/meals/events
/// Raw store change feed as SSE. Best-effort: a subscriber that falls behind
/// the broadcast buffer silently loses old events.
pub async fn handle_meal_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(
        "meal event stream opened ({} subscribers)",
        state.events.subscriber_count() + 1
    );
    let stream = BroadcastStream::new(state.meals.subscribe()).filter_map(|item| async move {
        match item {
            Ok(event) if is_meal_change(&event) => Event::default()
                .event(event.kind())
                .json_data(&event)
                .ok()
                .map(Ok),
            _ => None,
        }
    });
    Sse::new(stream).keep_alive(keep_alive())
}

/// GET /api/v1/meals/live?date=YYYY-MM-DD
/// Live query over the history: an immediate snapshot, then a fresh snapshot
/// whenever a relevant meal changes. Without `date` it watches the full
/// history; with `date`, one local calendar day. Disconnecting cancels the
/// underlying subscription.
pub async fn handle_live_meals(
    State(state): State<AppState>,
    Query(query): Query<DayQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let snapshots = match query.date.as_deref() {
        Some(date) => {
            let (start, end) = day_window(&state, date)?;
            state.meals.watch_between(start, end).boxed()
        }
        None => state.meals.watch_all().boxed(),
    };

    let stream = snapshots.filter_map(|item| async move {
        match item {
            Ok(meals) => {
                let totals = DayTotals::accumulate(&meals);
                Event::default()
                    .event("snapshot")
                    .json_data(&MealListResponse { meals, totals })
                    .ok()
                    .map(Ok)
            }
            Err(e) => {
                error!("live meal query failed: {e}");
                None
            }
        }
    });
    Ok(Sse::new(stream).keep_alive(keep_alive()))
}

fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(SSE_KEEPALIVE).text("keep-alive")
}
