use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::pipeline::{AnalysisPipeline, PipelineState, SaveDisposition};
use crate::day;
use crate::errors::AppError;
use crate::models::food::Food;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StartAnalysisRequest {
    /// JPEG bytes, base64-encoded (standard alphabet, no wrapping).
    pub image_base64: String,
}

#[derive(Deserialize)]
pub struct ProductPayload {
    pub name: String,
    /// Grams.
    pub weight: f64,
}

#[derive(Deserialize)]
pub struct RenamePayload {
    pub name: String,
}

#[derive(Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub state: PipelineState,
    pub food: Option<Food>,
    pub last_error: Option<String>,
    pub meal_id: Option<i64>,
}

impl SessionSnapshot {
    fn from_pipeline(session_id: Uuid, pipeline: &AnalysisPipeline) -> Self {
        Self {
            session_id,
            state: pipeline.state().clone(),
            food: pipeline.food().cloned(),
            last_error: pipeline.last_error().map(str::to_string),
            meal_id: pipeline.saved_meal_id(),
        }
    }
}

#[derive(Serialize)]
pub struct SaveResponse {
    pub meal_id: i64,
}

fn lookup_session(
    state: &AppState,
    id: Uuid,
) -> Result<std::sync::Arc<tokio::sync::Mutex<AnalysisPipeline>>, AppError> {
    state
        .sessions
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("Analysis session {id} not found")))
}

/// POST /api/v1/analysis
/// Decodes the image, opens a session and runs the identification stage.
/// On provider failure the session is discarded and the error returned;
/// the client retries by submitting a new photo.
pub async fn handle_start_analysis(
    State(state): State<AppState>,
    Json(req): Json<StartAnalysisRequest>,
) -> Result<(StatusCode, Json<SessionSnapshot>), AppError> {
    let image = BASE64
        .decode(req.image_base64.trim())
        .map_err(|e| AppError::Validation(format!("image_base64 is not valid base64: {e}")))?;
    if image.is_empty() {
        return Err(AppError::Validation("image payload is empty".to_string()));
    }

    let (id, pipeline) = state.sessions.create();
    let mut guard = pipeline.lock().await;
    match guard.identify(state.analyzer.as_ref(), &image).await {
        Ok(_) => {
            let snapshot = SessionSnapshot::from_pipeline(id, &guard);
            Ok((StatusCode::CREATED, Json(snapshot)))
        }
        Err(e) => {
            drop(guard);
            state.sessions.remove(id);
            Err(e.into())
        }
    }
}

/// GET /api/v1/analysis/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let pipeline = lookup_session(&state, id)?;
    let guard = pipeline.lock().await;
    Ok(Json(SessionSnapshot::from_pipeline(id, &guard)))
}

/// POST /api/v1/analysis/:id/products
pub async fn handle_add_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProductPayload>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let pipeline = lookup_session(&state, id)?;
    let mut guard = pipeline.lock().await;
    guard.add_product(&req.name, req.weight)?;
    Ok(Json(SessionSnapshot::from_pipeline(id, &guard)))
}

/// PUT /api/v1/analysis/:id/products/:index
pub async fn handle_edit_product(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
    Json(req): Json<ProductPayload>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let pipeline = lookup_session(&state, id)?;
    let mut guard = pipeline.lock().await;
    guard.edit_product(index, &req.name, req.weight)?;
    Ok(Json(SessionSnapshot::from_pipeline(id, &guard)))
}

/// DELETE /api/v1/analysis/:id/products/:index
pub async fn handle_remove_product(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let pipeline = lookup_session(&state, id)?;
    let mut guard = pipeline.lock().await;
    guard.remove_product(index)?;
    Ok(Json(SessionSnapshot::from_pipeline(id, &guard)))
}

/// PUT /api/v1/analysis/:id/name
pub async fn handle_rename(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RenamePayload>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let pipeline = lookup_session(&state, id)?;
    let mut guard = pipeline.lock().await;
    guard.rename(&req.name)?;
    Ok(Json(SessionSnapshot::from_pipeline(id, &guard)))
}

/// POST /api/v1/analysis/:id/finalize
/// Runs the nutrition stage over the (possibly edited) product list. On
/// provider failure the session stays editable with all edits intact.
pub async fn handle_finalize(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let pipeline = lookup_session(&state, id)?;
    let mut guard = pipeline.lock().await;
    guard.finalize(state.analyzer.as_ref()).await?;
    Ok(Json(SessionSnapshot::from_pipeline(id, &guard)))
}

/// POST /api/v1/analysis/:id/save
/// Idempotent: repeating the call returns the same meal id and the history
/// gains exactly one row. The session lock is held across the insert so two
/// racing saves cannot both see the `Ready` state.
pub async fn handle_save(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SaveResponse>, AppError> {
    let pipeline = lookup_session(&state, id)?;
    let mut guard = pipeline.lock().await;
    match guard.begin_save(day::now_ms())? {
        SaveDisposition::AlreadySaved(meal_id) => Ok(Json(SaveResponse { meal_id })),
        SaveDisposition::Pending(new_meal) => {
            let meal_id = state.meals.insert(new_meal).await?;
            guard.confirm_saved(meal_id);
            Ok(Json(SaveResponse { meal_id }))
        }
    }
}
