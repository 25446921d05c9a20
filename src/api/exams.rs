use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::pagination::{default_limit, PaginatedResponse};
use crate::api::{results, sheets};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::ExamStatus;
use crate::repositories;
use crate::schemas::exam::{ExamCreate, ExamResponse, ExamStatusUpdate};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_exam).get(list_exams))
        .route("/:exam_id", get(get_exam).put(update_exam).delete(delete_exam))
        .route("/:exam_id/status", post(set_exam_status))
        .route("/:exam_id/sheets", post(sheets::upload_sheet).get(sheets::list_exam_sheets))
        .route("/:exam_id/rescore", post(sheets::rescore_exam))
        .route("/:exam_id/results", get(results::list_exam_results))
        .route("/:exam_id/statistics", get(results::exam_statistics))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExamListQuery {
    pub(crate) status: Option<ExamStatus>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
}

async fn create_exam(
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let (title, description, config) = payload.into_config()?;
    let now = primitive_now_utc();
    let id = Uuid::new_v4().to_string();

    let exam =
        repositories::exams::insert(state.db(), &id, &title, description.as_deref(), &config, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to create exam"))?;

    tracing::info!(exam_id = %exam.id, questions = exam.question_count, "Exam created");
    metrics::counter!("exams_created_total").increment(1);

    Ok((StatusCode::CREATED, Json(ExamResponse::from_model(exam))))
}

async fn list_exams(
    State(state): State<AppState>,
    Query(query): Query<ExamListQuery>,
) -> Result<Json<PaginatedResponse<ExamResponse>>, ApiError> {
    let skip = query.skip.max(0);
    let limit = query.limit.clamp(1, 500);

    let exams = repositories::exams::list(state.db(), query.status, skip, limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;
    let total_count = repositories::exams::count(state.db(), query.status)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count exams"))?;

    let exam_ids: Vec<String> = exams.iter().map(|exam| exam.id.clone()).collect();
    let sheet_counts: HashMap<String, i64> =
        repositories::sheets::count_grouped_by_exam(state.db(), &exam_ids)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count sheets"))?
            .into_iter()
            .collect();

    let items = exams
        .into_iter()
        .map(|exam| {
            let count = sheet_counts.get(&exam.id).copied().unwrap_or(0);
            let mut response = ExamResponse::from_model(exam);
            response.sheet_count = count;
            response
        })
        .collect();

    Ok(Json(PaginatedResponse { items, total_count, skip, limit }))
}

async fn get_exam(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;
    let sheet_count = repositories::sheets::count_by_exam(state.db(), &exam_id, None)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count sheets"))?;

    let mut response = ExamResponse::from_model(exam);
    response.sheet_count = sheet_count;
    Ok(Json(response))
}

async fn update_exam(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<Json<ExamResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let (title, description, config) = payload.into_config()?;

    // The key is immutable once sheets can be scored against it.
    let existing = fetch_exam(&state, &exam_id).await?;
    if existing.status != ExamStatus::Draft {
        return Err(ApiError::Conflict("Only draft exams can be edited".to_string()));
    }

    let exam = repositories::exams::update(
        state.db(),
        &exam_id,
        &title,
        description.as_deref(),
        &config,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update exam"))?
    .ok_or_else(|| ApiError::NotFound(format!("Exam {exam_id} not found")))?;

    Ok(Json(ExamResponse::from_model(exam)))
}

async fn set_exam_status(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ExamStatusUpdate>,
) -> Result<Json<ExamResponse>, ApiError> {
    let existing = fetch_exam(&state, &exam_id).await?;
    if existing.status == ExamStatus::Archived && payload.status == ExamStatus::Draft {
        return Err(ApiError::Conflict("Archived exams cannot return to draft".to_string()));
    }

    let exam = repositories::exams::set_status(state.db(), &exam_id, payload.status, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update exam status"))?
        .ok_or_else(|| ApiError::NotFound(format!("Exam {exam_id} not found")))?;
    let sheet_count = repositories::sheets::count_by_exam(state.db(), &exam_id, None)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count sheets"))?;

    let mut response = ExamResponse::from_model(exam);
    response.sheet_count = sheet_count;
    Ok(Json(response))
}

async fn delete_exam(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let scored = repositories::sheets::count_by_exam(
        state.db(),
        &exam_id,
        Some(crate::db::types::SheetStatus::Scored),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to count scored sheets"))?;
    if scored > 0 {
        return Err(ApiError::Conflict(format!(
            "Exam has {scored} scored sheets; delete them first"
        )));
    }

    let deleted = repositories::exams::delete_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete exam"))?;

    if !deleted {
        return Err(ApiError::NotFound(format!("Exam {exam_id} not found")));
    }

    tracing::info!(exam_id = %exam_id, "Exam deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(in crate::api) async fn fetch_exam(
    state: &AppState,
    exam_id: &str,
) -> Result<crate::db::models::Exam, ApiError> {
    repositories::exams::find_by_id(state.db(), exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam"))?
        .ok_or_else(|| ApiError::NotFound(format!("Exam {exam_id} not found")))
}
