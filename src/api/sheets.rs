use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::exams::fetch_exam;
use crate::api::pagination::{default_limit, PaginatedResponse};
use crate::api::validation::{sanitized_filename, validate_image_upload};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::SheetStatus;
use crate::repositories;
use crate::schemas::sheet::{SheetDetailResponse, SheetResponse};
use crate::services::{evaluation, storage};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:sheet_id", get(get_sheet).delete(delete_sheet))
        .route("/:sheet_id/image", get(download_sheet_image))
        .route("/:sheet_id/rescore", post(rescore_sheet))
}

#[derive(Debug, Deserialize)]
pub(crate) struct SheetListQuery {
    pub(crate) status: Option<SheetStatus>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
}

pub(in crate::api) async fn upload_sheet(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SheetResponse>), ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;
    if exam.status != crate::db::types::ExamStatus::Active {
        return Err(ApiError::BadRequest("Exam is not accepting sheets".to_string()));
    }

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut student_name: Option<String> = None;
    let mut student_id: Option<String> = None;
    let max_bytes = state.settings().storage().max_upload_size_mb * 1024 * 1024;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                content_type = field.content_type().map(|s| s.to_string());
                let mut bytes = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
                {
                    let next_size = bytes.len() as u64 + chunk.len() as u64;
                    if next_size > max_bytes {
                        return Err(ApiError::BadRequest(format!(
                            "File size exceeds {}MB limit",
                            state.settings().storage().max_upload_size_mb
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                file_bytes = Some(bytes);
            }
            "student_name" => {
                student_name = Some(field.text().await.map_err(|_| {
                    ApiError::BadRequest("Invalid student_name field".to_string())
                })?);
            }
            "student_id" => {
                student_id = Some(field.text().await.map_err(|_| {
                    ApiError::BadRequest("Invalid student_id field".to_string())
                })?);
            }
            _ => {}
        }
    }

    let file_bytes =
        file_bytes.ok_or_else(|| ApiError::BadRequest("File is required".to_string()))?;
    if file_bytes.is_empty() {
        return Err(ApiError::BadRequest("File is empty".to_string()));
    }
    let student_name = student_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::BadRequest("student_name is required".to_string()))?;
    let student_id = student_id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty());
    let filename = sanitized_filename(&filename.unwrap_or_else(|| "sheet.png".to_string()));
    let content_type =
        content_type.unwrap_or_else(|| "application/octet-stream".to_string());

    validate_image_upload(
        &filename,
        &content_type,
        &state.settings().storage().allowed_image_extensions,
    )?;

    let file_hash = storage::file_hash(&file_bytes);
    if let Some(existing) =
        repositories::sheets::find_by_hash(state.db(), &exam_id, &file_hash)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to check for duplicate sheet"))?
    {
        return Err(ApiError::Conflict(format!(
            "This file was already uploaded as sheet {}",
            existing.id
        )));
    }

    let sheet_id = Uuid::new_v4().to_string();
    let key = storage::sheet_key(&exam_id, &sheet_id, &filename);
    let file_size = state
        .storage()
        .save(&key, &file_bytes)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to store sheet image"))?;

    let sheet = repositories::sheets::insert(
        state.db(),
        repositories::sheets::NewSheet {
            id: &sheet_id,
            exam_id: &exam_id,
            student_name: &student_name,
            student_id: student_id.as_deref(),
            filename: &filename,
            file_path: &key,
            file_size,
            file_hash: &file_hash,
            mime_type: &content_type,
        },
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to record sheet"))?;

    tracing::info!(sheet_id = %sheet.id, exam_id = %exam_id, "Sheet uploaded");
    metrics::counter!("sheets_uploaded_total").increment(1);

    Ok((StatusCode::CREATED, Json(SheetResponse::from_model(sheet))))
}

pub(in crate::api) async fn list_exam_sheets(
    Path(exam_id): Path<String>,
    Query(query): Query<SheetListQuery>,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<SheetResponse>>, ApiError> {
    fetch_exam(&state, &exam_id).await?;

    let skip = query.skip.max(0);
    let limit = query.limit.clamp(1, 500);

    let sheets =
        repositories::sheets::list_by_exam(state.db(), &exam_id, query.status, skip, limit)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list sheets"))?;
    let total_count = repositories::sheets::count_by_exam(state.db(), &exam_id, query.status)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count sheets"))?;

    Ok(Json(PaginatedResponse {
        items: sheets.into_iter().map(SheetResponse::from_model).collect(),
        total_count,
        skip,
        limit,
    }))
}

async fn get_sheet(
    Path(sheet_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SheetDetailResponse>, ApiError> {
    let sheet = fetch_sheet(&state, &sheet_id).await?;
    Ok(Json(SheetDetailResponse::from_model(sheet)))
}

async fn download_sheet_image(
    Path(sheet_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let sheet = fetch_sheet(&state, &sheet_id).await?;
    let bytes = state
        .storage()
        .read(&sheet.file_path)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to read sheet image"))?;

    Ok((
        [
            (header::CONTENT_TYPE, sheet.mime_type),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", sheet.filename),
            ),
        ],
        bytes,
    ))
}

/// Recomputes the evaluation from the stored detected tokens when the sheet
/// already went through detection; otherwise the sheet goes back through the
/// full pipeline.
async fn rescore_sheet(
    Path(sheet_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SheetResponse>, ApiError> {
    let sheet = fetch_sheet(&state, &sheet_id).await?;
    if sheet.status == SheetStatus::Processing {
        return Err(ApiError::Conflict("Sheet is currently being scored".to_string()));
    }

    if let Some(responses) = &sheet.detected_responses {
        let exam = fetch_exam(&state, &sheet.exam_id).await?;
        let result = evaluation::evaluate(&responses.0, &exam.config.0)?;

        repositories::sheets::mark_scored(
            state.db(),
            &sheet.id,
            repositories::sheets::ScoredUpdate {
                detected_responses: &responses.0,
                detection_confidences: sheet
                    .detection_confidences
                    .as_ref()
                    .map(|json| json.0.as_slice()),
                detection_model: sheet.detection_model.as_deref(),
                evaluation: &result,
            },
            primitive_now_utc(),
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to persist score"))?;

        tracing::info!(sheet_id = %sheet_id, "Sheet rescored from stored responses");
        let sheet = fetch_sheet(&state, &sheet_id).await?;
        return Ok(Json(SheetResponse::from_model(sheet)));
    }

    let sheet = repositories::sheets::requeue(state.db(), &sheet_id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to requeue sheet"))?
        .ok_or_else(|| ApiError::NotFound(format!("Sheet {sheet_id} not found")))?;

    tracing::info!(sheet_id = %sheet_id, "Sheet requeued for scoring");
    Ok(Json(SheetResponse::from_model(sheet)))
}

pub(in crate::api) async fn rescore_exam(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    fetch_exam(&state, &exam_id).await?;

    let requeued = repositories::sheets::requeue_by_exam(state.db(), &exam_id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to requeue sheets"))?;

    tracing::info!(exam_id = %exam_id, sheets = requeued.len(), "Exam requeued for scoring");
    Ok(Json(serde_json::json!({ "requeued": requeued.len() })))
}

async fn delete_sheet(
    Path(sheet_id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let sheet = fetch_sheet(&state, &sheet_id).await?;

    repositories::sheets::delete_by_id(state.db(), &sheet.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete sheet"))?;

    if let Err(err) = state.storage().delete(&sheet.file_path).await {
        tracing::warn!(sheet_id = %sheet.id, error = %err, "Failed to remove sheet image");
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_sheet(
    state: &AppState,
    sheet_id: &str,
) -> Result<crate::db::models::Sheet, ApiError> {
    repositories::sheets::find_by_id(state.db(), sheet_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load sheet"))?
        .ok_or_else(|| ApiError::NotFound(format!("Sheet {sheet_id} not found")))
}
