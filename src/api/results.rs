use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::api::errors::ApiError;
use crate::api::exams::fetch_exam;
use crate::core::state::AppState;
use crate::db::types::SheetStatus;
use crate::repositories;
use crate::services::statistics::{self, ExamStatistics};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExamResultRow {
    pub(crate) sheet_id: String,
    pub(crate) student_name: String,
    pub(crate) student_id: Option<String>,
    pub(crate) total_score: Option<i32>,
    pub(crate) percentage: Option<f64>,
    pub(crate) status: SheetStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExamResultsResponse {
    pub(crate) exam_id: String,
    pub(crate) title: String,
    pub(crate) results: Vec<ExamResultRow>,
    pub(crate) pending: i64,
    pub(crate) failed: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExamStatisticsResponse {
    pub(crate) exam_id: String,
    pub(crate) title: String,
    #[serde(flatten)]
    pub(crate) statistics: ExamStatistics,
}

/// Scored results for every sheet of an exam, best score first.
pub(in crate::api) async fn list_exam_results(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ExamResultsResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    let sheets = repositories::sheets::list_all_by_exam(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list sheets"))?;

    let mut pending = 0;
    let mut failed = 0;
    let mut results = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        match sheet.status {
            SheetStatus::Pending | SheetStatus::Processing => pending += 1,
            SheetStatus::Failed => failed += 1,
            SheetStatus::Scored => {}
        }
        results.push(ExamResultRow {
            sheet_id: sheet.id,
            student_name: sheet.student_name,
            student_id: sheet.student_id,
            total_score: sheet.total_score,
            percentage: sheet.percentage,
            status: sheet.status,
        });
    }

    results.sort_by(|a, b| {
        b.percentage
            .unwrap_or(-1.0)
            .partial_cmp(&a.percentage.unwrap_or(-1.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(Json(ExamResultsResponse {
        exam_id: exam.id,
        title: exam.title,
        results,
        pending,
        failed,
    }))
}

pub(in crate::api) async fn exam_statistics(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ExamStatisticsResponse>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;

    let evaluations = repositories::sheets::list_evaluations_by_exam(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load evaluations"))?;
    let evaluations: Vec<_> = evaluations.into_iter().map(|json| json.0).collect();

    Ok(Json(ExamStatisticsResponse {
        exam_id: exam.id,
        title: exam.title,
        statistics: statistics::summarize(&evaluations),
    }))
}
