use sqlx::types::Json;
use sqlx::PgPool;
use sqlx::{Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Sheet;
use crate::db::types::SheetStatus;
use crate::services::evaluation::EvaluationResult;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_name, student_id, filename, file_path, file_size, file_hash, \
    mime_type, status, detected_responses, detection_confidences, detection_model, \
    evaluation, total_score, percentage, error, retry_count, uploaded_at, \
    processing_started_at, processed_at, created_at, updated_at";

#[derive(Debug)]
pub(crate) struct NewSheet<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) student_name: &'a str,
    pub(crate) student_id: Option<&'a str>,
    pub(crate) filename: &'a str,
    pub(crate) file_path: &'a str,
    pub(crate) file_size: i64,
    pub(crate) file_hash: &'a str,
    pub(crate) mime_type: &'a str,
}

pub(crate) async fn insert(
    pool: &PgPool,
    sheet: NewSheet<'_>,
    now: PrimitiveDateTime,
) -> Result<Sheet, sqlx::Error> {
    sqlx::query_as::<_, Sheet>(&format!(
        "INSERT INTO sheets (id, exam_id, student_name, student_id, filename, file_path, \
         file_size, file_hash, mime_type, status, uploaded_at, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11, $11)
         RETURNING {COLUMNS}"
    ))
    .bind(sheet.id)
    .bind(sheet.exam_id)
    .bind(sheet.student_name)
    .bind(sheet.student_id)
    .bind(sheet.filename)
    .bind(sheet.file_path)
    .bind(sheet.file_size)
    .bind(sheet.file_hash)
    .bind(sheet.mime_type)
    .bind(SheetStatus::Pending)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Sheet>, sqlx::Error> {
    sqlx::query_as::<_, Sheet>(&format!("SELECT {COLUMNS} FROM sheets WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sheets WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn find_by_hash(
    pool: &PgPool,
    exam_id: &str,
    file_hash: &str,
) -> Result<Option<Sheet>, sqlx::Error> {
    sqlx::query_as::<_, Sheet>(&format!(
        "SELECT {COLUMNS} FROM sheets WHERE exam_id = $1 AND file_hash = $2"
    ))
    .bind(exam_id)
    .bind(file_hash)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
    status: Option<SheetStatus>,
    skip: i64,
    limit: i64,
) -> Result<Vec<Sheet>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM sheets WHERE exam_id = "));
    builder.push_bind(exam_id);

    if let Some(status) = status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }

    builder.push(" ORDER BY uploaded_at DESC OFFSET ");
    builder.push_bind(skip);
    builder.push(" LIMIT ");
    builder.push_bind(limit);

    builder.build_query_as::<Sheet>().fetch_all(pool).await
}

pub(crate) async fn count_grouped_by_exam(
    pool: &PgPool,
    exam_ids: &[String],
) -> Result<Vec<(String, i64)>, sqlx::Error> {
    if exam_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, (String, i64)>(
        "SELECT exam_id, COUNT(*) FROM sheets WHERE exam_id = ANY($1) GROUP BY exam_id",
    )
    .bind(exam_ids)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_all_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<Sheet>, sqlx::Error> {
    sqlx::query_as::<_, Sheet>(&format!(
        "SELECT {COLUMNS} FROM sheets WHERE exam_id = $1 ORDER BY uploaded_at"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_by_exam(
    pool: &PgPool,
    exam_id: &str,
    status: Option<SheetStatus>,
) -> Result<i64, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM sheets WHERE exam_id = ");
    builder.push_bind(exam_id);

    if let Some(status) = status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }

    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

/// Atomically claims the oldest pending sheet for one worker. Concurrent
/// workers skip rows already locked by another claim.
pub(crate) async fn claim_next_pending(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<Option<Sheet>, sqlx::Error> {
    sqlx::query_as::<_, Sheet>(&format!(
        "WITH candidate AS (
            SELECT id
            FROM sheets
            WHERE status = $1
            ORDER BY retry_count, uploaded_at
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE sheets
        SET status = $2,
            processing_started_at = $3,
            error = NULL,
            updated_at = $3
        FROM candidate
        WHERE sheets.id = candidate.id
        RETURNING {COLUMNS}"
    ))
    .bind(SheetStatus::Pending)
    .bind(SheetStatus::Processing)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub(crate) struct ScoredUpdate<'a> {
    pub(crate) detected_responses: &'a [String],
    pub(crate) detection_confidences: Option<&'a [f64]>,
    pub(crate) detection_model: Option<&'a str>,
    pub(crate) evaluation: &'a EvaluationResult,
}

pub(crate) async fn mark_scored(
    pool: &PgPool,
    id: &str,
    update: ScoredUpdate<'_>,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE sheets
         SET status = $1,
             detected_responses = $2,
             detection_confidences = $3,
             detection_model = $4,
             evaluation = $5,
             total_score = $6,
             percentage = $7,
             error = NULL,
             processed_at = $8,
             updated_at = $8
         WHERE id = $9",
    )
    .bind(SheetStatus::Scored)
    .bind(Json(update.detected_responses))
    .bind(update.detection_confidences.map(Json))
    .bind(update.detection_model)
    .bind(Json(update.evaluation))
    .bind(update.evaluation.total_score as i32)
    .bind(update.evaluation.percentage)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn mark_failed(
    pool: &PgPool,
    id: &str,
    error: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE sheets
         SET status = $1,
             error = $2,
             retry_count = retry_count + 1,
             processed_at = $3,
             updated_at = $3
         WHERE id = $4",
    )
    .bind(SheetStatus::Failed)
    .bind(error)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Requeues one sheet for scoring, clearing any previous outcome.
pub(crate) async fn requeue(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<Sheet>, sqlx::Error> {
    sqlx::query_as::<_, Sheet>(&format!(
        "UPDATE sheets
         SET status = $1,
             evaluation = NULL,
             total_score = NULL,
             percentage = NULL,
             error = NULL,
             processing_started_at = NULL,
             processed_at = NULL,
             updated_at = $2
         WHERE id = $3
         RETURNING {COLUMNS}"
    ))
    .bind(SheetStatus::Pending)
    .bind(now)
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Requeues every scored or failed sheet of an exam.
pub(crate) async fn requeue_by_exam(
    pool: &PgPool,
    exam_id: &str,
    now: PrimitiveDateTime,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE sheets
         SET status = $1,
             evaluation = NULL,
             total_score = NULL,
             percentage = NULL,
             error = NULL,
             processing_started_at = NULL,
             processed_at = NULL,
             updated_at = $2
         WHERE exam_id = $3 AND status IN ($4, $5)
         RETURNING id",
    )
    .bind(SheetStatus::Pending)
    .bind(now)
    .bind(exam_id)
    .bind(SheetStatus::Scored)
    .bind(SheetStatus::Failed)
    .fetch_all(pool)
    .await
}

/// Returns sheets stuck in processing longer than the cutoff to pending.
pub(crate) async fn release_stale_processing(
    pool: &PgPool,
    cutoff: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE sheets
         SET status = $1,
             processing_started_at = NULL,
             updated_at = $2
         WHERE status = $3 AND processing_started_at < $4
         RETURNING id",
    )
    .bind(SheetStatus::Pending)
    .bind(now)
    .bind(SheetStatus::Processing)
    .bind(cutoff)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_evaluations_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<Json<EvaluationResult>>, sqlx::Error> {
    sqlx::query_scalar::<_, Json<EvaluationResult>>(
        "SELECT evaluation
         FROM sheets
         WHERE exam_id = $1 AND status = $2 AND evaluation IS NOT NULL
         ORDER BY uploaded_at",
    )
    .bind(exam_id)
    .bind(SheetStatus::Scored)
    .fetch_all(pool)
    .await
}
