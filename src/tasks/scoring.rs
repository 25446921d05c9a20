//! Sheet scoring pipeline: claim a pending sheet, run bubble detection on the
//! stored image, evaluate the detected tokens against the exam config, and
//! persist the outcome.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Sheet;
use crate::repositories;
use crate::services::detection::DetectionService;
use crate::services::evaluation;

pub(crate) async fn claim_next_sheet(pool: &PgPool) -> Result<Option<Sheet>> {
    repositories::sheets::claim_next_pending(pool, primitive_now_utc())
        .await
        .context("Failed to claim sheet")
}

pub(crate) async fn process_sheet(
    state: &AppState,
    detection: &DetectionService,
    sheet: &Sheet,
) -> Result<()> {
    let exam = repositories::exams::find_by_id(state.db(), &sheet.exam_id)
        .await
        .context("Failed to load exam")?
        .context("Exam not found")?;
    let config = exam.config.0;

    let bytes = match state.storage().read(&sheet.file_path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return fail_sheet(state.db(), &sheet.id, &format!("Sheet image unavailable: {err}"))
                .await;
        }
    };

    let outcome = match detection
        .detect_sheet(&sheet.filename, &sheet.mime_type, bytes, config.question_count())
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            metrics::counter!("scoring_jobs_total", "status" => "detection_failed").increment(1);
            return fail_sheet(state.db(), &sheet.id, &format!("Detection failed: {err}")).await;
        }
    };

    let result = match evaluation::evaluate(&outcome.responses, &config) {
        Ok(result) => result,
        Err(err) => {
            // A broken config fails every sheet of the exam the same way; the
            // fix is editing the exam, not retrying.
            metrics::counter!("scoring_jobs_total", "status" => "config_error").increment(1);
            return fail_sheet(state.db(), &sheet.id, &format!("Invalid exam config: {err}"))
                .await;
        }
    };

    let now = primitive_now_utc();
    let queue_latency = (now.assume_utc() - sheet.uploaded_at.assume_utc()).as_seconds_f64();

    repositories::sheets::mark_scored(
        state.db(),
        &sheet.id,
        repositories::sheets::ScoredUpdate {
            detected_responses: &outcome.responses,
            detection_confidences: outcome.confidences.as_deref(),
            detection_model: outcome.model.as_deref(),
            evaluation: &result,
        },
        now,
    )
    .await
    .context("Failed to persist score")?;

    metrics::counter!("scoring_jobs_total", "status" => "success").increment(1);
    metrics::histogram!("scoring_queue_latency_seconds").record(queue_latency);
    tracing::info!(
        sheet_id = %sheet.id,
        exam_id = %sheet.exam_id,
        score = result.total_score,
        percentage = result.percentage,
        "Sheet scored"
    );

    Ok(())
}

pub(crate) async fn fail_sheet(pool: &PgPool, sheet_id: &str, error: &str) -> Result<()> {
    repositories::sheets::mark_failed(pool, sheet_id, error, primitive_now_utc())
        .await
        .context("Failed to mark sheet as failed")?;
    tracing::warn!(sheet_id, error, "Sheet scoring failed");
    Ok(())
}

/// Returns sheets stuck in `processing` to the queue. Covers workers that
/// died mid-claim.
pub(crate) async fn release_stale_sheets(pool: &PgPool, stale_minutes: u64) -> Result<Vec<String>> {
    let now = primitive_now_utc();
    let cutoff = now
        .assume_utc()
        .saturating_sub(time::Duration::minutes(stale_minutes as i64));
    let cutoff = time::PrimitiveDateTime::new(cutoff.date(), cutoff.time());

    repositories::sheets::release_stale_processing(pool, cutoff, now)
        .await
        .context("Failed to release stale sheets")
}
