use serde::Serialize;

use crate::core::time::format_primitive;
use crate::db::models::Sheet;
use crate::db::types::SheetStatus;
use crate::services::evaluation::EvaluationResult;

#[derive(Debug, Serialize)]
pub(crate) struct SheetResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_name: String,
    pub(crate) student_id: Option<String>,
    pub(crate) filename: String,
    pub(crate) file_size: i64,
    pub(crate) status: SheetStatus,
    pub(crate) total_score: Option<i32>,
    pub(crate) percentage: Option<f64>,
    pub(crate) error: Option<String>,
    pub(crate) uploaded_at: String,
    pub(crate) processed_at: Option<String>,
}

impl SheetResponse {
    pub(crate) fn from_model(sheet: Sheet) -> Self {
        Self {
            id: sheet.id,
            exam_id: sheet.exam_id,
            student_name: sheet.student_name,
            student_id: sheet.student_id,
            filename: sheet.filename,
            file_size: sheet.file_size,
            status: sheet.status,
            total_score: sheet.total_score,
            percentage: sheet.percentage,
            error: sheet.error,
            uploaded_at: format_primitive(sheet.uploaded_at),
            processed_at: sheet.processed_at.map(format_primitive),
        }
    }
}

/// Full sheet detail, including the detected tokens and the stored
/// evaluation payload.
#[derive(Debug, Serialize)]
pub(crate) struct SheetDetailResponse {
    #[serde(flatten)]
    pub(crate) sheet: SheetResponse,
    pub(crate) detected_responses: Option<Vec<String>>,
    pub(crate) detection_confidences: Option<Vec<f64>>,
    pub(crate) detection_model: Option<String>,
    pub(crate) evaluation: Option<EvaluationResult>,
}

impl SheetDetailResponse {
    pub(crate) fn from_model(sheet: Sheet) -> Self {
        let detected_responses = sheet.detected_responses.clone().map(|json| json.0);
        let detection_confidences = sheet.detection_confidences.clone().map(|json| json.0);
        let detection_model = sheet.detection_model.clone();
        let evaluation = sheet.evaluation.clone().map(|json| json.0);
        Self {
            sheet: SheetResponse::from_model(sheet),
            detected_responses,
            detection_confidences,
            detection_model,
            evaluation,
        }
    }
}
