use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{ExamStatus, SheetStatus};
use crate::services::evaluation::{EvaluationResult, ExamConfig};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) question_count: i32,
    pub(crate) config: Json<ExamConfig>,
    pub(crate) status: ExamStatus,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) activated_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Sheet {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_name: String,
    pub(crate) student_id: Option<String>,
    pub(crate) filename: String,
    pub(crate) file_path: String,
    pub(crate) file_size: i64,
    pub(crate) file_hash: String,
    pub(crate) mime_type: String,
    pub(crate) status: SheetStatus,
    pub(crate) detected_responses: Option<Json<Vec<String>>>,
    pub(crate) detection_confidences: Option<Json<Vec<f64>>>,
    pub(crate) detection_model: Option<String>,
    pub(crate) evaluation: Option<Json<EvaluationResult>>,
    pub(crate) total_score: Option<i32>,
    pub(crate) percentage: Option<f64>,
    pub(crate) error: Option<String>,
    pub(crate) retry_count: i32,
    pub(crate) uploaded_at: PrimitiveDateTime,
    pub(crate) processing_started_at: Option<PrimitiveDateTime>,
    pub(crate) processed_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}
