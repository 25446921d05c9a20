use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::Exam;
use crate::db::types::ExamStatus;
use crate::services::evaluation::{ConfigurationError, ExamConfig, SubjectSegment};

#[derive(Debug, Deserialize, Serialize, Validate)]
pub(crate) struct SubjectSegmentCreate {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub(crate) name: String,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(alias = "answerKey")]
    #[validate(length(min = 1, message = "answer_key must not be empty"))]
    pub(crate) answer_key: Vec<String>,
    #[validate(nested)]
    #[validate(length(min = 1, message = "subjects must not be empty"))]
    pub(crate) subjects: Vec<SubjectSegmentCreate>,
    #[serde(default)]
    #[serde(alias = "specialCases")]
    pub(crate) special_cases: BTreeMap<usize, BTreeSet<String>>,
}

impl ExamCreate {
    pub(crate) fn into_config(
        self,
    ) -> Result<(String, Option<String>, ExamConfig), ConfigurationError> {
        let subjects = self
            .subjects
            .into_iter()
            .map(|segment| SubjectSegment {
                name: segment.name,
                start: segment.start,
                end: segment.end,
            })
            .collect();
        let config = ExamConfig::new(self.answer_key, subjects, self.special_cases)?;
        Ok((self.title, self.description, config))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExamStatusUpdate {
    pub(crate) status: ExamStatus,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubjectSegmentResponse {
    pub(crate) name: String,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) question_count: i32,
    pub(crate) status: ExamStatus,
    pub(crate) answer_key: Vec<String>,
    pub(crate) subjects: Vec<SubjectSegmentResponse>,
    pub(crate) special_cases: BTreeMap<usize, BTreeSet<String>>,
    pub(crate) sheet_count: i64,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) activated_at: Option<String>,
}

impl ExamResponse {
    pub(crate) fn from_model(exam: Exam) -> Self {
        let config: ExamConfig = exam.config.0;
        Self {
            id: exam.id,
            title: exam.title,
            description: exam.description,
            question_count: exam.question_count,
            status: exam.status,
            answer_key: config.answer_key,
            subjects: config
                .subjects
                .into_iter()
                .map(|segment| SubjectSegmentResponse {
                    name: segment.name,
                    start: segment.start,
                    end: segment.end,
                })
                .collect(),
            special_cases: config.special_cases,
            sheet_count: 0,
            created_at: format_primitive(exam.created_at),
            updated_at: format_primitive(exam.updated_at),
            activated_at: exam.activated_at.map(format_primitive),
        }
    }
}
