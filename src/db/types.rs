use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "examstatus", rename_all = "lowercase")]
pub(crate) enum ExamStatus {
    Draft,
    Active,
    Archived,
}

/// Sheet lifecycle: uploaded sheets wait in `Pending`, a worker claims them
/// into `Processing`, and they end up `Scored` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "sheetstatus", rename_all = "lowercase")]
pub(crate) enum SheetStatus {
    Pending,
    Processing,
    Scored,
    Failed,
}
