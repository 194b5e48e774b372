use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::ReportStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: i64,
    pub(crate) code: String,
    pub(crate) name: String,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) is_delete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Report {
    pub(crate) id: i64,
    pub(crate) name: String,
    pub(crate) student_code: String,
    pub(crate) major: Option<String>,
    pub(crate) position: Option<String>,
    pub(crate) strengths: Option<String>,
    pub(crate) weaknesses: Option<String>,
    pub(crate) proposal: Option<String>,
    pub(crate) attitude_score: Option<f64>,
    pub(crate) work_score: Option<f64>,
    pub(crate) note: Option<String>,
    pub(crate) status: ReportStatus,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) created_by: Option<String>,
    pub(crate) exam_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ReportFile {
    pub(crate) id: i64,
    pub(crate) name_file: String,
    pub(crate) path_storage: String,
    pub(crate) size_bytes: i64,
    pub(crate) sha256: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) report_id: i64,
}
