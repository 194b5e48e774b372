use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "reportstatus", rename_all = "lowercase")]
pub(crate) enum ReportStatus {
    Pending,
    Completed,
    Plagiarized,
}
