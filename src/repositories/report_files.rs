use sqlx::PgExecutor;
use time::PrimitiveDateTime;

use crate::db::models::ReportFile;

const COLUMNS: &str = "id, name_file, path_storage, size_bytes, sha256, created_at, report_id";

pub(crate) struct CreateReportFile<'a> {
    pub(crate) report_id: i64,
    pub(crate) name_file: &'a str,
    pub(crate) path_storage: &'a str,
    pub(crate) size_bytes: i64,
    pub(crate) sha256: &'a str,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) async fn create<'e, E>(
    executor: E,
    params: CreateReportFile<'_>,
) -> Result<ReportFile, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, ReportFile>(&format!(
        "INSERT INTO report_files (name_file, path_storage, size_bytes, sha256, created_at, report_id)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {COLUMNS}"
    ))
    .bind(params.name_file)
    .bind(params.path_storage)
    .bind(params.size_bytes)
    .bind(params.sha256)
    .bind(params.created_at)
    .bind(params.report_id)
    .fetch_one(executor)
    .await
}
