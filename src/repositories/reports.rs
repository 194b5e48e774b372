use sqlx::PgExecutor;
use time::PrimitiveDateTime;

use crate::db::models::Report;
use crate::db::types::ReportStatus;

const COLUMNS: &str = "\
    id, name, student_code, major, position, strengths, weaknesses, proposal, \
    attitude_score, work_score, note, status, created_at, created_by, exam_id";

pub(crate) struct CreateReport<'a> {
    pub(crate) name: &'a str,
    pub(crate) student_code: &'a str,
    pub(crate) major: Option<&'a str>,
    pub(crate) position: Option<&'a str>,
    pub(crate) strengths: Option<&'a str>,
    pub(crate) weaknesses: Option<&'a str>,
    pub(crate) proposal: Option<&'a str>,
    pub(crate) attitude_score: Option<f64>,
    pub(crate) work_score: Option<f64>,
    pub(crate) note: Option<&'a str>,
    pub(crate) status: ReportStatus,
    pub(crate) created_by: &'a str,
    pub(crate) exam_id: i64,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) async fn create<'e, E>(executor: E, params: CreateReport<'_>) -> Result<Report, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Report>(&format!(
        "INSERT INTO reports (
            name, student_code, major, position, strengths, weaknesses, proposal,
            attitude_score, work_score, note, status, created_by, exam_id, created_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
         RETURNING {COLUMNS}"
    ))
    .bind(params.name)
    .bind(params.student_code)
    .bind(params.major)
    .bind(params.position)
    .bind(params.strengths)
    .bind(params.weaknesses)
    .bind(params.proposal)
    .bind(params.attitude_score)
    .bind(params.work_score)
    .bind(params.note)
    .bind(params.status)
    .bind(params.created_by)
    .bind(params.exam_id)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

/// Appends `line` to the note on its own line; an empty note becomes `line`.
pub(crate) async fn append_note<'e, E>(executor: E, id: i64, line: &str) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        "UPDATE reports
         SET note = CASE
             WHEN note IS NULL OR note = '' THEN $1
             ELSE note || E'\\n' || $1
         END
         WHERE id = $2",
    )
    .bind(line)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn set_status_for_ids<'e, E>(
    executor: E,
    ids: &[i64],
    status: ReportStatus,
) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    if ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query("UPDATE reports SET status = $1 WHERE id = ANY($2)")
        .bind(status)
        .bind(ids)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
