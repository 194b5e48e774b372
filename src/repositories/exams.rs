use sqlx::PgPool;

use crate::db::models::Exam;

pub(crate) const COLUMNS: &str = "id, code, name, start_time, end_time, is_delete";

/// Soft-deleted exams are invisible to every caller.
pub(crate) async fn find_active_by_id(pool: &PgPool, id: i64) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "SELECT {COLUMNS} FROM exams WHERE id = $1 AND is_delete = FALSE"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}
