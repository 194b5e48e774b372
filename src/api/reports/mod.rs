mod handlers;

use axum::{extract::DefaultBodyLimit, routing::post, Router};

use crate::core::{config::Settings, state::AppState};

const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

pub(crate) fn router(settings: &Settings) -> Router<AppState> {
    let storage = settings.storage();
    let per_file = usize::try_from(storage.max_upload_size_mb * 1024 * 1024).unwrap_or(usize::MAX);
    let body_limit = per_file
        .saturating_mul(storage.max_files_per_batch)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/upload/:exam_id", post(handlers::upload_reports))
        .layer(DefaultBodyLimit::max(body_limit))
}
