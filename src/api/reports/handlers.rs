use axum::{
    extract::{Multipart, Path, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::validation::{validate_batch_size, validate_pdf_upload};
use crate::core::state::AppState;
use crate::schemas::report::UploadReportsResponse;
use crate::services::report_batch::UploadedFile;

const DEFAULT_UPLOADER: &str = "system";
const MAX_UPLOADER_LEN: usize = 100;

pub(super) async fn upload_reports(
    Path(exam_id): Path<i64>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadReportsResponse>, ApiError> {
    let max_files = state.settings().storage().max_files_per_batch;
    let max_upload_size_mb = state.settings().storage().max_upload_size_mb;
    let max_bytes = max_upload_size_mb * 1024 * 1024;

    let mut files: Vec<UploadedFile> = Vec::new();
    let mut uploaded_by: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "files" {
            validate_batch_size(files.len() + 1, max_files)?;

            let filename = field
                .file_name()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ApiError::BadRequest("Each file part needs a filename".to_string()))?;
            let content_type =
                field.content_type().unwrap_or("application/octet-stream").to_string();
            validate_pdf_upload(&filename, &content_type)?;

            let mut bytes = Vec::new();
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|_| ApiError::BadRequest(format!("Failed to read file '{filename}'")))?
            {
                let next_size = bytes.len() as u64 + chunk.len() as u64;
                if next_size > max_bytes {
                    return Err(ApiError::BadRequest(format!(
                        "File '{filename}' exceeds {max_upload_size_mb}MB limit"
                    )));
                }
                bytes.extend_from_slice(&chunk);
            }

            files.push(UploadedFile { filename, bytes });
        } else if name == "uploaded_by" {
            let text = field
                .text()
                .await
                .map_err(|_| ApiError::BadRequest("Invalid uploaded_by value".to_string()))?;
            let text = text.trim();
            if text.chars().count() > MAX_UPLOADER_LEN {
                return Err(ApiError::BadRequest(format!(
                    "uploaded_by must be at most {MAX_UPLOADER_LEN} characters"
                )));
            }
            uploaded_by = Some(text.to_string()).filter(|value| !value.is_empty());
        }
    }

    validate_batch_size(files.len(), max_files)?;
    let uploaded_by = uploaded_by.unwrap_or_else(|| DEFAULT_UPLOADER.to_string());

    tracing::info!(exam_id, files = files.len(), uploaded_by = %uploaded_by, "Report upload received");

    let summary = state.pipeline().run(exam_id, &uploaded_by, files).await?;
    Ok(Json(UploadReportsResponse::ok(summary)))
}
