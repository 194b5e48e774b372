use crate::api::errors::ApiError;
use std::path::Path;

const ALLOWED_PDF_MIME_TYPES: [&str; 2] = ["application/pdf", "application/octet-stream"];

pub(crate) fn validate_pdf_upload(filename: &str, content_type: &str) -> Result<(), ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| ApiError::BadRequest(format!("File '{filename}' must have an extension")))?;

    if extension != "pdf" {
        return Err(ApiError::BadRequest(format!(
            "File '{filename}': extension '{extension}' is not allowed, only PDF reports are accepted"
        )));
    }

    let mime = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if ALLOWED_PDF_MIME_TYPES.contains(&mime.as_str()) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "File '{filename}': MIME type '{mime}' does not match extension '.pdf'"
        )))
    }
}

pub(crate) fn validate_batch_size(count: usize, max_files: usize) -> Result<(), ApiError> {
    if count == 0 {
        return Err(ApiError::BadRequest("At least one report file is required".to_string()));
    }
    if count > max_files {
        return Err(ApiError::BadRequest(format!(
            "Too many files in one batch ({count}), the limit is {max_files}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_with_either_mime_is_accepted() {
        assert!(validate_pdf_upload("report.PDF", "application/pdf").is_ok());
        assert!(validate_pdf_upload("report.pdf", "application/octet-stream").is_ok());
    }

    #[test]
    fn other_extensions_and_mimes_are_rejected() {
        assert!(validate_pdf_upload("report.docx", "application/pdf").is_err());
        assert!(validate_pdf_upload("report", "application/pdf").is_err());
        assert!(validate_pdf_upload("report.pdf", "image/png").is_err());
    }

    #[test]
    fn batch_size_bounds() {
        assert!(validate_batch_size(0, 5).is_err());
        assert!(validate_batch_size(5, 5).is_ok());
        assert!(validate_batch_size(6, 5).is_err());
    }
}
