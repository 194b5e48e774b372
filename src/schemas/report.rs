use serde::Serialize;

/// Outcome of one upload batch.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct BatchSummary {
    pub(crate) message: String,
    pub(crate) zip_file: Option<String>,
    pub(crate) records_created: usize,
    pub(crate) comparisons: usize,
    pub(crate) flagged_pairs: Vec<FlaggedPair>,
    pub(crate) failures: Vec<FileFailure>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) struct FlaggedPair {
    pub(crate) file_1: String,
    pub(crate) file_2: String,
    /// Similarity with four decimal digits, e.g. `"0.9132"`.
    pub(crate) score: String,
    pub(crate) id_1: i64,
    pub(crate) id_2: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub(crate) struct FileFailure {
    pub(crate) filename: String,
    pub(crate) reason: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadReportsResponse {
    pub(crate) success: bool,
    pub(crate) status: u16,
    pub(crate) data: BatchSummary,
}

impl UploadReportsResponse {
    pub(crate) fn ok(data: BatchSummary) -> Self {
        Self { success: true, status: 200, data }
    }
}
