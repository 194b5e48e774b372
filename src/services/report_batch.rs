use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::core::config::Settings;
use crate::core::time::{batch_stamp, primitive_now_utc};
use crate::schemas::report::{BatchSummary, FileFailure, FlaggedPair};
use crate::services::archive::archive_folder;
use crate::services::batch_storage::BatchFolder;
use crate::services::extraction::{ExtractedFields, ReportExtractor};
use crate::services::report_gateway::{NewReport, NewReportFile, ReportFlag, ReportGateway};
use crate::services::similarity::SimilarityScorer;

#[derive(Debug, Error)]
pub(crate) enum BatchError {
    #[error("Exam not found")]
    ExamNotFound,
    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("batch storage error: {0}")]
    Storage(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub(crate) struct UploadedFile {
    pub(crate) filename: String,
    pub(crate) bytes: Vec<u8>,
}

/// A persisted report together with the text it is compared by.
#[derive(Debug)]
struct RecordedReport {
    id: i64,
    filename: String,
    raw_text: String,
}

#[derive(Debug, Clone, PartialEq)]
struct SimilarityPair {
    id_1: i64,
    id_2: i64,
    file_1: String,
    file_2: String,
    score: f64,
}

/// Ingest, extract, persist, compare and archive one upload batch.
pub(crate) struct ReportBatchPipeline {
    gateway: Arc<dyn ReportGateway>,
    extractor: Arc<dyn ReportExtractor>,
    scorer: Arc<dyn SimilarityScorer>,
    upload_root: PathBuf,
    threshold: f64,
}

impl ReportBatchPipeline {
    pub(crate) fn new(
        gateway: Arc<dyn ReportGateway>,
        extractor: Arc<dyn ReportExtractor>,
        scorer: Arc<dyn SimilarityScorer>,
        upload_root: impl Into<PathBuf>,
        threshold: f64,
    ) -> Self {
        Self { gateway, extractor, scorer, upload_root: upload_root.into(), threshold }
    }

    pub(crate) fn from_settings(
        settings: &Settings,
        gateway: Arc<dyn ReportGateway>,
        extractor: Arc<dyn ReportExtractor>,
        scorer: Arc<dyn SimilarityScorer>,
    ) -> Self {
        Self::new(
            gateway,
            extractor,
            scorer,
            &settings.storage().upload_root,
            settings.embedding().similarity_threshold,
        )
    }

    pub(crate) async fn run(
        &self,
        exam_id: i64,
        uploaded_by: &str,
        files: Vec<UploadedFile>,
    ) -> Result<BatchSummary, BatchError> {
        let timer = Instant::now();
        let exam = self.gateway.find_exam(exam_id).await?.ok_or(BatchError::ExamNotFound)?;

        let mut folder =
            BatchFolder::create(&self.upload_root, &exam.code, &batch_stamp(primitive_now_utc()))
                .await?;
        tracing::info!(
            exam_id,
            exam_code = %exam.code,
            folder = %folder.name(),
            files = files.len(),
            "Report batch started"
        );

        let mut failures = Vec::new();
        let mut records = Vec::with_capacity(files.len());

        for file in &files {
            let stored = match folder.write_file(&file.filename, &file.bytes).await {
                Ok(stored) => Some(stored),
                Err(err) => {
                    tracing::warn!(exam_id, filename = %file.filename, error = %err, "Failed to store report file");
                    failures.push(FileFailure {
                        filename: file.filename.clone(),
                        reason: format!("storage failed: {err}"),
                    });
                    None
                }
            };

            let fields = match self.extractor.extract(&file.filename, &file.bytes).await {
                Ok(fields) => {
                    metrics::counter!("report_batch_files_total", "status" => "extracted")
                        .increment(1);
                    fields
                }
                Err(err) => {
                    metrics::counter!("report_batch_files_total", "status" => "failed")
                        .increment(1);
                    tracing::warn!(exam_id, filename = %file.filename, error = %err, "Report extraction failed");
                    failures.push(FileFailure {
                        filename: file.filename.clone(),
                        reason: err.to_string(),
                    });
                    ExtractedFields::default()
                }
            };

            let report = NewReport::from_fields(&fields, &file.filename, uploaded_by, exam.id);
            let report_file = stored.map(|stored| NewReportFile {
                name_file: stored.name,
                path_storage: stored.path.to_string_lossy().into_owned(),
                size_bytes: stored.size_bytes,
                sha256: stored.sha256,
            });

            let report_id = self.gateway.create_report(&report, report_file.as_ref()).await?;
            tracing::info!(
                exam_id,
                report_id,
                filename = %file.filename,
                student_code = %report.student_code,
                "Report recorded"
            );

            records.push(RecordedReport {
                id: report_id,
                filename: file.filename.clone(),
                raw_text: fields.raw_text,
            });
        }

        let (pairs, comparisons) = self.compare_all(&records).await;

        if !pairs.is_empty() {
            self.gateway.flag_reports(&flag_notes(&pairs)).await?;
            metrics::counter!("report_batch_flagged_pairs_total").increment(pairs.len() as u64);
        }

        let zip_file = match archive_folder(folder.path()).await {
            Ok(path) => Some(path.to_string_lossy().into_owned()),
            Err(err) => {
                tracing::error!(exam_id, folder = %folder.name(), error = %err, "Failed to archive batch");
                failures.push(FileFailure {
                    filename: format!("{}.zip", folder.name()),
                    reason: format!("archive failed: {err}"),
                });
                None
            }
        };

        let duration = timer.elapsed().as_secs_f64();
        metrics::histogram!("report_batch_duration_seconds").record(duration);
        tracing::info!(
            exam_id,
            records_created = records.len(),
            comparisons,
            flagged_pairs = pairs.len(),
            failures = failures.len(),
            duration_seconds = duration,
            "Report batch finished"
        );

        Ok(BatchSummary {
            message: format!("Processed {} report(s) for exam {}", records.len(), exam.code),
            zip_file,
            records_created: records.len(),
            comparisons,
            flagged_pairs: pairs.iter().map(flagged_pair).collect(),
            failures,
        })
    }

    /// Scores every unordered pair once, in `(i, j)` loop order with `i < j`.
    async fn compare_all(&self, records: &[RecordedReport]) -> (Vec<SimilarityPair>, usize) {
        let mut pairs = Vec::new();
        let mut comparisons = 0;

        for (i, left) in records.iter().enumerate() {
            for right in &records[i + 1..] {
                let score = self.scorer.similarity(&left.raw_text, &right.raw_text).await;
                comparisons += 1;

                if score >= self.threshold {
                    tracing::info!(
                        report_1 = left.id,
                        report_2 = right.id,
                        score,
                        "Possible plagiarism detected"
                    );
                    pairs.push(SimilarityPair {
                        id_1: left.id,
                        id_2: right.id,
                        file_1: left.filename.clone(),
                        file_2: right.filename.clone(),
                        score,
                    });
                }
            }
        }

        (pairs, comparisons)
    }
}

fn flag_notes(pairs: &[SimilarityPair]) -> Vec<ReportFlag> {
    pairs
        .iter()
        .flat_map(|pair| {
            [
                ReportFlag {
                    report_id: pair.id_1,
                    note_line: plagiarism_note(pair.id_2, &pair.file_2, pair.score),
                },
                ReportFlag {
                    report_id: pair.id_2,
                    note_line: plagiarism_note(pair.id_1, &pair.file_1, pair.score),
                },
            ]
        })
        .collect()
}

fn plagiarism_note(other_id: i64, other_file: &str, score: f64) -> String {
    format!("Possible plagiarism: matches report #{other_id} ({other_file}) with similarity {score:.4}")
}

fn flagged_pair(pair: &SimilarityPair) -> FlaggedPair {
    FlaggedPair {
        file_1: pair.file_1.clone(),
        file_2: pair.file_2.clone(),
        score: format!("{:.4}", pair.score),
        id_1: pair.id_1,
        id_2: pair.id_2,
    }
}
