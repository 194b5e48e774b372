use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::core::time::primitive_now_utc;
use crate::db::models::Exam;
use crate::db::types::ReportStatus;
use crate::repositories;
use crate::services::extraction::{ExtractedFields, FieldValue};

pub(crate) const UNKNOWN_STUDENT_CODE: &str = "UNKNOWN";

/// Report row ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NewReport {
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
    pub(crate) created_by: String,
    pub(crate) exam_id: i64,
}

impl NewReport {
    /// Maps extracted fields onto columns: a checked-but-missing text becomes `""`,
    /// an unchecked one stays NULL.
    pub(crate) fn from_fields(
        fields: &ExtractedFields,
        filename: &str,
        created_by: &str,
        exam_id: i64,
    ) -> Self {
        Self {
            name: fields.full_name.found().cloned().unwrap_or_else(|| filename.to_string()),
            student_code: fields
                .student_code
                .found()
                .cloned()
                .unwrap_or_else(|| UNKNOWN_STUDENT_CODE.to_string()),
            major: text_column(&fields.major),
            position: text_column(&fields.position),
            strengths: text_column(&fields.strengths),
            weaknesses: text_column(&fields.weaknesses),
            proposal: text_column(&fields.proposal),
            attitude_score: fields.attitude_score.found().map(|score| score.value()),
            work_score: fields.work_score.found().map(|score| score.value()),
            note: text_column(&fields.final_assessment),
            created_by: created_by.to_string(),
            exam_id,
        }
    }
}

fn text_column(value: &FieldValue<String>) -> Option<String> {
    match value {
        FieldValue::Found(text) => Some(text.clone()),
        FieldValue::NotFound => Some(String::new()),
        FieldValue::NotChecked => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NewReportFile {
    pub(crate) name_file: String,
    pub(crate) path_storage: String,
    pub(crate) size_bytes: i64,
    pub(crate) sha256: String,
}

/// One note line to append to a report that is being marked plagiarized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReportFlag {
    pub(crate) report_id: i64,
    pub(crate) note_line: String,
}

#[async_trait]
pub(crate) trait ReportGateway: Send + Sync {
    async fn find_exam(&self, exam_id: i64) -> Result<Option<Exam>, sqlx::Error>;

    async fn create_report(
        &self,
        report: &NewReport,
        file: Option<&NewReportFile>,
    ) -> Result<i64, sqlx::Error>;

    async fn flag_reports(&self, flags: &[ReportFlag]) -> Result<(), sqlx::Error>;
}

#[derive(Debug, Clone)]
pub(crate) struct PgReportGateway {
    pool: PgPool,
}

impl PgReportGateway {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportGateway for PgReportGateway {
    async fn find_exam(&self, exam_id: i64) -> Result<Option<Exam>, sqlx::Error> {
        repositories::exams::find_active_by_id(&self.pool, exam_id).await
    }

    async fn create_report(
        &self,
        report: &NewReport,
        file: Option<&NewReportFile>,
    ) -> Result<i64, sqlx::Error> {
        let now = primitive_now_utc();
        let mut tx = self.pool.begin().await?;

        let created = repositories::reports::create(
            &mut *tx,
            repositories::reports::CreateReport {
                name: &report.name,
                student_code: &report.student_code,
                major: report.major.as_deref(),
                position: report.position.as_deref(),
                strengths: report.strengths.as_deref(),
                weaknesses: report.weaknesses.as_deref(),
                proposal: report.proposal.as_deref(),
                attitude_score: report.attitude_score,
                work_score: report.work_score,
                note: report.note.as_deref(),
                status: ReportStatus::Completed,
                created_by: &report.created_by,
                exam_id: report.exam_id,
                created_at: now,
            },
        )
        .await?;

        if let Some(file) = file {
            repositories::report_files::create(
                &mut *tx,
                repositories::report_files::CreateReportFile {
                    report_id: created.id,
                    name_file: &file.name_file,
                    path_storage: &file.path_storage,
                    size_bytes: file.size_bytes,
                    sha256: &file.sha256,
                    created_at: now,
                },
            )
            .await?;
        }

        tx.commit().await?;
        Ok(created.id)
    }

    async fn flag_reports(&self, flags: &[ReportFlag]) -> Result<(), sqlx::Error> {
        if flags.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for flag in flags {
            repositories::reports::append_note(&mut *tx, flag.report_id, &flag.note_line).await?;
        }

        let ids: Vec<i64> =
            flags.iter().map(|flag| flag.report_id).collect::<BTreeSet<_>>().into_iter().collect();
        let updated =
            repositories::reports::set_status_for_ids(&mut *tx, &ids, ReportStatus::Plagiarized)
                .await?;
        tx.commit().await?;

        tracing::info!(flagged_reports = updated, "Reports marked as plagiarized");
        Ok(())
    }
}
