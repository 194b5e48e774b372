use std::fmt;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::core::config::Settings;
use crate::services::datalab_ocr::DatalabOcrService;
use crate::services::field_extraction::{FieldExtractionService, RawReportFields};

/// Outcome of extracting one field.
///
/// `NotChecked` means extraction never reached the field; `NotFound` means it was looked
/// for and is explicitly unknown. Persistence treats the two differently.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum FieldValue<T> {
    #[default]
    NotChecked,
    NotFound,
    Found(T),
}

impl<T> FieldValue<T> {
    pub(crate) fn found(&self) -> Option<&T> {
        match self {
            Self::Found(value) => Some(value),
            _ => None,
        }
    }
}

/// A report score: the first one- or two-digit decimal found in the source text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Score(f64);

impl Score {
    pub(crate) fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ExtractedFields {
    pub(crate) full_name: FieldValue<String>,
    pub(crate) student_code: FieldValue<String>,
    pub(crate) major: FieldValue<String>,
    pub(crate) position: FieldValue<String>,
    pub(crate) strengths: FieldValue<String>,
    pub(crate) weaknesses: FieldValue<String>,
    pub(crate) proposal: FieldValue<String>,
    pub(crate) attitude_score: FieldValue<Score>,
    pub(crate) work_score: FieldValue<Score>,
    pub(crate) final_assessment: FieldValue<String>,
    /// Full document text, the input to similarity scoring.
    pub(crate) raw_text: String,
}

impl ExtractedFields {
    /// Combines OCR text with the structured pass; `raw` is `None` when that pass failed.
    pub(crate) fn assemble(raw: Option<RawReportFields>, raw_text: String) -> Self {
        let student_code = resolve_student_code(
            raw.as_ref().and_then(|fields| fields.student_code.as_ref()),
            &raw_text,
        );

        let Some(raw) = raw else {
            return Self { student_code, raw_text, ..Self::default() };
        };

        Self {
            full_name: normalize_text(raw.full_name.as_ref()),
            student_code,
            major: normalize_text(raw.major.as_ref()),
            position: normalize_text(raw.position.as_ref()),
            strengths: normalize_text(raw.strengths.as_ref()),
            weaknesses: normalize_text(raw.weaknesses.as_ref()),
            proposal: normalize_text(raw.proposal.as_ref()),
            attitude_score: normalize_score(raw.attitude_score.as_ref()),
            work_score: normalize_score(raw.work_score.as_ref()),
            final_assessment: normalize_text(raw.final_assessment.as_ref()),
            raw_text,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum ExtractionError {
    #[error("document is empty")]
    EmptyDocument,
    #[error("ocr failed: {0:#}")]
    Ocr(anyhow::Error),
    #[error("ocr returned no text")]
    NoText,
}

#[async_trait]
pub(crate) trait ReportExtractor: Send + Sync {
    async fn extract(&self, filename: &str, bytes: &[u8]) -> Result<ExtractedFields, ExtractionError>;
}

/// OCR through DataLab, then a chat-completion pass that reads the report fields.
#[derive(Debug, Clone)]
pub(crate) struct DocumentExtractor {
    ocr: DatalabOcrService,
    fields: FieldExtractionService,
}

impl DocumentExtractor {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            ocr: DatalabOcrService::from_settings(settings)?,
            fields: FieldExtractionService::from_settings(settings)?,
        })
    }
}

#[async_trait]
impl ReportExtractor for DocumentExtractor {
    async fn extract(&self, filename: &str, bytes: &[u8]) -> Result<ExtractedFields, ExtractionError> {
        if bytes.is_empty() {
            return Err(ExtractionError::EmptyDocument);
        }

        let document =
            self.ocr.convert_document(filename, bytes).await.map_err(ExtractionError::Ocr)?;
        if document.markdown.trim().is_empty() {
            return Err(ExtractionError::NoText);
        }

        tracing::debug!(filename, page_count = ?document.page_count, "OCR finished");

        let raw = match self.fields.read_fields(filename, &document.markdown).await {
            Ok(raw) => Some(raw),
            Err(err) => {
                tracing::warn!(filename, error = %err, "Structured field pass failed; keeping OCR text");
                None
            }
        };

        Ok(ExtractedFields::assemble(raw, document.markdown))
    }
}

fn strict_code_exact() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^PH\d{5}$").expect("static regex"))
}

fn strict_code_search() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\bPH\d{5}\b").expect("static regex"))
}

fn loose_code_search() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\bPH\d{4,6}\b").expect("static regex"))
}

fn score_token() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d{1,2}(?:[.,]\d+)?)").expect("static regex"))
}

/// Validates the model's student code; on failure falls back to scanning the OCR text,
/// strict pattern first, then the loose one.
pub(crate) fn resolve_student_code(candidate: Option<&Value>, document_text: &str) -> FieldValue<String> {
    if let Some(code) = value_text(candidate) {
        let code = code.trim();
        if strict_code_exact().is_match(code) {
            return FieldValue::Found(code.to_ascii_uppercase());
        }
    }

    strict_code_search()
        .find(document_text)
        .or_else(|| loose_code_search().find(document_text))
        .map(|found| FieldValue::Found(found.as_str().to_ascii_uppercase()))
        .unwrap_or(FieldValue::NotFound)
}

pub(crate) fn normalize_score(value: Option<&Value>) -> FieldValue<Score> {
    let Some(text) = value_text(value) else {
        return FieldValue::NotFound;
    };

    score_token()
        .captures(&text)
        .and_then(|captures| captures.get(1))
        .and_then(|token| token.as_str().replace(',', ".").parse::<f64>().ok())
        .map(|parsed| FieldValue::Found(Score(parsed)))
        .unwrap_or(FieldValue::NotFound)
}

pub(crate) fn normalize_text(value: Option<&Value>) -> FieldValue<String> {
    match value_text(value) {
        Some(text) if !text.trim().is_empty() => FieldValue::Found(text.trim().to_string()),
        _ => FieldValue::NotFound,
    }
}

fn value_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(|item| value_text(Some(item))).collect();
            Some(parts.join("\n"))
        }
        other @ Value::Object(_) => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn score_with_decimal_comma_normalizes_to_dot() {
        let score = normalize_score(Some(&json!("8,5/10")));
        assert_eq!(score, FieldValue::Found(Score(8.5)));
        assert_eq!(score.found().map(ToString::to_string).as_deref(), Some("8.5"));
    }

    #[test]
    fn score_without_number_is_not_found() {
        assert_eq!(normalize_score(Some(&json!("N/A"))), FieldValue::NotFound);
        assert_eq!(normalize_score(Some(&json!(""))), FieldValue::NotFound);
        assert_eq!(normalize_score(None), FieldValue::NotFound);
    }

    #[test]
    fn numeric_json_score_is_accepted() {
        assert_eq!(normalize_score(Some(&json!(9))), FieldValue::Found(Score(9.0)));
        assert_eq!(normalize_score(Some(&json!("Điểm: 7.25 / 10"))), FieldValue::Found(Score(7.25)));
    }

    #[test]
    fn blank_text_is_not_found() {
        assert_eq!(normalize_text(Some(&json!("   "))), FieldValue::NotFound);
        assert_eq!(normalize_text(Some(&Value::Null)), FieldValue::NotFound);
        assert_eq!(
            normalize_text(Some(&json!(" Software Engineering "))),
            FieldValue::Found("Software Engineering".to_string())
        );
    }

    #[test]
    fn list_text_is_joined_by_lines() {
        assert_eq!(
            normalize_text(Some(&json!(["punctual", "proactive"]))),
            FieldValue::Found("punctual\nproactive".to_string())
        );
    }

    #[test]
    fn valid_student_code_is_kept_without_fallback() {
        let code = resolve_student_code(Some(&json!("ph12345")), "PH99999 appears in text");
        assert_eq!(code, FieldValue::Found("PH12345".to_string()));
    }

    #[test]
    fn invalid_student_code_recovers_from_text() {
        let text = "Student: Tran Thi B\nCode: PH54321\nMajor: IT";
        let code = resolve_student_code(Some(&json!("P H 5432")), text);
        assert_eq!(code, FieldValue::Found("PH54321".to_string()));
    }

    #[test]
    fn loose_pattern_is_the_last_resort() {
        let code = resolve_student_code(None, "code ph1234 on the cover");
        assert_eq!(code, FieldValue::Found("PH1234".to_string()));
    }

    #[test]
    fn missing_student_code_is_explicit_sentinel() {
        assert_eq!(resolve_student_code(None, "no identifier here"), FieldValue::NotFound);
    }

    #[test]
    fn assemble_without_structured_pass_keeps_text_and_checks_code() {
        let fields = ExtractedFields::assemble(None, "Report of PH11111".to_string());
        assert_eq!(fields.full_name, FieldValue::NotChecked);
        assert_eq!(fields.attitude_score, FieldValue::NotChecked);
        assert_eq!(fields.student_code, FieldValue::Found("PH11111".to_string()));
        assert_eq!(fields.raw_text, "Report of PH11111");
    }

    #[test]
    fn assemble_normalizes_every_field() {
        let raw: RawReportFields = serde_json::from_value(json!({
            "full_name": "Le Van C",
            "student_code": "",
            "major": "Design",
            "attitude_score": "9/10",
            "work_score": "N/A"
        }))
        .expect("raw fields");

        let fields = ExtractedFields::assemble(Some(raw), "nothing to recover".to_string());

        assert_eq!(fields.full_name, FieldValue::Found("Le Van C".to_string()));
        assert_eq!(fields.student_code, FieldValue::NotFound);
        assert_eq!(fields.position, FieldValue::NotFound);
        assert_eq!(fields.attitude_score, FieldValue::Found(Score(9.0)));
        assert_eq!(fields.work_score, FieldValue::NotFound);
    }
}
