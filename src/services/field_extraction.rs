use anyhow::{Context, Result};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::core::config::Settings;

const FIELD_EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract data from internship evaluation reports.
The user sends the OCR text of one report. The first page carries the student's full name,
student code, major and internship position. The last page carries strengths, weaknesses,
proposals, the attitude score, the work score and the final assessment.

Return ONLY one JSON object with exactly these keys and no commentary:
{
  "full_name": "",
  "student_code": "",
  "major": "",
  "position": "",
  "strengths": "",
  "weaknesses": "",
  "proposal": "",
  "attitude_score": "",
  "work_score": "",
  "final_assessment": ""
}
Copy values verbatim from the document. Use an empty string when a value is not present.
"#;

/// OCR text beyond this many characters is not sent to the model.
const MAX_DOCUMENT_CHARS: usize = 60_000;
const MAX_ATTEMPTS: u32 = 3;
const ERROR_BODY_PREVIEW_CHARS: usize = 500;

/// Loosely typed model output; normalization happens in `extraction`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawReportFields {
    pub(crate) full_name: Option<Value>,
    pub(crate) student_code: Option<Value>,
    pub(crate) major: Option<Value>,
    pub(crate) position: Option<Value>,
    pub(crate) strengths: Option<Value>,
    pub(crate) weaknesses: Option<Value>,
    pub(crate) proposal: Option<Value>,
    pub(crate) attitude_score: Option<Value>,
    pub(crate) work_score: Option<Value>,
    pub(crate) final_assessment: Option<Value>,
}

#[derive(Debug, Clone)]
pub(crate) struct FieldExtractionService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl FieldExtractionService {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.ai().ai_request_timeout);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().openai_api_key.clone(),
            base_url: settings.ai().openai_base_url.trim_end_matches('/').to_string(),
            model: settings.ai().ai_model.clone(),
            max_tokens: settings.ai().ai_max_tokens,
        })
    }

    pub(crate) async fn read_fields(&self, filename: &str, document_text: &str) -> Result<RawReportFields> {
        let timer = Instant::now();
        let document: String = document_text.chars().take(MAX_DOCUMENT_CHARS).collect();

        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": FIELD_EXTRACTION_SYSTEM_PROMPT},
                {"role": "user", "content": document}
            ],
            "max_completion_tokens": self.max_tokens,
            "temperature": 0,
            "response_format": {"type": "json_object"}
        });

        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error = None;
        let mut body = Value::Null;

        for attempt in 0..MAX_ATTEMPTS {
            let response =
                self.client.post(&url).bearer_auth(&self.api_key).json(&payload).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    match resp.text().await {
                        Ok(raw_body) if status.is_success() => {
                            match serde_json::from_str::<Value>(&raw_body) {
                                Ok(parsed) => {
                                    body = parsed;
                                    last_error = None;
                                    break;
                                }
                                Err(err) => {
                                    last_error = Some(anyhow::anyhow!(
                                        "Chat completion returned non-JSON body: {err}"
                                    ));
                                }
                            }
                        }
                        Ok(raw_body) => last_error = Some(completion_error(status, &raw_body)),
                        Err(err) => {
                            last_error = Some(
                                anyhow::anyhow!(err).context("Failed to read chat completion response"),
                            );
                        }
                    }
                }
                Err(err) => {
                    last_error = Some(anyhow::anyhow!(err).context("Failed to call chat completions"));
                }
            }

            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt))).await;
            }
        }

        if let Some(err) = last_error {
            return Err(err);
        }

        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .context("Missing chat completion content")?;

        let fields = parse_fields(content)?;
        let tokens_used = total_tokens(&body);

        tracing::info!(
            filename,
            duration_seconds = timer.elapsed().as_secs_f64(),
            tokens_used,
            "Report fields extracted"
        );

        Ok(fields)
    }
}

fn total_tokens(body: &Value) -> Option<u64> {
    body.get("usage").and_then(|usage| usage.get("total_tokens")).and_then(Value::as_u64)
}

/// Error for a non-success reply; keeps the provider's message, or the start of a non-JSON body.
fn completion_error(status: StatusCode, raw_body: &str) -> anyhow::Error {
    let detail = serde_json::from_str::<Value>(raw_body)
        .ok()
        .and_then(|body| {
            body.get("error")
                .and_then(|error| error.get("message").or(Some(error)))
                .map(|message| {
                    message.as_str().map(ToString::to_string).unwrap_or_else(|| message.to_string())
                })
        })
        .unwrap_or_else(|| raw_body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect());

    anyhow::anyhow!("Chat completion error ({status}): {detail}")
}

/// Parses the first `{...}` block of a model reply, tolerating code fences and prose.
pub(crate) fn parse_fields(content: &str) -> Result<RawReportFields> {
    static JSON_BLOCK: OnceLock<Regex> = OnceLock::new();
    let pattern = JSON_BLOCK.get_or_init(|| Regex::new(r"\{[\s\S]*\}").expect("static regex"));

    let block = pattern.find(content).context("Model reply contains no JSON object")?;
    serde_json::from_str(block.as_str()).context("Failed to parse extracted fields JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fields_reads_fenced_json() {
        let reply = "```json\n{\"full_name\": \"Nguyen Van A\", \"attitude_score\": 8.5}\n```";
        let fields = parse_fields(reply).expect("fields");
        assert_eq!(fields.full_name, Some(Value::String("Nguyen Van A".to_string())));
        assert_eq!(fields.attitude_score, Some(json!(8.5)));
        assert!(fields.student_code.is_none());
    }

    #[test]
    fn parse_fields_rejects_reply_without_object() {
        assert!(parse_fields("I could not read the document.").is_err());
    }

    #[test]
    fn html_error_reply_is_kept_in_the_error() {
        let err = completion_error(StatusCode::BAD_GATEWAY, "<html><h1>502 Bad Gateway</h1></html>");
        let message = err.to_string();
        assert!(message.contains("502"));
        assert!(message.contains("<h1>502 Bad Gateway</h1>"));
        assert!(!message.contains("null"));
    }

    #[test]
    fn json_error_reply_keeps_provider_message() {
        let body = r#"{"error": {"message": "Rate limit reached", "type": "requests"}}"#;
        let message = completion_error(StatusCode::TOO_MANY_REQUESTS, body).to_string();
        assert!(message.ends_with("Rate limit reached"), "{message}");
    }

    #[test]
    fn long_error_body_is_truncated() {
        let body = "x".repeat(10_000);
        let message = completion_error(StatusCode::INTERNAL_SERVER_ERROR, &body).to_string();
        assert!(message.len() < 600);
    }

    #[test]
    fn total_tokens_reads_usage_block() {
        assert_eq!(total_tokens(&json!({ "usage": { "total_tokens": 1234 } })), Some(1234));
        assert_eq!(total_tokens(&json!({ "choices": [] })), None);
    }

    #[test]
    fn parse_fields_ignores_unknown_keys() {
        let fields = parse_fields("{\"student_code\": \"PH12345\", \"extra\": 1}").expect("fields");
        assert_eq!(fields.student_code, Some(json!("PH12345")));
    }
}
