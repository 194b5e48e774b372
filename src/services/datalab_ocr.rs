use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::core::config::Settings;

const ERROR_BODY_PREVIEW_CHARS: usize = 300;

#[derive(Debug, Clone)]
pub(crate) struct OcrDocument {
    pub(crate) markdown: String,
    pub(crate) page_count: Option<u64>,
}

/// Client for the DataLab marker API: uploads a PDF and polls until markdown is ready.
#[derive(Debug, Clone)]
pub(crate) struct DatalabOcrService {
    client: Client,
    api_key: String,
    base_url: String,
    mode: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
    max_submit_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MarkerJobRef {
    request_id: String,
    request_check_url: String,
}

impl DatalabOcrService {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.datalab().timeout_seconds);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(timeout)
            .build()
            .context("Failed to build DataLab HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.datalab().api_key.clone(),
            base_url: settings.datalab().base_url.trim_end_matches('/').to_string(),
            mode: settings.datalab().mode.clone(),
            poll_interval: Duration::from_secs(settings.datalab().poll_interval_seconds),
            max_poll_attempts: settings.datalab().max_poll_attempts,
            max_submit_retries: settings.datalab().max_submit_retries,
        })
    }

    pub(crate) async fn convert_document(&self, filename: &str, bytes: &[u8]) -> Result<OcrDocument> {
        let job_ref = self.submit_marker_job(filename, bytes).await?;
        tracing::debug!(filename, request_id = %job_ref.request_id, "DataLab marker job submitted");
        self.poll_marker_result(&job_ref).await
    }

    async fn submit_marker_job(&self, filename: &str, bytes: &[u8]) -> Result<MarkerJobRef> {
        let endpoint = format!("{}/marker", self.base_url);

        let mut last_error = None;

        for attempt in 0..=self.max_submit_retries {
            // Multipart forms are consumed by `send`, so each attempt builds its own.
            let file_part = Part::bytes(bytes.to_vec())
                .file_name(filename.to_string())
                .mime_str("application/pdf")
                .context("Failed to build DataLab file part")?;
            let form = Form::new()
                .part("file", file_part)
                .text("mode", self.mode.clone())
                .text("output_format", "markdown");

            let response = self
                .client
                .post(&endpoint)
                .header("X-Api-Key", &self.api_key)
                .multipart(form)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    match resp.text().await {
                        Ok(raw_body) => {
                            match parse_submit_response(&self.base_url, status, &raw_body) {
                                Ok(job_ref) => return Ok(job_ref),
                                Err(err) => last_error = Some(err),
                            }
                        }
                        Err(err) => {
                            last_error = Some(
                                anyhow::anyhow!(err).context("Failed to read DataLab marker response"),
                            );
                        }
                    }
                }
                Err(err) => {
                    last_error =
                        Some(anyhow::anyhow!(err).context("Failed to call DataLab marker API"));
                }
            }

            if attempt < self.max_submit_retries {
                tracing::warn!(filename, attempt, error = ?last_error, "DataLab marker submit failed, retrying");
                let backoff = Duration::from_secs(2_u64.pow(attempt));
                tokio::time::sleep(backoff).await;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown DataLab submit error")))
    }

    /// Polls until the job completes or fails. Transport failures and unreadable or 5xx/429
    /// replies are retried until the attempt budget runs out.
    async fn poll_marker_result(&self, job_ref: &MarkerJobRef) -> Result<OcrDocument> {
        let mut last_error = None;

        for attempt in 0..self.max_poll_attempts {
            let response = self
                .client
                .get(&job_ref.request_check_url)
                .header("X-Api-Key", &self.api_key)
                .send()
                .await;

            let outcome = match response {
                Ok(resp) => {
                    let status = resp.status();
                    match resp.text().await {
                        Ok(raw_body) => classify_poll_response(status, &raw_body)?,
                        Err(err) => PollResponse::Transient(
                            anyhow::anyhow!(err).context("Failed to read DataLab poll response"),
                        ),
                    }
                }
                Err(err) => PollResponse::Transient(
                    anyhow::anyhow!(err).context("Failed to call DataLab marker result endpoint"),
                ),
            };

            match outcome {
                PollResponse::Payload(parsed) => match poll_state(&parsed) {
                    PollState::Complete => {
                        return extract_document(&parsed).with_context(|| {
                            format!("DataLab job {} completed without markdown", job_ref.request_id)
                        });
                    }
                    PollState::Failed => {
                        return Err(anyhow::anyhow!(
                            "DataLab OCR job {} failed: {}",
                            job_ref.request_id,
                            extract_error_message(&parsed)
                        ));
                    }
                    PollState::Pending => last_error = None,
                },
                PollResponse::Transient(err) => {
                    tracing::warn!(
                        request_id = %job_ref.request_id,
                        attempt,
                        error = %err,
                        "DataLab poll failed, retrying"
                    );
                    last_error = Some(err);
                }
            }

            if attempt + 1 >= self.max_poll_attempts {
                break;
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        let timed_out = format!(
            "DataLab OCR polling timed out for request {} after {} attempts",
            job_ref.request_id, self.max_poll_attempts
        );
        Err(match last_error {
            Some(err) => err.context(timed_out),
            None => anyhow::anyhow!(timed_out),
        })
    }
}

fn parse_submit_response(base_url: &str, status: StatusCode, raw_body: &str) -> Result<MarkerJobRef> {
    let parsed = serde_json::from_str::<Value>(raw_body).map_err(|err| {
        anyhow::anyhow!("DataLab marker returned non-JSON body (status {}): {}", status, err)
    })?;

    if !status.is_success() {
        anyhow::bail!(
            "DataLab marker submit failed (status {}): {}",
            status,
            extract_error_message(&parsed)
        );
    }
    if parsed.get("success").and_then(Value::as_bool).is_some_and(|value| !value) {
        anyhow::bail!(
            "DataLab marker submit returned success=false: {}",
            extract_error_message(&parsed)
        );
    }

    extract_marker_job_ref(base_url, &parsed)
        .context("DataLab marker submit response missing request reference")
}

#[derive(Debug)]
enum PollResponse {
    Payload(Value),
    Transient(anyhow::Error),
}

/// Client errors other than 429 are final; everything else unreadable is worth another poll.
fn classify_poll_response(status: StatusCode, raw_body: &str) -> Result<PollResponse> {
    let parsed = serde_json::from_str::<Value>(raw_body);

    if status.is_success() {
        return Ok(match parsed {
            Ok(payload) => PollResponse::Payload(payload),
            Err(err) => PollResponse::Transient(anyhow::anyhow!(
                "DataLab poll returned non-JSON body (status {}): {}",
                status,
                err
            )),
        });
    }

    let detail = parsed.map(|payload| extract_error_message(&payload)).unwrap_or_else(|_| {
        raw_body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect()
    });
    let err = anyhow::anyhow!("DataLab poll failed (status {}): {}", status, detail);

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Ok(PollResponse::Transient(err))
    } else {
        Err(err)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PollState {
    Pending,
    Complete,
    Failed,
}

fn poll_state(payload: &Value) -> PollState {
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();

    match status.as_str() {
        "complete" | "completed" => PollState::Complete,
        "failed" | "error" => PollState::Failed,
        _ if payload.get("success").and_then(Value::as_bool) == Some(false) => PollState::Failed,
        _ => PollState::Pending,
    }
}

fn extract_marker_job_ref(base_url: &str, payload: &Value) -> Option<MarkerJobRef> {
    let request_check_url = extract_request_check_url(base_url, payload);
    let request_id = payload
        .get("request_id")
        .or_else(|| payload.get("request_check_id"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .or_else(|| {
            request_check_url.clone().and_then(|url| {
                url.trim_end_matches('/').rsplit('/').next().map(ToString::to_string)
            })
        })?;

    let request_check_url =
        request_check_url.unwrap_or_else(|| format!("{}/marker/{}", base_url, request_id));

    Some(MarkerJobRef { request_id, request_check_url })
}

fn extract_request_check_url(base_url: &str, payload: &Value) -> Option<String> {
    let raw = payload.get("request_check_url").and_then(Value::as_str)?;
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Some(raw.to_string());
    }
    let normalized_base = format!("{}/", base_url.trim_end_matches('/'));
    reqwest::Url::parse(&normalized_base)
        .ok()
        .and_then(|base| base.join(raw).ok())
        .map(|url| url.to_string())
}

fn extract_document(payload: &Value) -> Option<OcrDocument> {
    let container = payload.get("result").unwrap_or(payload);

    let markdown = container
        .get("markdown")
        .or_else(|| payload.get("markdown"))
        .and_then(Value::as_str)
        .map(ToString::to_string)?;

    let page_count = container
        .get("page_count")
        .or_else(|| payload.get("page_count"))
        .and_then(Value::as_u64);

    Some(OcrDocument { markdown, page_count })
}

fn extract_error_message(payload: &Value) -> String {
    if let Some(detail) = payload.get("detail") {
        if let Some(text) = detail.as_str() {
            return text.to_string();
        }
        if let Some(items) = detail.as_array() {
            let joined = items
                .iter()
                .filter_map(|item| {
                    item.get("msg")
                        .and_then(Value::as_str)
                        .or_else(|| item.get("message").and_then(Value::as_str))
                })
                .collect::<Vec<_>>()
                .join("; ");
            if !joined.is_empty() {
                return joined;
            }
        }
    }

    payload
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| payload.get("error").and_then(Value::as_str))
        .unwrap_or("unknown_error")
        .to_string()
}
