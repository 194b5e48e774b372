use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!(
        "report_batch_files_total",
        "Uploaded report files processed, labelled by extraction outcome"
    );
    metrics::describe_counter!(
        "report_batch_flagged_pairs_total",
        "Report pairs flagged as possible plagiarism"
    );
    metrics::describe_histogram!(
        "report_batch_duration_seconds",
        "Wall time of one upload batch from ingest to archive"
    );
    metrics::describe_counter!(
        "similarity_requests_total",
        "Similarity comparisons, labelled by scoring outcome"
    );
}
