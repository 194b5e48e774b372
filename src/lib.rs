pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::extraction::DocumentExtractor;
use crate::services::report_batch::ReportBatchPipeline;
use crate::services::report_gateway::PgReportGateway;
use crate::services::similarity::{EmbeddingClient, EmbeddingSimilarity};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let pipeline = build_pipeline(&settings, db_pool.clone()).await?;
    let state = AppState::new(settings, db_pool, pipeline);

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        upload_root = %state.settings().storage().upload_root,
        "Report intake API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    Ok(())
}

async fn build_pipeline(
    settings: &Settings,
    db_pool: sqlx::PgPool,
) -> anyhow::Result<ReportBatchPipeline> {
    let extractor = DocumentExtractor::from_settings(settings)?;
    let embedder = EmbeddingClient::connect(settings).await?;
    let scorer = EmbeddingSimilarity::from_settings(embedder, settings);

    Ok(ReportBatchPipeline::from_settings(
        settings,
        Arc::new(PgReportGateway::new(db_pool)),
        Arc::new(extractor),
        Arc::new(scorer),
    ))
}
