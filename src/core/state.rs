use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::report_batch::ReportBatchPipeline;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    pipeline: ReportBatchPipeline,
}

impl AppState {
    pub(crate) fn new(settings: Settings, db: PgPool, pipeline: ReportBatchPipeline) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, pipeline }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn pipeline(&self) -> &ReportBatchPipeline {
        &self.inner.pipeline
    }
}
