use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

/// Directives appended to the configured level so driver chatter stays out of batch logs.
const QUIET_DEPENDENCIES: &[&str] = &["sqlx=warn", "hyper=warn", "reqwest=warn"];

pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = vec![settings.telemetry().log_level.clone()];
        directives.extend(QUIET_DEPENDENCIES.iter().map(|item| item.to_string()));
        EnvFilter::new(directives.join(","))
    });

    let builder = fmt().with_env_filter(filter).with_target(false);

    if settings.telemetry().json {
        builder
            .json()
            .with_span_events(fmt::format::FmtSpan::CLOSE)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    } else {
        builder
            .with_span_events(fmt::format::FmtSpan::CLOSE)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    }

    Ok(())
}
