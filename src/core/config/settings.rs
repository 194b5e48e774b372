use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_u16,
    parse_u32, parse_u64, parse_unit_interval, parse_usize,
};
use super::types::{
    AiSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings, DatalabSettings,
    EmbeddingSettings, RuntimeSettings, ServerHost, ServerPort, ServerSettings, Settings,
    StorageSettings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("REPORT_INTAKE_HOST", "0.0.0.0");
        let port = env_or_default("REPORT_INTAKE_PORT", "8000");

        let environment = parse_environment(
            env_optional("REPORT_INTAKE_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("REPORT_INTAKE_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Report Intake API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "report_intake");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "report_intake_db");
        let database_url = env_optional("DATABASE_URL");

        let openai_api_key = env_or_default("OPENAI_API_KEY", "");
        let openai_base_url = env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1");
        let ai_model = env_or_default("AI_MODEL", "gpt-4o-mini");
        let ai_max_tokens = parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "2000"))?;
        let ai_request_timeout =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "120"))?;

        let embedding_model = env_or_default("EMBEDDING_MODEL", "text-embedding-3-small");
        let embedding_cache_capacity = parse_usize(
            "EMBEDDING_CACHE_CAPACITY",
            env_or_default("EMBEDDING_CACHE_CAPACITY", "512"),
        )?;
        let embedding_probe_on_start = env_optional("EMBEDDING_PROBE_ON_START")
            .map(|value| parse_bool(&value))
            .unwrap_or(environment.is_production());
        let similarity_threshold = parse_unit_interval(
            "SIMILARITY_THRESHOLD",
            env_or_default("SIMILARITY_THRESHOLD", "0.80"),
        )?;
        let similarity_min_text_length = parse_usize(
            "SIMILARITY_MIN_TEXT_LENGTH",
            env_or_default("SIMILARITY_MIN_TEXT_LENGTH", "50"),
        )?;
        let embedding_max_input_chars = parse_usize(
            "EMBEDDING_MAX_INPUT_CHARS",
            env_or_default("EMBEDDING_MAX_INPUT_CHARS", "8000"),
        )?;

        let datalab_api_key = env_or_default("DATALAB_API_KEY", "");
        let datalab_base_url = env_or_default("DATALAB_BASE_URL", "https://www.datalab.to/api/v1");
        let datalab_mode = env_or_default("DATALAB_MODE", "accurate").to_ascii_lowercase();
        let datalab_timeout_seconds =
            parse_u64("DATALAB_TIMEOUT_SECONDS", env_or_default("DATALAB_TIMEOUT_SECONDS", "120"))?;
        let datalab_poll_interval_seconds = parse_u64(
            "DATALAB_POLL_INTERVAL_SECONDS",
            env_or_default("DATALAB_POLL_INTERVAL_SECONDS", "2"),
        )?;
        let datalab_max_poll_attempts = parse_u32(
            "DATALAB_MAX_POLL_ATTEMPTS",
            env_or_default("DATALAB_MAX_POLL_ATTEMPTS", "120"),
        )?;
        let datalab_max_submit_retries = parse_u32(
            "DATALAB_MAX_SUBMIT_RETRIES",
            env_or_default("DATALAB_MAX_SUBMIT_RETRIES", "3"),
        )?;

        let upload_root = env_or_default("UPLOAD_ROOT", "uploads/reports");
        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "20"))?;
        let max_files_per_batch =
            parse_usize("MAX_FILES_PER_BATCH", env_or_default("MAX_FILES_PER_BATCH", "50"))?;

        let log_level = env_or_default("REPORT_INTAKE_LOG_LEVEL", "info");
        let json = env_optional("REPORT_INTAKE_LOG_JSON")
            .map(|value| parse_bool(&value))
            .unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            ai: AiSettings {
                openai_api_key,
                openai_base_url,
                ai_model,
                ai_max_tokens,
                ai_request_timeout,
            },
            embedding: EmbeddingSettings {
                model: embedding_model,
                cache_capacity: embedding_cache_capacity,
                probe_on_start: embedding_probe_on_start,
                similarity_threshold,
                min_text_length: similarity_min_text_length,
                max_input_chars: embedding_max_input_chars,
            },
            datalab: DatalabSettings {
                api_key: datalab_api_key,
                base_url: datalab_base_url,
                mode: datalab_mode,
                timeout_seconds: datalab_timeout_seconds,
                poll_interval_seconds: datalab_poll_interval_seconds,
                max_poll_attempts: datalab_max_poll_attempts,
                max_submit_retries: datalab_max_submit_retries,
            },
            storage: StorageSettings { upload_root, max_upload_size_mb, max_files_per_batch },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn embedding(&self) -> &EmbeddingSettings {
        &self.embedding
    }

    pub(crate) fn datalab(&self) -> &DatalabSettings {
        &self.datalab
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.datalab.mode.as_str(), "fast" | "balanced" | "accurate") {
            return Err(ConfigError::InvalidValue {
                field: "DATALAB_MODE",
                value: self.datalab.mode.clone(),
            });
        }

        if self.datalab.poll_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATALAB_POLL_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.datalab.max_poll_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATALAB_MAX_POLL_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if self.embedding.max_input_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EMBEDDING_MAX_INPUT_CHARS",
                value: "0".to_string(),
            });
        }

        if self.storage.max_files_per_batch == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_FILES_PER_BATCH",
                value: "0".to_string(),
            });
        }

        if self.storage.upload_root.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "UPLOAD_ROOT",
                value: self.storage.upload_root.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.ai.openai_api_key.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
        }
        if self.datalab.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("DATALAB_API_KEY"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::core::config::{ConfigError, Settings};
    use crate::test_support;

    #[tokio::test]
    async fn defaults_load_in_test_environment() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");

        assert_eq!(settings.api().api_v1_str, "/api/v1");
        assert_eq!(settings.embedding().similarity_threshold, 0.80);
        assert_eq!(settings.embedding().min_text_length, 50);
        assert_eq!(settings.embedding().max_input_chars, 8000);
        assert_eq!(settings.storage().upload_root, test_support::TEST_UPLOAD_ROOT);
        assert!(!settings.runtime().strict_config);
    }

    #[tokio::test]
    async fn threshold_outside_unit_interval_is_rejected() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("SIMILARITY_THRESHOLD", "1.5");

        let result = Settings::load();
        std::env::remove_var("SIMILARITY_THRESHOLD");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "SIMILARITY_THRESHOLD", .. })
        ));
    }

    #[tokio::test]
    async fn zero_embedding_input_cap_is_rejected() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("EMBEDDING_MAX_INPUT_CHARS", "0");

        let result = Settings::load();
        std::env::remove_var("EMBEDDING_MAX_INPUT_CHARS");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "EMBEDDING_MAX_INPUT_CHARS", .. })
        ));
    }

    #[tokio::test]
    async fn strict_mode_requires_secrets() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("REPORT_INTAKE_STRICT_CONFIG", "1");
        std::env::remove_var("OPENAI_API_KEY");

        let result = Settings::load();
        std::env::set_var("REPORT_INTAKE_STRICT_CONFIG", "0");

        assert!(matches!(result, Err(ConfigError::MissingSecret("OPENAI_API_KEY"))));
    }
}
