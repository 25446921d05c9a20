use super::parsing::{
    env_optional, env_or_default, is_supported_image_extension, parse_bool, parse_cors_origins,
    parse_environment, parse_string_list, parse_u16, parse_u32, parse_u64,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, DetectionSettings, RuntimeSettings,
    ServerHost, ServerPort, ServerSettings, Settings, StorageSettings, TelemetrySettings,
    WorkerSettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("GRIDMARK_HOST", "0.0.0.0");
        let port = env_or_default("GRIDMARK_PORT", "8000");

        let environment =
            parse_environment(env_optional("GRIDMARK_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("GRIDMARK_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Gridmark API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "gridmark");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "gridmark_db");
        let database_url = env_optional("DATABASE_URL");

        let detection_base_url =
            env_or_default("DETECTION_BASE_URL", "http://localhost:8100/api/v1");
        let detection_api_key = env_or_default("DETECTION_API_KEY", "");
        let detection_timeout_seconds = parse_u64(
            "DETECTION_TIMEOUT_SECONDS",
            env_or_default("DETECTION_TIMEOUT_SECONDS", "120"),
        )?;
        let detection_max_submit_retries = parse_u32(
            "DETECTION_MAX_SUBMIT_RETRIES",
            env_or_default("DETECTION_MAX_SUBMIT_RETRIES", "3"),
        )?;

        let upload_dir = env_or_default("UPLOAD_DIR", "uploads");
        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "10"))?;
        let allowed_image_extensions =
            parse_string_list(env_optional("ALLOWED_IMAGE_EXTENSIONS"), &["jpg", "jpeg", "png"]);

        let worker_concurrency =
            parse_u32("WORKER_CONCURRENCY", env_or_default("WORKER_CONCURRENCY", "3"))?;
        let worker_poll_interval_seconds = parse_u64(
            "WORKER_POLL_INTERVAL_SECONDS",
            env_or_default("WORKER_POLL_INTERVAL_SECONDS", "2"),
        )?;
        let stale_processing_minutes = parse_u64(
            "STALE_PROCESSING_MINUTES",
            env_or_default("STALE_PROCESSING_MINUTES", "15"),
        )?;

        let log_level = env_or_default("GRIDMARK_LOG_LEVEL", "info");
        let json = env_optional("GRIDMARK_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
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
            detection: DetectionSettings {
                base_url: detection_base_url,
                api_key: detection_api_key,
                timeout_seconds: detection_timeout_seconds,
                max_submit_retries: detection_max_submit_retries,
            },
            storage: StorageSettings { upload_dir, max_upload_size_mb, allowed_image_extensions },
            worker: WorkerSettings {
                concurrency: worker_concurrency,
                poll_interval_seconds: worker_poll_interval_seconds,
                stale_processing_minutes,
            },
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

    pub(crate) fn detection(&self) -> &DetectionSettings {
        &self.detection
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn worker(&self) -> &WorkerSettings {
        &self.worker
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.allowed_image_extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ALLOWED_IMAGE_EXTENSIONS",
                value: String::from("<empty>"),
            });
        }

        for extension in &self.storage.allowed_image_extensions {
            if !is_supported_image_extension(extension) {
                return Err(ConfigError::InvalidValue {
                    field: "ALLOWED_IMAGE_EXTENSIONS",
                    value: extension.clone(),
                });
            }
        }

        if self.worker.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "WORKER_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        if self.worker.poll_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "WORKER_POLL_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.detection.base_url.is_empty() {
            return Err(ConfigError::MissingSecret("DETECTION_BASE_URL"));
        }
        if self.detection.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("DETECTION_API_KEY"));
        }

        Ok(())
    }
}
