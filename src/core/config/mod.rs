mod parsing;
mod settings;
mod types;

pub(crate) use types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, DetectionSettings, Environment,
    RuntimeSettings, Settings, StorageSettings, TelemetrySettings, WorkerSettings,
};
