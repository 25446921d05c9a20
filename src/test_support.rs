use std::sync::{Arc, OnceLock};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::{config::Settings, state::AppState};
use crate::services::storage::StorageService;

/// Tests mutate process-wide env vars; serialize everything that does.
pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    dotenvy::dotenv().ok();

    std::env::set_var("GRIDMARK_ENV", "test");
    std::env::set_var("GRIDMARK_STRICT_CONFIG", "0");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::set_var(
        "UPLOAD_DIR",
        std::env::temp_dir().join("gridmark-test-uploads").display().to_string(),
    );
}

/// State with a lazy pool: usable for routes that never touch the database.
pub(crate) async fn build_state(settings: Settings) -> AppState {
    let db = sqlx::PgPool::connect_lazy(&settings.database().database_url()).expect("lazy pool");
    let storage = StorageService::from_settings(&settings).await.expect("storage");
    AppState::new(settings, db, storage)
}
