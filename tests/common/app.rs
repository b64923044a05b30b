use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use practice_backend::cache::memory::MemoryCache;
use practice_backend::cache::Cache;
use practice_backend::config::{Config, PracticeEnvConfig, WorkerConfig};
use practice_backend::practice::config::PracticeConfig;
use practice_backend::practice::PracticeEngine;
use practice_backend::routes::build_router;
use practice_backend::state::AppState;
use practice_backend::store::Store;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

impl TestApp {
    pub fn store(&self) -> &Store {
        self.state.store()
    }

    pub fn engine(&self) -> &PracticeEngine {
        self.state.engine()
    }
}

fn test_config(temp_dir: &TempDir) -> Config {
    let sled_path = temp_dir.path().join("practice-test.sled");

    // 直接构造 Config，避免使用 set_var 造成多线程测试环境变量竞态
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: sled_path.to_string_lossy().to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        worker: WorkerConfig {
            is_leader: false,
            enable_cache_cleanup: false,
            enable_profile_warmup: false,
        },
        practice: PracticeEnvConfig {
            cache_enabled: true,
            mixing_enabled: true,
            target_retention: 0.9,
        },
    }
}

async fn spawn_with_cache(cache: Option<Arc<dyn Cache>>) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(&temp_dir);

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let cache_backend: Arc<dyn Cache> = match cache {
        Some(cache) => cache,
        None => store.clone(),
    };
    let engine = Arc::new(PracticeEngine::new(
        PracticeConfig::from_env(&config.practice),
        store.clone(),
        cache_backend,
    ));
    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let state = AppState::new(store, engine, &config, shutdown_tx);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}

/// App whose cache lives in the same sled database as the data.
pub async fn spawn_test_app() -> TestApp {
    spawn_with_cache(None).await
}

/// App backed by an in-process cache the test can inspect or break.
pub async fn spawn_test_app_with_memory_cache(cache: Arc<MemoryCache>) -> TestApp {
    spawn_with_cache(Some(cache as Arc<dyn Cache>)).await
}
