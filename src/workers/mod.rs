pub mod cache_cleanup;
pub mod profile_warmup;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::WorkerConfig;
use crate::practice::PracticeEngine;
use crate::store::Store;

/// Timeout for individual worker invocations (5 minutes).
const WORKER_TIMEOUT: Duration = Duration::from_secs(300);

/// Drain period before scheduler shutdown to let in-flight tasks complete.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    CacheCleanup,
    ProfileWarmup,
}

impl WorkerName {
    pub const ALL: [WorkerName; 2] = [WorkerName::CacheCleanup, WorkerName::ProfileWarmup];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CacheCleanup => "cache_cleanup",
            Self::ProfileWarmup => "profile_warmup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: &'static str,
    pub enabled: bool,
}

pub struct WorkerManager {
    store: Arc<Store>,
    engine: Arc<PracticeEngine>,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        engine: Arc<PracticeEngine>,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            engine,
            shutdown_rx,
            config: config.clone(),
        }
    }

    /// Single source of truth for all planned jobs and their cron schedules.
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.is_leader {
            return Vec::new();
        }

        vec![
            JobSpec {
                name: WorkerName::CacheCleanup,
                cron: "0 */10 * * * *",
                enabled: self.config.enable_cache_cleanup,
            },
            JobSpec {
                name: WorkerName::ProfileWarmup,
                cron: "0 15 */4 * * *",
                enabled: self.config.enable_profile_warmup,
            },
        ]
    }

    /// Start the worker scheduler. Returns an error if the scheduler cannot be created or started.
    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.is_leader {
            tracing::info!("Worker leader disabled; skipping worker startup");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;

        self.register_jobs(&scheduler).await;

        scheduler.start().await?;

        tracing::info!("Worker manager started");
        let _ = self.shutdown_rx.recv().await;

        tracing::info!(
            drain_ms = DRAIN_TIMEOUT.as_millis() as u64,
            "Worker manager shutting down"
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        let _ = scheduler.shutdown().await;
        Ok(())
    }

    async fn register_jobs(&self, scheduler: &JobScheduler) {
        for spec in &self.planned_jobs() {
            if !spec.enabled {
                tracing::info!(name = spec.name.as_str(), "Skipping disabled worker");
                continue;
            }

            let name_str = spec.name.as_str();
            match spec.name {
                WorkerName::CacheCleanup => {
                    let store = self.store.clone();
                    add_job(scheduler, spec.cron, name_str, move || {
                        let store = store.clone();
                        async move {
                            cache_cleanup::run(&store).await;
                        }
                    })
                    .await;
                }
                WorkerName::ProfileWarmup => {
                    let engine = self.engine.clone();
                    add_job(scheduler, spec.cron, name_str, move || {
                        let engine = engine.clone();
                        async move {
                            profile_warmup::run(&engine).await;
                        }
                    })
                    .await;
                }
            }
            tracing::info!(name = name_str, cron = spec.cron, "Registered worker");
        }
    }
}

/// Add a job to the scheduler with an overlap guard and timeout wrapper.
async fn add_job<Fut, F>(scheduler: &JobScheduler, cron: &str, name: &'static str, mut run: F)
where
    F: FnMut() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(false));

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let guard = running.clone();

        if guard
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(
                worker = name,
                "Skipping worker invocation: previous run still in progress"
            );
            return Box::pin(async {});
        }

        let fut = run();
        Box::pin(async move {
            if tokio::time::timeout(WORKER_TIMEOUT, fut).await.is_err() {
                tracing::error!(
                    worker = name,
                    timeout_secs = WORKER_TIMEOUT.as_secs(),
                    "Worker timed out"
                );
            }
            guard.store(false, Ordering::SeqCst);
        })
    });

    match job {
        Ok(job) => {
            if let Err(err) = scheduler.add(job).await {
                tracing::error!(error=%err, cron, worker = name, "Failed to add worker job");
            }
        }
        Err(err) => tracing::error!(error=%err, cron, worker = name, "Failed to create worker job"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::broadcast;

    use crate::config::Config;
    use crate::practice::config::PracticeConfig;
    use crate::store::Store;

    use super::*;

    fn manager(dir: &tempfile::TempDir, worker_cfg: &WorkerConfig) -> WorkerManager {
        let store = Arc::new(Store::open(dir.path().join("worker.sled").to_str().unwrap()).unwrap());
        let engine = Arc::new(PracticeEngine::new(
            PracticeConfig::default(),
            store.clone(),
            store.clone(),
        ));
        let (tx, _) = broadcast::channel(2);
        WorkerManager::new(store, engine, tx.subscribe(), worker_cfg)
    }

    #[tokio::test]
    async fn leader_switch_controls_job_registration() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut worker_cfg = Config::from_env().worker;
        worker_cfg.is_leader = false;

        assert!(manager(&tmp, &worker_cfg).planned_jobs().is_empty());
    }

    #[tokio::test]
    async fn shutdown_path_is_non_panicking() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut worker_cfg = Config::from_env().worker;
        worker_cfg.is_leader = false;

        manager(&tmp, &worker_cfg)
            .start()
            .await
            .expect("non-leader start should succeed");
    }

    #[tokio::test]
    async fn warmup_switch_is_respected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let worker_cfg = WorkerConfig {
            is_leader: true,
            enable_cache_cleanup: true,
            enable_profile_warmup: false,
        };

        let jobs = manager(&tmp, &worker_cfg).planned_jobs();
        assert_eq!(jobs.len(), WorkerName::ALL.len());
        let warmup = jobs
            .iter()
            .find(|j| j.name == WorkerName::ProfileWarmup)
            .unwrap();
        assert!(!warmup.enabled);
        assert!(jobs.iter().any(|j| j.name == WorkerName::CacheCleanup && j.enabled));
    }

    #[tokio::test]
    async fn all_worker_names_have_str() {
        for name in WorkerName::ALL {
            assert!(!name.as_str().is_empty(), "{:?} has empty str", name);
        }
    }
}
