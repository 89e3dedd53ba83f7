pub mod anomaly_autoresolve;
pub mod archive_summarize;
pub mod daily_cap;
pub mod session_classify;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::WorkerConfig;
use crate::engine::StudyTimeEngine;
use crate::store::Store;

/// Timeout for individual worker invocations (5 minutes).
const WORKER_TIMEOUT: Duration = Duration::from_secs(300);

/// Drain period before scheduler shutdown to let in-flight tasks complete.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// 所有 worker 的枚举，消除字符串匹配，编译期保证完整性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    SessionClassify,
    DailyCap,
    AnomalyAutoResolve,
    ArchiveSummarize,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionClassify => "session_classify",
            Self::DailyCap => "daily_cap",
            Self::AnomalyAutoResolve => "anomaly_autoresolve",
            Self::ArchiveSummarize => "archive_summarize",
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
    engine: Arc<StudyTimeEngine>,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        engine: Arc<StudyTimeEngine>,
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
                name: WorkerName::SessionClassify,
                cron: "0 */5 * * * *",
                enabled: true,
            },
            // 日上限必须在当日全部会话分类提交之后执行，
            // 因此排在次日 00:20 针对前一天结算
            JobSpec {
                name: WorkerName::DailyCap,
                cron: "0 20 0 * * *",
                enabled: true,
            },
            JobSpec {
                name: WorkerName::AnomalyAutoResolve,
                cron: "0 40 * * * *",
                enabled: self.config.enable_auto_resolve,
            },
            JobSpec {
                name: WorkerName::ArchiveSummarize,
                cron: "0 0 2 * * *",
                enabled: self.config.enable_archive,
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
            "Worker manager shutting down, draining for {}s",
            DRAIN_TIMEOUT.as_secs()
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        let _ = scheduler.shutdown().await;
        Ok(())
    }

    /// Register all jobs with the scheduler, using `planned_jobs()` as the single source of truth.
    async fn register_jobs(&self, scheduler: &JobScheduler) {
        let specs = self.planned_jobs();

        for spec in &specs {
            if !spec.enabled {
                tracing::info!(name = spec.name.as_str(), "Skipping disabled worker");
                continue;
            }

            let store = self.store.clone();
            let engine = self.engine.clone();
            let name_str = spec.name.as_str();

            match spec.name {
                WorkerName::SessionClassify => {
                    add_job(scheduler, spec.cron, name_str, move || {
                        let store = store.clone();
                        let engine = engine.clone();
                        async move {
                            session_classify::run(&store, &engine).await;
                        }
                    })
                    .await;
                }
                WorkerName::DailyCap => {
                    add_job(scheduler, spec.cron, name_str, move || {
                        let store = store.clone();
                        let engine = engine.clone();
                        async move {
                            daily_cap::run(&store, &engine).await;
                        }
                    })
                    .await;
                }
                WorkerName::AnomalyAutoResolve => {
                    add_job(scheduler, spec.cron, name_str, move || {
                        let engine = engine.clone();
                        async move {
                            anomaly_autoresolve::run(&engine).await;
                        }
                    })
                    .await;
                }
                WorkerName::ArchiveSummarize => {
                    add_job(scheduler, spec.cron, name_str, move || {
                        let store = store.clone();
                        let engine = engine.clone();
                        async move {
                            archive_summarize::run(&store, &engine).await;
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
            match tokio::time::timeout(WORKER_TIMEOUT, fut).await {
                Ok(()) => {}
                Err(_) => {
                    tracing::error!(
                        worker = name,
                        timeout_secs = WORKER_TIMEOUT.as_secs(),
                        "Worker timed out"
                    );
                }
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
    use crate::engine::config::EngineConfig;
    use crate::engine::StudyTimeEngine;
    use crate::store::Store;

    use super::*;

    #[tokio::test]
    async fn leader_switch_controls_job_registration() {
        let cfg = Config::from_env();
        let tmp = tempfile::tempdir().expect("tempdir");
        let store =
            Arc::new(Store::open(tmp.path().join("worker_test.sled").to_str().unwrap()).unwrap());
        let engine =
            Arc::new(StudyTimeEngine::new(EngineConfig::default(), store.clone()).unwrap());
        let (tx, _) = broadcast::channel(2);

        let mut worker_cfg = cfg.worker.clone();
        worker_cfg.is_leader = false;

        let manager = WorkerManager::new(store, engine, tx.subscribe(), &worker_cfg);
        assert!(manager.planned_jobs().is_empty());
    }

    #[tokio::test]
    async fn daily_cap_runs_after_midnight() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store =
            Arc::new(Store::open(tmp.path().join("worker_test.sled").to_str().unwrap()).unwrap());
        let engine =
            Arc::new(StudyTimeEngine::new(EngineConfig::default(), store.clone()).unwrap());
        let (tx, _) = broadcast::channel(2);

        let worker_cfg = WorkerConfig {
            is_leader: true,
            enable_auto_resolve: true,
            enable_archive: true,
        };
        let manager = WorkerManager::new(store, engine, tx.subscribe(), &worker_cfg);
        let jobs = manager.planned_jobs();
        let cap = jobs
            .iter()
            .find(|j| j.name == WorkerName::DailyCap)
            .expect("daily cap job planned");
        assert_eq!(cap.cron, "0 20 0 * * *");
        assert!(cap.enabled);
    }

    #[tokio::test]
    async fn shutdown_path_is_non_panicking() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store =
            Arc::new(Store::open(tmp.path().join("worker_test.sled").to_str().unwrap()).unwrap());
        let engine =
            Arc::new(StudyTimeEngine::new(EngineConfig::default(), store.clone()).unwrap());
        let (tx, _) = broadcast::channel(2);

        let worker_cfg = WorkerConfig {
            is_leader: true,
            enable_auto_resolve: false,
            enable_archive: false,
        };
        let manager = WorkerManager::new(store, engine, tx.subscribe(), &worker_cfg);

        let handle = tokio::spawn(async move { manager.start().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(());
        let result = handle.await.expect("join worker manager");
        assert!(result.is_ok());
    }
}
