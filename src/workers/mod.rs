pub mod xp_reconcile;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::db::DatabaseProxy;
use crate::services::LedgerError;

const DEFAULT_RECONCILE_SCHEDULE: &str = "0 30 3 * * *";

static WORKER_LEADER: AtomicBool = AtomicBool::new(false);

pub fn is_worker_leader() -> bool {
    WORKER_LEADER.load(Ordering::Relaxed)
}

fn set_worker_leader(val: bool) {
    WORKER_LEADER.store(val, Ordering::Relaxed);
}

pub struct WorkerManager {
    scheduler: Mutex<JobScheduler>,
    shutdown_tx: broadcast::Sender<()>,
    db_proxy: Arc<DatabaseProxy>,
}

impl WorkerManager {
    pub async fn new(db_proxy: Arc<DatabaseProxy>) -> Result<Self, WorkerError> {
        let scheduler = JobScheduler::new().await?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            shutdown_tx,
            db_proxy,
        })
    }

    pub async fn start(&self) -> Result<(), WorkerError> {
        let leader = std::env::var("WORKER_LEADER")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        if !leader {
            info!("WORKER_LEADER not set, skipping worker startup");
            return Ok(());
        }

        set_worker_leader(true);
        info!("Starting workers (leader mode)");

        let enable_reconcile = std::env::var("ENABLE_XP_RECONCILE_WORKER")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let scheduler = self.scheduler.lock().await;

        if enable_reconcile {
            let schedule = std::env::var("XP_RECONCILE_SCHEDULE")
                .unwrap_or_else(|_| DEFAULT_RECONCILE_SCHEDULE.to_string());
            let db = Arc::clone(&self.db_proxy);
            let shutdown_rx = self.shutdown_tx.subscribe();
            let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
                let db = Arc::clone(&db);
                let mut rx = shutdown_rx.resubscribe();
                Box::pin(async move {
                    tokio::select! {
                        _ = rx.recv() => {},
                        result = xp_reconcile::run_reconcile_cycle(db) => {
                            if let Err(e) = result {
                                error!(error = %e, "XP reconcile worker error");
                            }
                        }
                    }
                })
            })?;
            scheduler.add(job).await?;
            info!(schedule = %schedule, "XP reconcile worker scheduled");
        }

        scheduler.start().await?;
        info!("All workers started");

        Ok(())
    }

    pub async fn stop(&self) {
        if !is_worker_leader() {
            return;
        }

        info!("Stopping workers...");
        let _ = self.shutdown_tx.send(());

        let mut scheduler = self.scheduler.lock().await;
        if let Err(e) = scheduler.shutdown().await {
            warn!(error = %e, "Error shutting down scheduler");
        }

        set_worker_leader(false);
        info!("Workers stopped");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
