//! Wraps the Reminder/Sweeper (C9) in a `tokio-cron-scheduler` job, per §4.9 "runs on a fixed
//! interval (suggested: every minute)".

use crate::db::DbPool;
use crate::domain::sweeper;
use crate::ports::Notifier;
use crate::settings::Settings;
use anyhow::Result;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio_cron_scheduler::Job;
use tokio_cron_scheduler::JobScheduler;

pub struct SweeperScheduler {
    scheduler: JobScheduler,
    pool: DbPool,
    notifier: Arc<dyn Notifier>,
    settings: Arc<RwLock<Settings>>,
}

impl SweeperScheduler {
    pub async fn new(pool: DbPool, notifier: Arc<dyn Notifier>, settings: Arc<RwLock<Settings>>) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self { scheduler, pool, notifier, settings })
    }

    pub async fn add_sweep_job(&self, schedule: &str) -> Result<()> {
        let pool = self.pool.clone();
        let notifier = self.notifier.clone();
        let settings = self.settings.clone();

        let uuid = self
            .scheduler
            .add(Job::new_async(schedule, move |_, _| {
                let pool = pool.clone();
                let notifier = notifier.clone();
                let settings = settings.clone();
                Box::pin(async move {
                    let mut conn = match pool.get() {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::error!(error = %e, "sweeper could not get a db connection");
                            return;
                        }
                    };
                    let settings_snapshot = settings.read().await.clone();
                    match sweeper::run_once(&mut conn, notifier.as_ref(), OffsetDateTime::now_utc(), &settings_snapshot).await {
                        Ok(counts) => tracing::info!(
                            reminders_sent = counts.reminders_sent,
                            transitions = counts.transitions,
                            duplicates_skipped = counts.duplicates_skipped,
                            "sweep completed"
                        ),
                        Err(e) => tracing::error!(error = %e, "sweep failed"),
                    }
                })
            })?)
            .await?;

        tracing::debug!(job_id = uuid.to_string(), "started sweeper job");
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.scheduler.start().await?;
        Ok(())
    }
}
