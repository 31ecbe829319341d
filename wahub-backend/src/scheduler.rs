//! Periodic database cleanup driven by a cron expression

use chrono::{DateTime, Utc};
use cron::Schedule;
use parking_lot::Mutex;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::db::{CleanupReport, Database};

#[derive(Debug, Clone, Serialize)]
pub struct CleanupRun {
    pub ran_at: DateTime<Utc>,
    pub report: CleanupReport,
}

pub struct CleanupScheduler {
    db: Arc<Database>,
    schedule: Schedule,
    message_retention_days: i64,
    last_run: Mutex<Option<CleanupRun>>,
}

impl CleanupScheduler {
    /// `expression` uses the six-field form with seconds, e.g. `0 0 3 * * *`
    pub fn new(db: Arc<Database>, expression: &str, message_retention_days: i64) -> Result<Self, String> {
        let schedule = Schedule::from_str(expression)
            .map_err(|e| format!("Invalid cleanup schedule '{}': {}", expression, e))?;

        Ok(Self {
            db,
            schedule,
            message_retention_days,
            last_run: Mutex::new(None),
        })
    }

    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.schedule.upcoming(Utc).next()
    }

    pub fn last_run(&self) -> Option<CleanupRun> {
        self.last_run.lock().clone()
    }

    /// Run one cleanup pass immediately
    pub fn run_now(&self) -> rusqlite::Result<CleanupRun> {
        let now = Utc::now();
        let report = self.db.run_cleanup(now, self.message_retention_days)?;
        log::info!(
            "[CLEANUP] sessions={} messages={} daily_stats={} api_usage={} downgraded_plans={}",
            report.expired_sessions,
            report.old_messages,
            report.old_daily_stats,
            report.old_api_usage,
            report.downgraded_plans
        );

        let run = CleanupRun { ran_at: now, report };
        *self.last_run.lock() = Some(run.clone());
        Ok(run)
    }

    /// Loop until `shutdown` fires, running cleanup at each scheduled time
    pub async fn start(&self, mut shutdown: oneshot::Receiver<()>) {
        log::info!("[CLEANUP] Scheduler started");

        loop {
            let Some(next) = self.next_run() else {
                log::warn!("[CLEANUP] Schedule has no upcoming runs, stopping");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            log::debug!("[CLEANUP] Next run at {}", next);

            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("[CLEANUP] Scheduler shutting down");
                    return;
                }
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.run_now() {
                        log::error!("[CLEANUP] Run failed: {}", e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_db;

    #[test]
    fn test_rejects_invalid_expression() {
        assert!(CleanupScheduler::new(Arc::new(test_db()), "every night", 30).is_err());
    }

    #[test]
    fn test_next_run_and_manual_run() {
        let scheduler = CleanupScheduler::new(Arc::new(test_db()), "0 0 3 * * *", 30).unwrap();
        let next = scheduler.next_run().unwrap();
        assert!(next > Utc::now());

        assert!(scheduler.last_run().is_none());
        let run = scheduler.run_now().unwrap();
        assert_eq!(run.report, CleanupReport::default());
        assert!(scheduler.last_run().is_some());
    }

    #[tokio::test]
    async fn test_start_stops_on_shutdown() {
        let scheduler = Arc::new(CleanupScheduler::new(Arc::new(test_db()), "0 0 3 * * *", 30).unwrap());
        let (tx, rx) = oneshot::channel();
        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.start(rx).await })
        };
        tx.send(()).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
