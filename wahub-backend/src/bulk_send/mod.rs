//! Bulk outbound messaging with progress tracking
//!
//! Jobs live in a process-local registry. Each job is driven by one tokio task
//! that sends sequentially with a fixed delay, records per-contact results and
//! pushes progress to the owner's dashboard clients. The owner's daily limit
//! is re-read before every send. Finished jobs are dropped from the registry
//! after `JOB_RETENTION`.

pub mod types;

pub use types::{prepare_contacts, BulkJob, BulkJobRequest, BulkJobSummary, BulkSendError};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::db::{Database, StatDelta};
use crate::gateway::protocol::GatewayEvent;
use crate::gateway::EventBroadcaster;
use crate::models::{MessageDirection, MessageStatus, NewMessage};
use crate::whatsapp::MessageSender;
use types::{clamp_delay, BulkContactError, JOB_RETENTION, MIN_DELAY_MS};

const DAILY_LIMIT_REACHED: &str = "Daily message limit reached";

struct JobEntry {
    job: BulkJob,
    cancel: CancellationToken,
}

pub struct BulkSendManager {
    jobs: Arc<DashMap<String, JobEntry>>,
    db: Arc<Database>,
    sender: Arc<dyn MessageSender>,
    broadcaster: Arc<EventBroadcaster>,
    retention: Duration,
    min_delay_ms: u64,
    /// Serialises the running-job check with the insert
    start_lock: Mutex<()>,
}

impl BulkSendManager {
    pub fn new(db: Arc<Database>, sender: Arc<dyn MessageSender>, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            db,
            sender,
            broadcaster,
            retention: JOB_RETENTION,
            min_delay_ms: MIN_DELAY_MS,
            start_lock: Mutex::new(()),
        }
    }

    /// Override how long finished jobs stay queryable
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Override the lower bound applied to per-job delays
    pub fn with_min_delay_ms(mut self, min_delay_ms: u64) -> Self {
        self.min_delay_ms = min_delay_ms;
        self
    }

    /// Register a job and spawn its worker. Returns the job id.
    pub fn start(&self, request: BulkJobRequest) -> Result<String, BulkSendError> {
        if request.contacts.is_empty() {
            return Err(BulkSendError::NoContacts);
        }
        if request.message.trim().is_empty() {
            return Err(BulkSendError::EmptyMessage);
        }

        let delay_ms = clamp_delay(request.delay_ms, self.min_delay_ms);
        let job_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();

        {
            let _guard = self.start_lock.lock();
            if let Some(running) = self.running_job_for_instance(&request.instance_id) {
                return Err(BulkSendError::AlreadyRunning(running));
            }

            let job = BulkJob {
                id: job_id.clone(),
                user_id: request.user_id.clone(),
                instance_id: request.instance_id.clone(),
                total_contacts: request.contacts.len(),
                current_contact: 0,
                stopped: false,
                completed: false,
                errors: Vec::new(),
                success: Vec::new(),
                delay_ms,
                started_at: Utc::now(),
                completed_at: None,
            };
            self.jobs.insert(
                job_id.clone(),
                JobEntry {
                    job,
                    cancel: cancel.clone(),
                },
            );
        }

        log::info!(
            "[BULK] Job {} started for instance {}: {} contacts, {}ms delay",
            job_id,
            request.instance_id,
            request.contacts.len(),
            delay_ms
        );

        let worker = Worker {
            job_id: job_id.clone(),
            request,
            delay: Duration::from_millis(delay_ms),
            cancel,
            jobs: self.jobs.clone(),
            db: self.db.clone(),
            sender: self.sender.clone(),
            broadcaster: self.broadcaster.clone(),
            retention: self.retention,
        };
        tokio::spawn(worker.run());

        Ok(job_id)
    }

    /// Snapshot of a job owned by `user_id`
    pub fn get(&self, user_id: &str, job_id: &str) -> Option<BulkJob> {
        self.jobs
            .get(job_id)
            .filter(|entry| entry.job.user_id == user_id)
            .map(|entry| entry.job.clone())
    }

    /// Jobs of a user, newest first
    pub fn list(&self, user_id: &str) -> Vec<BulkJobSummary> {
        let mut jobs: Vec<BulkJobSummary> = self
            .jobs
            .iter()
            .filter(|entry| entry.job.user_id == user_id)
            .map(|entry| BulkJobSummary::from(&entry.job))
            .collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs
    }

    /// Cancel a job. The stop takes effect before the next send, even in the
    /// middle of a delay. Returns the updated job, None if not found.
    pub fn stop(&self, user_id: &str, job_id: &str) -> Option<BulkJob> {
        let mut entry = self.jobs.get_mut(job_id)?;
        if entry.job.user_id != user_id {
            return None;
        }

        if entry.job.is_running() {
            entry.cancel.cancel();
            entry.job.finish(true);
            log::info!("[BULK] Job {} stopped at {}/{}", job_id, entry.job.current_contact, entry.job.total_contacts);
        }

        Some(entry.job.clone())
    }

    /// Contacts still waiting in a user's running jobs
    pub fn queued_for_user(&self, user_id: &str) -> usize {
        self.jobs
            .iter()
            .filter(|entry| entry.job.user_id == user_id && entry.job.is_running())
            .map(|entry| entry.job.total_contacts.saturating_sub(entry.job.current_contact))
            .sum()
    }

    pub fn running_job_for_instance(&self, instance_id: &str) -> Option<String> {
        self.jobs
            .iter()
            .find(|entry| entry.job.instance_id == instance_id && entry.job.is_running())
            .map(|entry| entry.key().clone())
    }

    /// Cancel every job of an instance (used when the instance is deleted)
    pub fn stop_instance_jobs(&self, instance_id: &str) -> usize {
        let mut stopped = 0;
        for mut entry in self.jobs.iter_mut() {
            if entry.job.instance_id == instance_id && entry.job.is_running() {
                entry.cancel.cancel();
                entry.job.finish(true);
                stopped += 1;
            }
        }
        stopped
    }
}

struct Worker {
    job_id: String,
    request: BulkJobRequest,
    delay: Duration,
    cancel: CancellationToken,
    jobs: Arc<DashMap<String, JobEntry>>,
    db: Arc<Database>,
    sender: Arc<dyn MessageSender>,
    broadcaster: Arc<EventBroadcaster>,
    retention: Duration,
}

impl Worker {
    async fn run(self) {
        let total = self.request.contacts.len();

        for (index, contact) in self.request.contacts.iter().enumerate() {
            if index > 0 {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }
            if self.cancel.is_cancelled() {
                break;
            }

            let outcome = match self.check_quota() {
                Err(error) => Err(error),
                Ok(()) => match self
                    .sender
                    .send_text(&self.request.instance_id, contact, &self.request.message)
                    .await
                {
                    Ok(sent) => {
                        self.log_message(contact, sent.id.as_deref(), MessageStatus::Sent);
                        Ok(())
                    }
                    Err(e) => {
                        log::warn!("[BULK] Job {}: send to {} failed: {}", self.job_id, contact, e);
                        self.log_message(contact, None, MessageStatus::Failed);
                        Err(e.to_string())
                    }
                },
            };

            let progress = self.jobs.get_mut(&self.job_id).map(|mut entry| {
                let job = &mut entry.job;
                job.current_contact = (index + 1).min(job.total_contacts);
                match outcome {
                    Ok(()) => job.success.push(contact.clone()),
                    Err(error) => job.errors.push(BulkContactError {
                        contact: contact.clone(),
                        error,
                    }),
                }
                GatewayEvent::bulk_progress(
                    &job.id,
                    job.current_contact,
                    total,
                    job.success.len(),
                    job.errors.len(),
                )
            });

            match progress {
                Some(event) => {
                    self.broadcaster.send_to_user(&self.request.user_id, event);
                }
                // Entry vanished; nothing left to report to
                None => return,
            }
        }

        let finished = self.jobs.get_mut(&self.job_id).map(|mut entry| {
            let stopped = self.cancel.is_cancelled();
            entry.job.finish(stopped);
            let job = &entry.job;
            GatewayEvent::bulk_completed(&job.id, job.stopped, job.success.len(), job.errors.len())
        });

        if let Some(event) = finished {
            log::info!("[BULK] Job {} finished", self.job_id);
            self.broadcaster.send_to_user(&self.request.user_id, event);
        }

        tokio::time::sleep(self.retention).await;
        self.jobs.remove(&self.job_id);
        log::debug!("[BULK] Job {} removed from registry", self.job_id);
    }

    /// Other sends may have used the allowance since the job started
    fn check_quota(&self) -> Result<(), String> {
        match self.db.daily_quota(&self.request.user_id, Utc::now()) {
            Ok(quota) if quota.allows(1) => Ok(()),
            Ok(_) => Err(DAILY_LIMIT_REACHED.to_string()),
            Err(e) => {
                log::error!("[BULK] Job {}: could not load daily usage: {}", self.job_id, e);
                Err("Could not verify the daily limit".to_string())
            }
        }
    }

    fn log_message(&self, contact: &str, external_id: Option<&str>, status: MessageStatus) {
        let message = NewMessage {
            instance_id: &self.request.instance_id,
            direction: MessageDirection::Outbound,
            remote_jid: contact,
            message_type: "text",
            body: Some(&self.request.message),
            external_id,
            status,
        };
        // false when the webhook echo already logged and counted the send
        let logged = self.db.insert_message_once(&message).unwrap_or_else(|e| {
            log::error!("[BULK] Failed to log message for job {}: {}", self.job_id, e);
            true
        });

        if logged && status == MessageStatus::Sent {
            let today = Utc::now().date_naive();
            if let Err(e) = self.db.record_stats(&self.request.instance_id, today, StatDelta::sent(1)) {
                log::error!("[BULK] Failed to record stats for job {}: {}", self.job_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_db;
    use crate::whatsapp::testing::RecordingSender;

    struct Fixture {
        db: Arc<Database>,
        sender: Arc<RecordingSender>,
        broadcaster: Arc<EventBroadcaster>,
        user_id: String,
        instance_id: String,
    }

    fn fixture(fail_for: Option<&str>) -> Fixture {
        let db = Arc::new(test_db());
        let user = db.create_user("bulk@example.com", "hash", None).unwrap();
        let instance = db.create_instance(&user.id, "main").unwrap();
        Fixture {
            db,
            sender: Arc::new(match fail_for {
                Some(to) => RecordingSender::failing_for(to),
                None => RecordingSender::default(),
            }),
            broadcaster: Arc::new(EventBroadcaster::new()),
            user_id: user.id,
            instance_id: instance.id,
        }
    }

    fn manager(f: &Fixture) -> BulkSendManager {
        BulkSendManager::new(f.db.clone(), f.sender.clone(), f.broadcaster.clone()).with_min_delay_ms(0)
    }

    fn request(f: &Fixture, contacts: &[&str], delay_ms: u64) -> BulkJobRequest {
        BulkJobRequest {
            user_id: f.user_id.clone(),
            instance_id: f.instance_id.clone(),
            contacts: contacts.iter().map(|c| c.to_string()).collect(),
            message: "Hello!".to_string(),
            delay_ms: Some(delay_ms),
        }
    }

    async fn wait_for_completion(manager: &BulkSendManager, user_id: &str, job_id: &str) -> BulkJob {
        for _ in 0..200 {
            if let Some(job) = manager.get(user_id, job_id) {
                if job.completed {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not complete", job_id);
    }

    #[tokio::test]
    async fn test_job_runs_to_completion() {
        let f = fixture(Some("2@s.whatsapp.net"));
        let manager = manager(&f);
        let (_client, mut events) = f.broadcaster.subscribe(&f.user_id);

        let job_id = manager
            .start(request(&f, &["1@s.whatsapp.net", "2@s.whatsapp.net", "3@s.whatsapp.net"], 0))
            .unwrap();
        let job = wait_for_completion(&manager, &f.user_id, &job_id).await;

        assert_eq!(job.current_contact, 3);
        assert_eq!(job.success, vec!["1@s.whatsapp.net", "3@s.whatsapp.net"]);
        assert_eq!(job.errors.len(), 1);
        assert_eq!(job.errors[0].contact, "2@s.whatsapp.net");
        assert!(!job.stopped);
        assert!(job.completed_at.is_some());

        let today = Utc::now().date_naive();
        assert_eq!(f.db.messages_sent_on(&f.user_id, today).unwrap(), 2);

        let mut names = Vec::new();
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(1), events.recv()).await {
            let done = event.event == "bulk.completed";
            names.push(event.event);
            if done {
                break;
            }
        }
        assert_eq!(names.iter().filter(|n| *n == "bulk.progress").count(), 3);
        assert_eq!(names.last().map(String::as_str), Some("bulk.completed"));
    }

    #[tokio::test]
    async fn test_stop_interrupts_delay() {
        let f = fixture(None);
        let manager = manager(&f);

        let job_id = manager
            .start(request(&f, &["1@s.whatsapp.net", "2@s.whatsapp.net"], 60_000))
            .unwrap();

        // Let the first send happen, the worker then sits in the delay
        for _ in 0..100 {
            if f.sender.sent.lock().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let job = manager.stop(&f.user_id, &job_id).unwrap();
        assert!(job.stopped);
        assert!(job.completed);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.sender.sent.lock().len(), 1);
        let job = manager.get(&f.user_id, &job_id).unwrap();
        assert!(job.current_contact <= job.total_contacts);
        assert_eq!(job.current_contact, 1);
    }

    #[tokio::test]
    async fn test_one_running_job_per_instance() {
        let f = fixture(None);
        let manager = manager(&f);

        let first = manager
            .start(request(&f, &["1@s.whatsapp.net", "2@s.whatsapp.net"], 60_000))
            .unwrap();
        let err = manager.start(request(&f, &["3@s.whatsapp.net"], 0)).unwrap_err();
        assert_eq!(err, BulkSendError::AlreadyRunning(first.clone()));

        manager.stop(&f.user_id, &first);
        assert!(manager.start(request(&f, &["3@s.whatsapp.net"], 0)).is_ok());
    }

    #[tokio::test]
    async fn test_jobs_are_private_and_expire() {
        let f = fixture(None);
        let manager = manager(&f).with_retention(Duration::from_millis(300));

        let job_id = manager.start(request(&f, &["1@s.whatsapp.net"], 0)).unwrap();
        assert!(manager.get("someone-else", &job_id).is_none());
        assert!(manager.stop("someone-else", &job_id).is_none());
        assert!(manager.list("someone-else").is_empty());

        wait_for_completion(&manager, &f.user_id, &job_id).await;
        assert_eq!(manager.list(&f.user_id).len(), 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(manager.get(&f.user_id, &job_id).is_none());
    }

    #[tokio::test]
    async fn test_rejects_empty_input() {
        let f = fixture(None);
        let manager = manager(&f);
        assert_eq!(manager.start(request(&f, &[], 0)).unwrap_err(), BulkSendError::NoContacts);

        let mut req = request(&f, &["1@s.whatsapp.net"], 0);
        req.message = "  ".to_string();
        assert_eq!(manager.start(req).unwrap_err(), BulkSendError::EmptyMessage);
    }

    #[tokio::test]
    async fn test_daily_limit_is_enforced_per_send() {
        let f = fixture(None);
        let manager = manager(&f);
        // Free plan: 100 per day, one left
        let today = Utc::now().date_naive();
        f.db.record_stats(&f.instance_id, today, StatDelta::sent(99)).unwrap();

        let job_id = manager
            .start(request(&f, &["1@s.whatsapp.net", "2@s.whatsapp.net", "3@s.whatsapp.net"], 0))
            .unwrap();
        let job = wait_for_completion(&manager, &f.user_id, &job_id).await;

        assert_eq!(f.sender.recipients(), vec!["1@s.whatsapp.net"]);
        assert_eq!(job.success.len(), 1);
        assert_eq!(job.errors.len(), 2);
        assert!(job.errors.iter().all(|e| e.error == DAILY_LIMIT_REACHED));
        assert!(!job.stopped);
        assert_eq!(f.db.messages_sent_on(&f.user_id, today).unwrap(), 100);
    }

    #[tokio::test]
    async fn test_queued_contacts_count_running_jobs_only() {
        let f = fixture(None);
        let manager = manager(&f);
        assert_eq!(manager.queued_for_user(&f.user_id), 0);

        let job_id = manager
            .start(request(&f, &["1@s.whatsapp.net", "2@s.whatsapp.net", "3@s.whatsapp.net"], 60_000))
            .unwrap();
        for _ in 0..100 {
            if f.sender.sent.lock().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for _ in 0..100 {
            if manager.get(&f.user_id, &job_id).map(|j| j.current_contact) == Some(1) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(manager.queued_for_user(&f.user_id), 2);
        assert_eq!(manager.queued_for_user("someone-else"), 0);

        manager.stop(&f.user_id, &job_id);
        assert_eq!(manager.queued_for_user(&f.user_id), 0);
    }
}
