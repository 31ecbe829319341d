use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;

use crate::whatsapp::jid::to_jid;

pub const DEFAULT_DELAY_MS: u64 = 3000;
pub const MIN_DELAY_MS: u64 = 500;
pub const MAX_DELAY_MS: u64 = 60_000;

/// Finished jobs stay queryable this long before they are dropped
pub const JOB_RETENTION: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Serialize)]
pub struct BulkContactError {
    pub contact: String,
    pub error: String,
}

/// Progress record of one bulk job
#[derive(Debug, Clone, Serialize)]
pub struct BulkJob {
    pub id: String,
    pub user_id: String,
    pub instance_id: String,
    pub total_contacts: usize,
    pub current_contact: usize,
    pub stopped: bool,
    pub completed: bool,
    pub errors: Vec<BulkContactError>,
    pub success: Vec<String>,
    pub delay_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BulkJob {
    pub fn is_running(&self) -> bool {
        !self.completed
    }

    /// Mark finished. The first call wins so a stop keeps its timestamp.
    pub(crate) fn finish(&mut self, stopped: bool) {
        if self.completed {
            return;
        }
        self.completed = true;
        self.stopped = self.stopped || stopped;
        self.completed_at = Some(Utc::now());
    }
}

/// Compact job view returned by listings
#[derive(Debug, Clone, Serialize)]
pub struct BulkJobSummary {
    pub id: String,
    pub instance_id: String,
    pub total_contacts: usize,
    pub current_contact: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub stopped: bool,
    pub completed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&BulkJob> for BulkJobSummary {
    fn from(job: &BulkJob) -> Self {
        Self {
            id: job.id.clone(),
            instance_id: job.instance_id.clone(),
            total_contacts: job.total_contacts,
            current_contact: job.current_contact,
            success_count: job.success.len(),
            error_count: job.errors.len(),
            stopped: job.stopped,
            completed: job.completed,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkJobRequest {
    pub user_id: String,
    pub instance_id: String,
    /// Normalised, de-duplicated JIDs
    pub contacts: Vec<String>,
    pub message: String,
    pub delay_ms: Option<u64>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BulkSendError {
    #[error("No valid contacts to send to")]
    NoContacts,
    #[error("Message text is required")]
    EmptyMessage,
    #[error("Instance already has a running bulk job ({0})")]
    AlreadyRunning(String),
}

/// Recipients after normalisation
#[derive(Debug, Default, Serialize)]
pub struct PreparedContacts {
    pub contacts: Vec<String>,
    pub invalid: Vec<String>,
    pub duplicates: usize,
}

/// Normalise raw recipients to JIDs, dropping duplicates and keeping order
pub fn prepare_contacts(raw: &[String]) -> PreparedContacts {
    let mut seen = HashSet::new();
    let mut prepared = PreparedContacts::default();

    for entry in raw {
        if entry.trim().is_empty() {
            continue;
        }
        match to_jid(entry) {
            Ok(jid) => {
                if seen.insert(jid.clone()) {
                    prepared.contacts.push(jid);
                } else {
                    prepared.duplicates += 1;
                }
            }
            Err(_) => prepared.invalid.push(entry.clone()),
        }
    }

    prepared
}

/// Requested delay bounded to `min_ms..=MAX_DELAY_MS`
pub fn clamp_delay(delay_ms: Option<u64>, min_ms: u64) -> u64 {
    delay_ms
        .unwrap_or(DEFAULT_DELAY_MS)
        .clamp(min_ms.min(MAX_DELAY_MS), MAX_DELAY_MS)
}
