// src/jobs.rs
//
// Process-lifetime registry of import jobs. Status transitions are only
// reachable through the methods here, and only the import pipeline calls
// them; readers always get snapshot clones, never references into the map.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{ImportJob, ImportKind, ImportStatus, RowError};

pub struct JobRegistry {
    jobs: Mutex<HashMap<Uuid, ImportJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn create(&self, kind: ImportKind, total_rows: u32) -> ImportJob {
        let job = ImportJob::new(kind, total_rows);
        info!(job_id = %job.id, kind = kind.as_str(), total_rows, "import job created");
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        job
    }

    /// Snapshot of the job as of now; safe to call while it is processing.
    pub fn get(&self, id: Uuid) -> Option<ImportJob> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    /// Job history, newest first.
    pub fn list(&self, limit: usize) -> Vec<ImportJob> {
        let jobs = self.jobs.lock().unwrap();
        let mut all: Vec<ImportJob> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        all.truncate(limit);
        all
    }

    /// Queued -> Processing. Returns false (and leaves the job untouched)
    /// for any other starting state.
    pub fn mark_processing(&self, id: Uuid, at: DateTime<Utc>) -> bool {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) if job.status == ImportStatus::Queued => {
                job.status = ImportStatus::Processing;
                job.started_at = Some(at);
                true
            }
            Some(job) => {
                warn!(job_id = %id, status = job.status.as_str(), "refusing to start job");
                false
            }
            None => {
                warn!(job_id = %id, "unknown job");
                false
            }
        }
    }

    pub fn record_success(&self, id: Uuid) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&id) {
            if job.status == ImportStatus::Processing {
                job.succeeded += 1;
            }
        }
    }

    pub fn record_row_error(&self, id: Uuid, error: RowError) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&id) {
            if job.status == ImportStatus::Processing {
                job.failed += 1;
                job.row_errors.push(error);
            }
        }
    }

    /// Processing -> Completed. Returns the terminal snapshot exactly once;
    /// a second call (or a call in the wrong state) returns None, which is
    /// what keeps the notification hook single-shot.
    pub fn complete(&self, id: Uuid, at: DateTime<Utc>) -> Option<ImportJob> {
        self.finish(id, ImportStatus::Completed, None, at)
    }

    /// {Queued, Processing} -> Failed with a single top-level message.
    pub fn fail(&self, id: Uuid, message: String, at: DateTime<Utc>) -> Option<ImportJob> {
        self.finish(id, ImportStatus::Failed, Some(message), at)
    }

    fn finish(
        &self,
        id: Uuid,
        status: ImportStatus,
        message: Option<String>,
        at: DateTime<Utc>,
    ) -> Option<ImportJob> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id)?;
        let legal = match status {
            ImportStatus::Completed => job.status == ImportStatus::Processing,
            ImportStatus::Failed => !job.status.is_terminal(),
            _ => false,
        };
        if !legal {
            warn!(
                job_id = %id,
                from = job.status.as_str(),
                to = status.as_str(),
                "illegal job transition refused"
            );
            return None;
        }
        job.status = status;
        job.error = message;
        job.completed_at = Some(at);
        info!(
            job_id = %id,
            status = status.as_str(),
            succeeded = job.succeeded,
            failed = job.failed,
            "import job finished"
        );
        Some(job.clone())
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
