//! In-memory registry of poll-able analysis jobs.
//!
//! Jobs are process-lifetime: losing them on restart is acceptable, so the
//! registry is an injected component rather than a module-level map, and a
//! periodic sweep reaps terminal jobs past the retention window.
//!
//! Stage timing markers are keyed by `(job_id, stage_id)`; a concurrent
//! re-start of the same stage overwrites the marker (last start wins), which
//! is an accepted relaxation for a progress indicator.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Default time a terminal job stays pollable.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Completed,
    Skipped,
    Error,
}

/// Per-document outcome inside a job. A single bad document never aborts the
/// batch; it lands here with its error string instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobItemResult {
    pub item_id: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_percentage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Point-in-time view of a job, returned to pollers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub item_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    pub results: Vec<JobItemResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct JobRecord {
    snapshot: JobSnapshot,
    touched_at: Instant,
}

pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
    stage_starts: Mutex<HashMap<(Uuid, String), Instant>>,
    retention: Duration,
}

impl JobRegistry {
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            stage_starts: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Register a new job in `pending` state and return its id. The job is
    /// pollable immediately, before any stage runs.
    pub async fn create(&self, item_type: &str) -> Uuid {
        let job_id = Uuid::new_v4();
        let now = Utc::now();
        let record = JobRecord {
            snapshot: JobSnapshot {
                job_id,
                status: JobStatus::Pending,
                item_type: item_type.to_string(),
                current_stage: None,
                results: Vec::new(),
                error: None,
                created_at: now,
                updated_at: now,
            },
            touched_at: Instant::now(),
        };
        self.jobs.write().await.insert(job_id, record);
        job_id
    }

    pub async fn mark_in_progress(&self, job_id: Uuid) {
        self.update(job_id, |snapshot| {
            snapshot.status = JobStatus::InProgress;
        })
        .await;
    }

    pub async fn set_stage(&self, job_id: Uuid, stage_id: &str) {
        let stage = stage_id.to_string();
        self.update(job_id, move |snapshot| {
            snapshot.current_stage = Some(stage);
        })
        .await;
    }

    pub async fn push_result(&self, job_id: Uuid, result: JobItemResult) {
        self.update(job_id, move |snapshot| {
            snapshot.results.push(result);
        })
        .await;
    }

    pub async fn complete(&self, job_id: Uuid) {
        self.update(job_id, |snapshot| {
            snapshot.status = JobStatus::Completed;
            snapshot.current_stage = None;
        })
        .await;
    }

    pub async fn fail(&self, job_id: Uuid, error: &str) {
        let message = error.to_string();
        self.update(job_id, move |snapshot| {
            snapshot.status = JobStatus::Error;
            snapshot.error = Some(message);
            snapshot.current_stage = None;
        })
        .await;
    }

    /// Current view of a job, or `None` when unknown or already reaped.
    pub async fn snapshot(&self, job_id: Uuid) -> Option<JobSnapshot> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .map(|record| record.snapshot.clone())
    }

    /// Record a stage start. A second start for the same `(job_id, stage_id)`
    /// overwrites the marker.
    pub async fn stage_started(&self, job_id: Uuid, stage_id: &str) {
        self.stage_starts
            .lock()
            .await
            .insert((job_id, stage_id.to_string()), Instant::now());
    }

    /// Close a stage: compute its duration from the start marker and clear
    /// the marker. Returns `None` when no start was recorded.
    pub async fn stage_finished(&self, job_id: Uuid, stage_id: &str) -> Option<Duration> {
        self.stage_starts
            .lock()
            .await
            .remove(&(job_id, stage_id.to_string()))
            .map(|started| started.elapsed())
    }

    /// Drop terminal jobs whose last update is older than the retention
    /// window, along with any orphaned stage markers. Returns the count.
    pub async fn sweep_expired(&self) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, record| {
            !(record.snapshot.status.is_terminal()
                && record.touched_at.elapsed() > self.retention)
        });
        let swept = before - jobs.len();

        if swept > 0 {
            let live: std::collections::HashSet<Uuid> = jobs.keys().copied().collect();
            drop(jobs);
            self.stage_starts
                .lock()
                .await
                .retain(|(job_id, _), _| live.contains(job_id));
        }

        swept
    }

    async fn update<F>(&self, job_id: Uuid, mutate: F)
    where
        F: FnOnce(&mut JobSnapshot),
    {
        if let Some(record) = self.jobs.write().await.get_mut(&job_id) {
            mutate(&mut record.snapshot);
            record.snapshot.updated_at = Utc::now();
            record.touched_at = Instant::now();
        }
    }
}
