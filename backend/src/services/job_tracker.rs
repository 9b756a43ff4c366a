//! In-flight job tracking keyed by analysis fingerprint.
//!
//! At most one computation per fingerprint runs in this process. A caller
//! that wins [`JobTracker::try_begin`] holds a [`JobGuard`] until the job
//! finishes; dropping the guard releases the fingerprint, whether the job
//! completed, failed or was cancelled.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::ResourceId;

/// Metadata of a running job.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Job {
    pub resource_id: ResourceId,
    pub analytic: String,
    pub started_at: DateTime<Utc>,
}

/// In-memory in-flight map.
#[derive(Clone, Default)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<ResourceId, Job>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `resource_id`. Returns `None` when a job for it is already running.
    pub fn try_begin(&self, resource_id: ResourceId, analytic: &str) -> Option<JobGuard> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&resource_id) {
            return None;
        }
        jobs.insert(
            resource_id,
            Job {
                resource_id,
                analytic: analytic.to_string(),
                started_at: Utc::now(),
            },
        );
        Some(JobGuard {
            resource_id,
            jobs: self.jobs.clone(),
        })
    }

    pub fn is_running(&self, resource_id: ResourceId) -> bool {
        self.jobs.read().contains_key(&resource_id)
    }

    pub fn running_count(&self) -> usize {
        self.jobs.read().len()
    }

    /// Get a running job by id.
    pub fn get_job(&self, resource_id: ResourceId) -> Option<Job> {
        self.jobs.read().get(&resource_id).cloned()
    }
}

/// Releases its fingerprint on drop.
#[derive(Debug)]
pub struct JobGuard {
    resource_id: ResourceId,
    jobs: Arc<RwLock<HashMap<ResourceId, Job>>>,
}

impl JobGuard {
    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.jobs.write().remove(&self.resource_id);
    }
}
