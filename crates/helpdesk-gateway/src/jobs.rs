//! Fire-and-forget background jobs with pollable results.
//!
//! A job is submitted together with an immutable snapshot of the caller's
//! [`RequestContext`]. The worker task re-enters that context before running,
//! since the originating request has long finished by then.

use helpdesk_core::error::Result;
use helpdesk_tenancy::context::{self, RequestContext};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Observable state of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Done { result: Value },
    Failed { error: String },
}

struct JobRecord {
    tenant_id: String,
    status: JobStatus,
    finished_at: Option<Instant>,
}

pub struct JobQueue {
    jobs: Arc<Mutex<HashMap<String, JobRecord>>>,
    retention: Duration,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

impl JobQueue {
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            retention,
        }
    }

    /// Spawn `work` inside `ctx` and return the job id.
    pub fn submit<F, Fut>(&self, ctx: RequestContext, work: F) -> String
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.prune();
        let id = uuid::Uuid::new_v4().to_string();
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.insert(
                id.clone(),
                JobRecord {
                    tenant_id: ctx.tenant_id.clone(),
                    status: JobStatus::Pending,
                    finished_at: None,
                },
            );
        }

        let jobs = Arc::clone(&self.jobs);
        let job_id = id.clone();
        tokio::spawn(async move {
            let tenant = ctx.tenant_slug.clone();
            let status = match context::scope(ctx, work()).await {
                Ok(result) => JobStatus::Done { result },
                Err(e) => {
                    tracing::error!("❌ Job {job_id} for tenant {tenant} failed: {e}");
                    JobStatus::Failed { error: e.to_string() }
                }
            };
            if let Ok(mut jobs) = jobs.lock()
                && let Some(record) = jobs.get_mut(&job_id)
            {
                record.status = status;
                record.finished_at = Some(Instant::now());
            }
        });
        id
    }

    /// Status of a job owned by `tenant_id`. Jobs of other tenants are invisible.
    pub fn poll(&self, tenant_id: &str, job_id: &str) -> Option<JobStatus> {
        let jobs = self.jobs.lock().ok()?;
        jobs.get(job_id)
            .filter(|r| r.tenant_id == tenant_id)
            .map(|r| r.status.clone())
    }

    /// Drop finished jobs older than the retention window.
    pub fn prune(&self) -> usize {
        let Ok(mut jobs) = self.jobs.lock() else {
            return 0;
        };
        let before = jobs.len();
        let retention = self.retention;
        jobs.retain(|_, r| r.finished_at.is_none_or(|t| t.elapsed() <= retention));
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().map(|j| j.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
