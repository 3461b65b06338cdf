//! In-memory job queue and execution state machine
//!
//! Jobs enter `queued` only from ledger-confirmed submission events and move
//! through `assigned` and `executing` to a terminal `completed` or `failed`.
//! Claim is a compare-and-set on status under the queue lock, which is what
//! enforces at-most-one active executor per job under racing claims. The
//! primary map and both secondary indexes (batch, slot) mutate under that
//! same lock and therefore never desynchronize.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::RwLock;

use crate::domain::{BatchWindowSummary, JobStatus, QueueStats, QueuedJob};

use super::error::GatewatchError;
use super::traits::JobQueue;
use super::Result;

/// In-memory implementation of [`JobQueue`].
#[derive(Default)]
pub struct InMemoryJobQueue {
    inner: RwLock<QueueIndex>,
}

#[derive(Default)]
struct QueueIndex {
    jobs: HashMap<Pubkey, QueuedJob>,
    by_batch: HashMap<Pubkey, Vec<Pubkey>>,
    by_slot: BTreeMap<u64, Vec<Pubkey>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueIndex {
    fn sorted_by_slot(&self, mut ids: Vec<Pubkey>) -> Vec<QueuedJob> {
        let mut jobs: Vec<QueuedJob> = ids
            .drain(..)
            .filter_map(|id| self.jobs.get(&id).cloned())
            .collect();
        jobs.sort_by_key(|j| j.slot);
        jobs
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: QueuedJob) -> Result<QueuedJob> {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.jobs.get(&job.job_id) {
            tracing::debug!(job_id = %job.job_id, "Job already enqueued, skipping");
            return Ok(existing.clone());
        }

        tracing::info!(
            job_id = %job.job_id,
            batch_id = %job.batch_id,
            slot = job.slot,
            cid_count = job.handles.len(),
            "Enqueued job"
        );
        inner.by_batch.entry(job.batch_id).or_default().push(job.job_id);
        inner.by_slot.entry(job.slot).or_default().push(job.job_id);
        inner.jobs.insert(job.job_id, job.clone());
        Ok(job)
    }

    async fn get(&self, job_id: &Pubkey) -> Result<Option<QueuedJob>> {
        let inner = self.inner.read().await;
        Ok(inner.jobs.get(job_id).cloned())
    }

    async fn claim(&self, job_id: &Pubkey, executor: &str) -> Result<QueuedJob> {
        let mut inner = self.inner.write().await;

        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or(GatewatchError::JobNotFound(*job_id))?;

        if job.status != JobStatus::Queued {
            return Err(GatewatchError::NotClaimable {
                job_id: *job_id,
                status: job.status,
            });
        }

        job.status = JobStatus::Assigned;
        job.executor = Some(executor.to_string());
        tracing::info!(job_id = %job_id, executor = %executor, "Job claimed");
        Ok(job.clone())
    }

    async fn start_execution(&self, job_id: &Pubkey, executor: &str) -> Result<QueuedJob> {
        let mut inner = self.inner.write().await;

        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or(GatewatchError::JobNotFound(*job_id))?;

        if job.status != JobStatus::Assigned {
            return Err(GatewatchError::NotExecutable {
                job_id: *job_id,
                status: job.status,
            });
        }
        if job.executor.as_deref() != Some(executor) {
            return Err(GatewatchError::ExecutorMismatch(*job_id));
        }

        job.status = JobStatus::Executing;
        job.execution_started_at = Some(Utc::now());
        Ok(job.clone())
    }

    async fn complete(
        &self,
        job_id: &Pubkey,
        executor: &str,
        result_handle: String,
    ) -> Result<QueuedJob> {
        let mut inner = self.inner.write().await;

        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or(GatewatchError::JobNotFound(*job_id))?;

        if !matches!(job.status, JobStatus::Assigned | JobStatus::Executing) {
            return Err(GatewatchError::NotExecutable {
                job_id: *job_id,
                status: job.status,
            });
        }
        if job.executor.as_deref() != Some(executor) {
            return Err(GatewatchError::ExecutorMismatch(*job_id));
        }

        job.status = JobStatus::Completed;
        job.result_handle = Some(result_handle);
        job.execution_completed_at = Some(Utc::now());
        tracing::info!(job_id = %job_id, executor = %executor, "Job completed");
        Ok(job.clone())
    }

    async fn fail(&self, job_id: &Pubkey, executor: &str, error: String) -> Result<QueuedJob> {
        let mut inner = self.inner.write().await;

        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or(GatewatchError::JobNotFound(*job_id))?;

        if !matches!(job.status, JobStatus::Assigned | JobStatus::Executing) {
            return Err(GatewatchError::NotExecutable {
                job_id: *job_id,
                status: job.status,
            });
        }
        if job.executor.as_deref() != Some(executor) {
            return Err(GatewatchError::ExecutorMismatch(*job_id));
        }

        job.status = JobStatus::Failed;
        job.error = Some(error);
        job.execution_completed_at = Some(Utc::now());
        tracing::warn!(job_id = %job_id, executor = %executor, "Job failed");
        Ok(job.clone())
    }

    async fn queued_jobs(&self, limit: usize) -> Result<Vec<QueuedJob>> {
        let inner = self.inner.read().await;

        let mut jobs: Vec<QueuedJob> = inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.slot);
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn active_jobs(&self) -> Result<Vec<QueuedJob>> {
        let inner = self.inner.read().await;

        let mut jobs: Vec<QueuedJob> = inner
            .jobs
            .values()
            .filter(|j| matches!(j.status, JobStatus::Assigned | JobStatus::Executing))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.slot);
        Ok(jobs)
    }

    async fn finished_jobs(&self, limit: usize) -> Result<Vec<QueuedJob>> {
        let inner = self.inner.read().await;

        let mut jobs: Vec<QueuedJob> = inner
            .jobs
            .values()
            .filter(|j| j.status.is_terminal())
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.execution_completed_at.cmp(&a.execution_completed_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn jobs_by_batch(&self, batch_id: &Pubkey) -> Result<Vec<QueuedJob>> {
        let inner = self.inner.read().await;

        let ids = inner.by_batch.get(batch_id).cloned().unwrap_or_default();
        Ok(inner.sorted_by_slot(ids))
    }

    async fn jobs_by_slot_range(&self, start: u64, end: u64) -> Result<Vec<QueuedJob>> {
        let inner = self.inner.read().await;

        let ids: Vec<Pubkey> = inner
            .by_slot
            .range(start..=end)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        Ok(inner.sorted_by_slot(ids))
    }

    async fn stats(&self) -> Result<QueueStats> {
        let inner = self.inner.read().await;

        let mut stats = QueueStats {
            total: inner.jobs.len(),
            ..Default::default()
        };
        for job in inner.jobs.values() {
            match job.status {
                JobStatus::Queued => {
                    stats.queued += 1;
                    stats.oldest_queued_at = match stats.oldest_queued_at {
                        Some(t) if t <= job.queued_at => Some(t),
                        _ => Some(job.queued_at),
                    };
                    stats.newest_queued_at = match stats.newest_queued_at {
                        Some(t) if t >= job.queued_at => Some(t),
                        _ => Some(job.queued_at),
                    };
                }
                JobStatus::Assigned => stats.assigned += 1,
                JobStatus::Executing => stats.executing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => {}
            }
        }
        Ok(stats)
    }

    async fn batch_window_summary(
        &self,
        batch_id: &Pubkey,
        window_start_slot: u64,
        window_end_slot: u64,
    ) -> Result<BatchWindowSummary> {
        let jobs = self.jobs_by_batch(batch_id).await?;
        Ok(BatchWindowSummary {
            batch_id: *batch_id,
            window_start_slot,
            window_end_slot,
            total_jobs: jobs.len(),
            jobs,
        })
    }
}
