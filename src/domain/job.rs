//! Job queue records and lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::str::FromStr;

use super::{hash256_hex, pubkey_base58, vec_pubkey_base58, Hash256, JobProvenance};
use super::event::JobSubmittedEvent;

/// Job lifecycle states.
///
/// `queued -> assigned -> executing -> completed | failed`. `cancelled` is
/// representable for forward compatibility but no transition produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Assigned,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Assigned => "assigned",
            JobStatus::Executing => "executing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "assigned" => Ok(JobStatus::Assigned),
            "executing" => Ok(JobStatus::Executing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A ledger-confirmed job admitted to the execution pipeline.
///
/// Created only by the event listener after on-chain confirmation; the HTTP
/// surface mutates it exclusively through the queue's transition methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    #[serde(with = "pubkey_base58")]
    pub job_id: Pubkey,
    #[serde(with = "pubkey_base58")]
    pub submitter: Pubkey,
    #[serde(with = "pubkey_base58")]
    pub batch_id: Pubkey,
    #[serde(with = "hash256_hex")]
    pub commitment: Hash256,
    #[serde(with = "hash256_hex")]
    pub cid_set_id: Hash256,
    #[serde(with = "vec_pubkey_base58")]
    pub handles: Vec<Pubkey>,
    #[serde(with = "hash256_hex")]
    pub ir_digest: Hash256,
    #[serde(with = "hash256_hex")]
    pub policy_hash: Hash256,
    pub provenance: JobProvenance,

    pub queued_at: DateTime<Utc>,
    /// Block time of the submission transaction (unix seconds)
    pub submitted_at: i64,
    pub slot: u64,
    pub tx_signature: String,

    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueuedJob {
    /// Build a queued record from a confirmed submission event.
    ///
    /// `submitter` and `policy_hash` come from the on-chain job account,
    /// which carries fields the event body does not.
    pub fn from_submission(
        event: &JobSubmittedEvent,
        submitter: Pubkey,
        policy_hash: Hash256,
        tx_signature: impl Into<String>,
        slot: u64,
        block_time: i64,
    ) -> Self {
        Self {
            job_id: event.job,
            submitter,
            batch_id: event.batch,
            commitment: event.commitment,
            cid_set_id: event.cid_set_id,
            handles: event.cid_handles.clone(),
            ir_digest: event.ir_digest,
            policy_hash,
            provenance: JobProvenance::from_u8(event.provenance),
            queued_at: Utc::now(),
            submitted_at: block_time,
            slot,
            tx_signature: tx_signature.into(),
            status: JobStatus::Queued,
            executor: None,
            execution_started_at: None,
            execution_completed_at: None,
            result_handle: None,
            error: None,
        }
    }
}

/// Queue counters for the status surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub queued: usize,
    pub assigned: usize,
    pub executing: usize,
    pub completed: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_queued_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_queued_at: Option<DateTime<Utc>>,
}

/// Jobs grouped under one batch window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchWindowSummary {
    #[serde(with = "pubkey_base58")]
    pub batch_id: Pubkey,
    pub window_start_slot: u64,
    pub window_end_slot: u64,
    pub jobs: Vec<QueuedJob>,
    pub total_jobs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Assigned,
            JobStatus::Executing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Assigned.is_terminal());
        assert!(!JobStatus::Executing.is_terminal());
    }

    #[test]
    fn test_from_submission_carries_event_fields() {
        let event = JobSubmittedEvent {
            job: Pubkey::new_unique(),
            batch: Pubkey::new_unique(),
            cid_set_id: [1u8; 32],
            cid_handles: vec![Pubkey::new_unique(), Pubkey::new_unique()],
            commitment: [2u8; 32],
            ir_digest: [3u8; 32],
            provenance: 1,
        };
        let submitter = Pubkey::new_unique();

        let job = QueuedJob::from_submission(&event, submitter, [4u8; 32], "sig", 77, 1_700_000_000);

        assert_eq!(job.job_id, event.job);
        assert_eq!(job.batch_id, event.batch);
        assert_eq!(job.handles, event.cid_handles);
        assert_eq!(job.submitter, submitter);
        assert_eq!(job.policy_hash, [4u8; 32]);
        assert_eq!(job.provenance, JobProvenance::Client);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.slot, 77);
        assert!(job.executor.is_none());
    }
}
