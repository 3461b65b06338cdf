//! Trait definitions for Gatewatch core services

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use solana_sdk::pubkey::Pubkey;

use crate::domain::{
    Attestation, BatchWindowSummary, CiphertextStats, ConfirmedCiphertext, LogEntry,
    PendingCiphertext, PendingStats, QueueStats, QueuedJob, RegistrationRecord, RegistrationStats,
    RegistrationStatus, VerificationInfo,
};

use super::Result;

/// Short-lived staging area for ciphertexts awaiting on-ledger confirmation.
///
/// Entries expire after a fixed TTL; a `get` past the deadline returns `None`
/// even before the sweep runs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Stage a ciphertext under its expected handle
    ///
    /// Fails loudly when the store is at capacity or the blob exceeds the
    /// size limit; staging never evicts.
    async fn put(&self, entry: PendingCiphertext) -> Result<()>;

    /// Fetch a staged ciphertext (lazy expiry check on read)
    async fn get(&self, handle: &str) -> Result<Option<PendingCiphertext>>;

    /// Remove and return a staged ciphertext (used on promotion)
    async fn take(&self, handle: &str) -> Result<Option<PendingCiphertext>>;

    /// Drop every entry past its deadline, returning how many were removed
    async fn sweep_expired(&self) -> Result<usize>;

    /// Snapshot of store occupancy
    async fn stats(&self) -> Result<PendingStats>;
}

/// Durable store of ledger-confirmed ciphertexts.
///
/// No TTL; capacity overflow is a loud failure, never an eviction.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CiphertextStore: Send + Sync {
    /// Insert a confirmed record
    ///
    /// Idempotent per handle: re-inserting an already-confirmed handle is a
    /// no-op, not a duplicate record.
    async fn insert(&self, record: ConfirmedCiphertext) -> Result<()>;

    /// Update the verification metadata for a handle
    ///
    /// A record already marked confirmed never downgrades.
    async fn update_verification(&self, handle: &str, verification: VerificationInfo)
        -> Result<()>;

    /// Fetch a record by handle
    async fn get(&self, handle: &str) -> Result<Option<ConfirmedCiphertext>>;

    /// Fetch several records, preserving request order (missing = None)
    async fn get_many(&self, handles: &[String]) -> Result<Vec<Option<ConfirmedCiphertext>>>;

    /// Whether a handle exists with confirmed verification status
    async fn is_confirmed(&self, handle: &str) -> Result<bool>;

    /// All records owned by a given key
    async fn list_by_owner(&self, owner: &Pubkey) -> Result<Vec<ConfirmedCiphertext>>;

    /// Transition stale pending-status records to expired
    async fn expire_stale_pending(&self, max_age_secs: i64) -> Result<usize>;

    /// Snapshot of store occupancy by verification status
    async fn stats(&self) -> Result<CiphertextStats>;
}

/// Append-style log of registration intents and their per-handle outcomes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RegistrationLog: Send + Sync {
    /// Record a new registration covering one or more handles
    async fn create(&self, record: RegistrationRecord) -> Result<()>;

    /// Update the outcome of a single handle's registration
    async fn update_entry_status(
        &self,
        handle: &str,
        status: RegistrationStatus,
        tx_signature: Option<String>,
    ) -> Result<()>;

    /// Fetch a registration by id
    async fn get(&self, reg_id: &str) -> Result<RegistrationRecord>;

    /// Per-handle entries for a registration, in submission order
    async fn entries(&self, reg_id: &str) -> Result<Vec<LogEntry>>;

    /// Most recent registrations, newest first
    async fn list_recent(&self, limit: usize) -> Result<Vec<RegistrationRecord>>;

    /// Snapshot of log occupancy by entry status
    async fn stats(&self) -> Result<RegistrationStats>;
}

/// Job queue and state machine.
///
/// `queued -> assigned -> executing -> completed`, with `failed` reachable
/// from `assigned` or `executing`. Claim is a compare-and-set on status;
/// completion and failure require the caller to match the assigned executor.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a ledger-confirmed job in `queued` state
    ///
    /// Idempotent by job id: a duplicate enqueue returns the existing record
    /// and logs at debug level. Primary map and secondary indexes (batch,
    /// slot) update as one atomic operation.
    async fn enqueue(&self, job: QueuedJob) -> Result<QueuedJob>;

    /// Fetch a job by id
    async fn get(&self, job_id: &Pubkey) -> Result<Option<QueuedJob>>;

    /// Assign a queued job to an executor (compare-and-set `queued -> assigned`)
    async fn claim(&self, job_id: &Pubkey, executor: &str) -> Result<QueuedJob>;

    /// Mark an assigned job as running (`assigned -> executing`)
    async fn start_execution(&self, job_id: &Pubkey, executor: &str) -> Result<QueuedJob>;

    /// Record a successful result (`assigned|executing -> completed`)
    async fn complete(
        &self,
        job_id: &Pubkey,
        executor: &str,
        result_handle: String,
    ) -> Result<QueuedJob>;

    /// Record a failure (`assigned|executing -> failed`)
    async fn fail(&self, job_id: &Pubkey, executor: &str, error: String) -> Result<QueuedJob>;

    /// Jobs currently `queued`, ordered by submission slot
    async fn queued_jobs(&self, limit: usize) -> Result<Vec<QueuedJob>>;

    /// Jobs currently `assigned` or `executing`, ordered by submission slot
    async fn active_jobs(&self) -> Result<Vec<QueuedJob>>;

    /// Terminal jobs, most recently finished first
    async fn finished_jobs(&self, limit: usize) -> Result<Vec<QueuedJob>>;

    /// All jobs submitted under a batch account
    async fn jobs_by_batch(&self, batch_id: &Pubkey) -> Result<Vec<QueuedJob>>;

    /// All jobs whose submission slot lies in `[start, end]`
    async fn jobs_by_slot_range(&self, start: u64, end: u64) -> Result<Vec<QueuedJob>>;

    /// Snapshot of queue occupancy by status
    async fn stats(&self) -> Result<QueueStats>;

    /// Jobs for a batch together with the window bounds echoed back
    async fn batch_window_summary(
        &self,
        batch_id: &Pubkey,
        window_start_slot: u64,
        window_end_slot: u64,
    ) -> Result<BatchWindowSummary>;
}

/// One member of the re-execution quorum consulted when a challenge opens.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LeafVerifier: Send + Sync {
    /// Stable identity reported in attestations
    fn name(&self) -> &str;

    /// Re-execute the disputed leaf and attest to the digest produced
    async fn attest(&self, commit_id: &str, leaf_index: u64) -> Result<Attestation>;
}
