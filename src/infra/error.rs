//! Error types for Gatewatch infrastructure

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::domain::JobStatus;

/// Errors that can occur in the coordinator infrastructure
#[derive(Error, Debug)]
pub enum GatewatchError {
    /// RPC client error
    #[error("ledger rpc error: {0}")]
    Rpc(#[from] solana_client::client_error::ClientError),

    /// WebSocket subscription error
    #[error("ledger subscription error: {0}")]
    Subscription(#[from] solana_client::nonblocking::pubsub_client::PubsubClientError),

    /// Log or account decoding error
    #[error("parse error: {0}")]
    Parse(String),

    /// Event processing error
    #[error("event processing error: {0}")]
    Event(String),

    /// On-chain account confirmation exhausted its retries
    #[error("account confirmation failed for {address}: {reason}")]
    ConfirmationFailed { address: Pubkey, reason: String },

    /// Ciphertext handle not found
    #[error("ciphertext not found: {0}")]
    CiphertextNotFound(String),

    /// Job not found
    #[error("job not found: {0}")]
    JobNotFound(Pubkey),

    /// Registration receipt not found
    #[error("registration not found: {0}")]
    RegistrationNotFound(String),

    /// Registration entry not found under a known handle
    #[error("registration entry not found for handle: {0}")]
    RegistrationEntryNotFound(String),

    /// Store is at capacity
    #[error("{store} store full: capacity {capacity} reached")]
    CapacityExceeded { store: &'static str, capacity: usize },

    /// Serialized blob exceeds the per-entry bound
    #[error("payload too large: {size} bytes exceeds max {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Claim attempted on a job that is not queued
    #[error("job {job_id} not claimable: status is {status}")]
    NotClaimable { job_id: Pubkey, status: JobStatus },

    /// Transition attempted on a job outside assigned/executing
    #[error("job {job_id} not executable: status is {status}")]
    NotExecutable { job_id: Pubkey, status: JobStatus },

    /// Caller is not the executor the job was claimed by
    #[error("executor mismatch for job {0}")]
    ExecutorMismatch(Pubkey),

    /// CID set failed pre-admission validation
    #[error("cid validation failed: {0}")]
    CidValidation(String),

    /// Dependency graph contains a cycle
    #[error("plan cycle detected: {0}")]
    PlanCycle(String),

    /// Malformed caller input
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewatchError {
    pub fn parse(msg: impl Into<String>) -> Self {
        GatewatchError::Parse(msg.into())
    }

    pub fn event(msg: impl Into<String>) -> Self {
        GatewatchError::Event(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        GatewatchError::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        GatewatchError::Configuration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        GatewatchError::Internal(msg.into())
    }

    /// Whether a retry of the same call could reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewatchError::Rpc(_)
                | GatewatchError::Subscription(_)
                | GatewatchError::ConfirmationFailed { .. }
        )
    }
}

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, GatewatchError>;
