//! Gatewatch Library
//!
//! Ledger-synchronized coordinator for confidential compute jobs: follows a
//! Solana gatekeeper program's event log, admits client-encrypted ciphertexts
//! through a staging lifecycle, queues confirmed jobs for executors, plans
//! batch execution windows, and resolves optimistic challenges through a
//! verifier quorum.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (events, ciphertexts, jobs, plans)
//! - [`infra`] - Stores, planner, validator, challenge coordination
//! - [`crypto`] - Canonical hashing and deterministic derivations
//! - [`ledger`] - Solana connection, log parser, event listener
//! - [`api`] - REST API routes
//! - [`server`] - HTTP server bootstrap

pub mod api;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod ledger;
pub mod server;

// Re-export commonly used types
pub use domain::{
    ConfirmedCiphertext, DomainEvent, EventKind, Hash256, JobStatus, PendingCiphertext, QueuedJob,
    RegistrationRecord,
};

pub use infra::{GatewatchError, Result};
