//! Infrastructure layer for Gatewatch
//!
//! Contains trait definitions and implementations for:
//! - Pending ciphertext staging (TTL + sweep)
//! - Confirmed ciphertext storage (owner index, loud capacity bounds)
//! - Registration log (per-handle confirmation outcomes)
//! - Job queue (claim/complete state machine with batch and slot indexes)
//! - CID validation (set-id coherence against the store)
//! - Batch planning (DAG, Kahn ordering, decrypt bitmap)
//! - Challenge coordination (verifier quorum, majority resolution)
//! - Retry with backoff and shutdown signaling

mod challenges;
mod ciphertexts;
mod error;
mod pending;
mod planner;
mod queue;
mod registry;
mod retry;
mod shutdown;
mod traits;
mod validator;

pub use challenges::{ChallengeCoordinator, ReExecutionVerifier};
pub use ciphertexts::InMemoryCiphertextStore;
pub use error::*;
pub use pending::InMemoryPendingStore;
pub use planner::{decrypt_bitmap, topological_order, BatchPlanner, PlanSelector};
pub use queue::InMemoryJobQueue;
pub use registry::{generate_reg_id, InMemoryRegistrationLog};
pub use retry::{retry, retry_with_config, Retry, RetryConfig, RetryResult};
pub use shutdown::{shutdown_signal, spawn_until_shutdown, ShutdownCoordinator, ShutdownSignal};
pub use traits::*;
pub use validator::{CidValidationReport, CidValidator};
