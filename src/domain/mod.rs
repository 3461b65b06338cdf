//! Domain models for Gatewatch
//!
//! Core types for ledger events, ciphertext custody, job scheduling,
//! registrations, batch planning, and optimistic verification.

mod challenge;
mod ciphertext;
mod event;
mod job;
mod plan;
mod registration;
mod types;

pub use challenge::*;
pub use ciphertext::*;
pub use event::*;
pub use job::*;
pub use plan::*;
pub use registration::*;
pub use types::*;
