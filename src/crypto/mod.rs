//! Cryptographic utilities for Gatewatch
//!
//! Provides:
//! - Canonical JSON hashing (deterministic, cross-language compatible)
//! - CID set, policy, domain, and commitment derivations
//! - Deterministic result handle and operation digest derivations

mod hash;

pub use hash::*;
