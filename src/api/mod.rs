//! API layer for Gatewatch
//!
//! REST endpoints for job claim/result flows, ciphertext staging and
//! retrieval, batch planning, and challenge resolution.

mod error;
mod rest;

pub use error::{ApiError, ErrorCode, ErrorDetails};
pub use rest::router;
