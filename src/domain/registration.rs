//! Registration receipts for staged ciphertext batches
//!
//! One off-ledger submission can stage several ciphertexts at once; the
//! ledger confirms each handle independently. A registration record groups
//! the batch under one receipt id while per-handle entries track their own
//! status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;

use super::{hash256_hex, pubkey_base58, vec_hash256_hex, Hash256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
    Failed,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Key material domain the registration binds to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainInfo {
    pub chain_id: String,
    pub gatekeeper_program: String,
    pub cpk_id: String,
    pub key_epoch: u64,
}

impl DomainInfo {
    pub fn new(
        chain_id: impl Into<String>,
        gatekeeper_program: impl Into<String>,
        cpk_id: impl Into<String>,
        key_epoch: u64,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            gatekeeper_program: gatekeeper_program.into(),
            cpk_id: cpk_id.into(),
            key_epoch,
        }
    }
}

/// Per-handle entry under a registration receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub handle: String,
    #[serde(with = "hash256_hex")]
    pub content_hash: Hash256,
    #[serde(with = "hash256_hex")]
    pub policy_hash: Hash256,
    pub status: RegistrationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_signature: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Batch receipt covering every handle of one staging request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub reg_id: String,
    pub handles: Vec<String>,
    #[serde(with = "vec_hash256_hex")]
    pub content_hashes: Vec<Hash256>,
    #[serde(with = "vec_hash256_hex")]
    pub policy_hashes: Vec<Hash256>,
    #[serde(with = "pubkey_base58")]
    pub owner: Pubkey,
    pub domain: DomainInfo,
    pub created_at: DateTime<Utc>,
    pub status: RegistrationStatus,
}

/// Registration log counters for the status surface
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RegistrationStats {
    pub records: usize,
    pub entries: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub failed: usize,
}
