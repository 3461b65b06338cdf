//! Optimistic verification challenges
//!
//! A challenge disputes one leaf of a posted batch result. A fixed verifier
//! set re-executes the leaf and votes; the majority digest wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{hash256_hex, option_hash256_hex, vec_hash256_hex, Hash256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Opened,
    Resolved,
}

impl ChallengeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeStatus::Opened => "opened",
            ChallengeStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One verifier's vote on a disputed leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub verifier: String,
    #[serde(with = "hash256_hex")]
    pub digest: Hash256,
    pub signature: String,
}

/// A dispute over one leaf of a committed batch result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub commit_id: String,
    pub leaf_index: u64,
    #[serde(with = "hash256_hex")]
    pub conflicting_digest: Hash256,
    #[serde(with = "vec_hash256_hex")]
    pub merkle_proof: Vec<Hash256>,
    pub status: ChallengeStatus,
    pub opened_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub attestations: Vec<Attestation>,
    #[serde(default, with = "option_hash256_hex", skip_serializing_if = "Option::is_none")]
    pub accepted_digest: Option<Hash256>,
    #[serde(default, with = "option_hash256_hex", skip_serializing_if = "Option::is_none")]
    pub new_result_root: Option<Hash256>,
}

impl Challenge {
    pub fn open(
        commit_id: impl Into<String>,
        leaf_index: u64,
        conflicting_digest: Hash256,
        merkle_proof: Vec<Hash256>,
    ) -> Self {
        Self {
            commit_id: commit_id.into(),
            leaf_index,
            conflicting_digest,
            merkle_proof,
            status: ChallengeStatus::Opened,
            opened_at: Utc::now(),
            resolved_at: None,
            attestations: Vec::new(),
            accepted_digest: None,
            new_result_root: None,
        }
    }
}

/// Outcome of a quorum vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeResolution {
    /// Names of the verifiers that responded
    pub verifiers: Vec<String>,
    /// `"{agreeing}/{total}"`
    pub quorum: String,
    #[serde(with = "hash256_hex")]
    pub accepted_digest: Hash256,
    #[serde(with = "hash256_hex")]
    pub new_result_root: Hash256,
}
