//! Decoded gatekeeper program events
//!
//! These are the five events the log parser recognizes. Field layouts mirror
//! the on-chain event structs; trailing `slot` bytes in the emitted bodies
//! are ignored in favor of the transaction slot from the notification.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use super::{
    hash256_hex, option_bytes64_hex, option_hash256_hex, pubkey_base58, vec_pubkey_base58, Hash256,
};

/// A CID handle was registered on-chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CidHandleRegisteredEvent {
    #[serde(with = "pubkey_base58")]
    pub cid: Pubkey,
    #[serde(with = "pubkey_base58")]
    pub owner: Pubkey,
    #[serde(with = "hash256_hex")]
    pub ciphertext_hash: Hash256,
    #[serde(with = "hash256_hex")]
    pub policy_hash: Hash256,
}

/// A confidential job was submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSubmittedEvent {
    #[serde(with = "pubkey_base58")]
    pub job: Pubkey,
    #[serde(with = "pubkey_base58")]
    pub batch: Pubkey,
    #[serde(with = "hash256_hex")]
    pub cid_set_id: Hash256,
    #[serde(with = "vec_pubkey_base58")]
    pub cid_handles: Vec<Pubkey>,
    #[serde(with = "hash256_hex")]
    pub commitment: Hash256,
    #[serde(with = "hash256_hex")]
    pub ir_digest: Hash256,
    /// Raw wire byte; see [`super::JobProvenance`]
    pub provenance: u8,
}

/// A batch result was posted optimistically
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPostedEvent {
    #[serde(with = "pubkey_base58")]
    pub batch: Pubkey,
    pub window_start_slot: u64,
    #[serde(with = "hash256_hex")]
    pub commit_root: Hash256,
    #[serde(with = "hash256_hex")]
    pub result_commitment: Hash256,
    pub processed_until_slot: u64,
    pub posted_slot: u64,
    pub window_end_slot: u64,
}

/// A batch was finalized after its challenge window closed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFinalizedEvent {
    #[serde(with = "pubkey_base58")]
    pub batch: Pubkey,
    pub window_start_slot: u64,
    #[serde(with = "hash256_hex")]
    pub result_commitment: Hash256,
    pub finalized_slot: u64,
}

/// A reveal (decrypt) was requested for a handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealRequestedEvent {
    #[serde(with = "hash256_hex")]
    pub handle: Hash256,
    #[serde(with = "pubkey_base58")]
    pub requester: Pubkey,
    pub is_public: bool,
    /// Session key for private reveals
    #[serde(default, with = "option_hash256_hex", skip_serializing_if = "Option::is_none")]
    pub user_session_pubkey: Option<Hash256>,
    /// Domain signature for public reveals
    #[serde(default, with = "option_bytes64_hex", skip_serializing_if = "Option::is_none")]
    pub domain_signature: Option<[u8; 64]>,
}

/// One decoded program event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EventKind {
    CidHandleRegistered(CidHandleRegisteredEvent),
    JobSubmitted(JobSubmittedEvent),
    BatchPosted(BatchPostedEvent),
    BatchFinalized(BatchFinalizedEvent),
    RevealRequested(RevealRequestedEvent),
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::CidHandleRegistered(_) => "CidHandleRegistered",
            EventKind::JobSubmitted(_) => "JobSubmitted",
            EventKind::BatchPosted(_) => "BatchPosted",
            EventKind::BatchFinalized(_) => "BatchFinalized",
            EventKind::RevealRequested(_) => "RevealRequested",
        }
    }
}

/// A decoded event plus its transaction context.
///
/// `slot` and `tx_signature` come from the subscription notification;
/// `log_index` is the position of the source line within the transaction's
/// log array, preserving within-transaction ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub tx_signature: String,
    pub slot: u64,
    /// Block time in unix seconds; wall clock when the RPC lookup fails
    pub block_time: i64,
    pub log_index: usize,
    #[serde(flatten)]
    pub kind: EventKind,
}
