//! Ciphertext records for the pending and confirmed stores

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;

use crate::crypto::derive_storage_ref;

use super::{hash256_hex, pubkey_base58, Hash256};

/// Encryption scheme attached to staged ciphertexts
pub const DEFAULT_ENC_SCHEME: &str = "FHE16_0.0.1v";

/// Where a stored ciphertext came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Client,
    Server,
    Executor,
    /// Reconstructed from a ledger event with no staged data
    OnChainEvent,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Client => "client",
            Provenance::Server => "server",
            Provenance::Executor => "executor",
            Provenance::OnChainEvent => "on-chain-event",
        }
    }
}

impl Default for Provenance {
    fn default() -> Self {
        Provenance::Client
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Encryption parameters attached to a ciphertext
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionParams {
    pub scheme: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EncryptionParams {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            extra: serde_json::Map::new(),
        }
    }
}

impl Default for EncryptionParams {
    fn default() -> Self {
        Self::new(DEFAULT_ENC_SCHEME)
    }
}

/// Access policy presets offered by the registration surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    OwnerControlled,
    ProtocolManaged,
}

impl PolicyKind {
    /// Map a request label to a preset; unknown labels get the private default
    pub fn from_label(label: &str) -> Self {
        match label {
            "protocol-managed" => PolicyKind::ProtocolManaged,
            _ => PolicyKind::OwnerControlled,
        }
    }

    /// The policy context document hashed into `policy_hash`
    pub fn context(&self) -> serde_json::Value {
        match self {
            PolicyKind::OwnerControlled => serde_json::json!({
                "allow": ["compute"],
                "version": "1.0",
                "decrypt_by": "owner",
            }),
            PolicyKind::ProtocolManaged => serde_json::json!({
                "allow": ["compute", "store"],
                "version": "1.0",
                "decrypt_by": "protocol",
            }),
        }
    }
}

/// Verification lifecycle of a stored ciphertext
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Confirmed,
    Expired,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Confirmed => "confirmed",
            VerificationStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationInfo {
    pub status: VerificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
}

impl VerificationInfo {
    pub fn pending() -> Self {
        Self {
            status: VerificationStatus::Pending,
            tx_signature: None,
            confirmed_at: None,
            block_height: None,
        }
    }

    pub fn confirmed(tx_signature: impl Into<String>, block_height: u64) -> Self {
        Self {
            status: VerificationStatus::Confirmed,
            tx_signature: Some(tx_signature.into()),
            confirmed_at: Some(Utc::now()),
            block_height: Some(block_height),
        }
    }
}

/// Ciphertext staged off-ledger, awaiting on-chain registration.
///
/// Lives in the pending store until the matching `CidHandleRegistered`
/// event promotes it, or until its TTL expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCiphertext {
    pub handle: String,
    pub ciphertext_blob: serde_json::Value,
    #[serde(with = "hash256_hex")]
    pub content_hash: Hash256,
    pub enc_params: EncryptionParams,
    pub policy_ctx: serde_json::Value,
    #[serde(with = "hash256_hex")]
    pub policy_hash: Hash256,
    #[serde(with = "pubkey_base58")]
    pub owner: Pubkey,
    pub storage_ref: String,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingCiphertext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        handle: impl Into<String>,
        ciphertext_blob: serde_json::Value,
        content_hash: Hash256,
        enc_params: EncryptionParams,
        policy_ctx: serde_json::Value,
        policy_hash: Hash256,
        owner: Pubkey,
        storage_ref: impl Into<String>,
        provenance: Provenance,
        ttl_secs: i64,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            handle: handle.into(),
            ciphertext_blob,
            content_hash,
            enc_params,
            policy_ctx,
            policy_hash,
            owner,
            storage_ref: storage_ref.into(),
            provenance,
            created_at,
            expires_at: created_at + Duration::seconds(ttl_secs),
        }
    }

    /// Serialized blob size, counted against the store's byte bound
    pub fn blob_size(&self) -> usize {
        self.ciphertext_blob.to_string().len()
    }
}

/// Ledger-confirmed ciphertext record.
///
/// Superset of [`PendingCiphertext`] with a verification block. The blob may
/// be overwritten in place by a worker's computed result; everything else is
/// immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedCiphertext {
    pub handle: String,
    pub ciphertext_blob: serde_json::Value,
    #[serde(with = "hash256_hex")]
    pub content_hash: Hash256,
    pub enc_params: EncryptionParams,
    pub policy_ctx: serde_json::Value,
    #[serde(with = "hash256_hex")]
    pub policy_hash: Hash256,
    #[serde(with = "pubkey_base58")]
    pub owner: Pubkey,
    pub storage_ref: String,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_slot: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub verification: VerificationInfo,
}

impl ConfirmedCiphertext {
    /// Promote a staged record, preserving its content and policy binding
    pub fn from_pending(pending: PendingCiphertext) -> Self {
        Self {
            handle: pending.handle,
            ciphertext_blob: pending.ciphertext_blob,
            content_hash: pending.content_hash,
            enc_params: pending.enc_params,
            policy_ctx: pending.policy_ctx,
            policy_hash: pending.policy_hash,
            owner: pending.owner,
            storage_ref: pending.storage_ref,
            provenance: pending.provenance,
            registered_slot: None,
            created_at: Utc::now(),
            verification: VerificationInfo::pending(),
        }
    }

    /// Build a degraded record for a handle seen on-chain with no staged
    /// data (late registration or a restart wiped the pending store). Only
    /// the hashes and owner are authoritative.
    pub fn degraded(
        handle: impl Into<String>,
        ciphertext_hash: Hash256,
        policy_hash: Hash256,
        owner: Pubkey,
        slot: u64,
    ) -> Self {
        Self {
            handle: handle.into(),
            ciphertext_blob: serde_json::json!({
                "note": "Ciphertext data not available - registered before server start",
            }),
            content_hash: ciphertext_hash,
            enc_params: EncryptionParams::new("unknown"),
            policy_ctx: serde_json::json!({
                "note": "Policy context not available",
            }),
            policy_hash,
            owner,
            storage_ref: derive_storage_ref(&ciphertext_hash),
            provenance: Provenance::OnChainEvent,
            registered_slot: Some(slot),
            created_at: Utc::now(),
            verification: VerificationInfo::pending(),
        }
    }

    /// Serialized blob size, counted against the store's byte bound
    pub fn blob_size(&self) -> usize {
        self.ciphertext_blob.to_string().len()
    }
}

/// Pending store counters for the status surface
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PendingStats {
    pub total: usize,
    pub expiring_soon: usize,
    pub oldest_age_secs: Option<i64>,
}

/// Confirmed store counters for the status surface
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CiphertextStats {
    pub total: usize,
    pub confirmed: usize,
    pub pending: usize,
    pub expired: usize,
    pub total_bytes: usize,
}
