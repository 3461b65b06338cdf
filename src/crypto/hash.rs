//! Deterministic hashing for CID sets, policies, and commitments
//!
//! All hashes are SHA-256. JSON-valued inputs (policy contexts, ciphertext
//! blobs) are canonicalized per RFC 8785 (JCS) before hashing so that the
//! same logical document always yields the same digest regardless of key
//! order or whitespace:
//! - Deterministic key ordering (lexicographic UTF-8)
//! - ES6-compatible number serialization (handles floats, -0, etc.)
//! - Proper Unicode handling
//!
//! The derivations here mirror what the on-chain program commits to:
//! `commitment = SHA256(cid_set_id || ir_digest || policy_hash || domain_hash || nonce)`

use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;

/// 32-byte SHA-256 hash
pub type Hash256 = [u8; 32];

// ============================================================================
// Domain Separation Constants
// ============================================================================

/// Domain prefix for deterministic result handle derivation
pub const DOMAIN_RESULT_HANDLE: &[u8] = b"GATEWATCH_RESULT_HANDLE_V1";

/// Domain prefix for operation IR digest derivation
pub const DOMAIN_OPERATION_DIGEST: &[u8] = b"GATEWATCH_OPERATION_V1";

/// Domain prefix for verifier re-execution digests
pub const DOMAIN_LEAF_REEXEC: &[u8] = b"GATEWATCH_LEAF_REEXEC_V1";

// ============================================================================
// Canonical JSON (RFC 8785 JCS)
// ============================================================================

/// Convert JSON value to canonical string representation per RFC 8785 (JCS).
///
/// # Panics
///
/// Panics if the JSON value contains a float that cannot be represented
/// (NaN or Infinity). Per RFC 8785, these are not valid JSON.
pub fn canonicalize_json(value: &serde_json::Value) -> String {
    serde_json_canonicalizer::to_string(value)
        .expect("Failed to canonicalize JSON - contains invalid values (NaN or Infinity)")
}

/// Compute SHA-256 hash of canonical JSON representation
pub fn canonical_json_hash(value: &serde_json::Value) -> Hash256 {
    let canonical = canonicalize_json(value);
    sha256(canonical.as_bytes())
}

// ============================================================================
// Core Derivations
// ============================================================================

/// Hash raw bytes with SHA-256
pub fn sha256(data: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the CID set identifier for an ordered list of handles.
///
/// `cid_set_id = SHA256(handle_0 || handle_1 || ... || handle_n)`
///
/// Order matters: a permuted handle list yields a different set id.
pub fn compute_cid_set_id(handles: &[Pubkey]) -> Hash256 {
    let mut hasher = Sha256::new();
    for handle in handles {
        hasher.update(handle.to_bytes());
    }
    hasher.finalize().into()
}

/// Compute the policy hash from a policy context document.
///
/// `policy_hash = SHA256(JCS(policy_ctx))`
pub fn compute_policy_hash(policy_ctx: &serde_json::Value) -> Hash256 {
    canonical_json_hash(policy_ctx)
}

/// Compute the domain hash binding a key epoch to a chain and program.
///
/// `domain_hash = SHA256(chain_id || program || cpk_id || DEC(key_epoch))`
///
/// Plain UTF-8 concatenation with the epoch rendered in decimal, matching
/// what submitters hash into their commitments.
pub fn compute_domain_hash(chain_id: &str, program: &str, cpk_id: &str, key_epoch: u64) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(chain_id.as_bytes());
    hasher.update(program.as_bytes());
    hasher.update(cpk_id.as_bytes());
    hasher.update(key_epoch.to_string().as_bytes());
    hasher.finalize().into()
}

/// Compute a job commitment.
///
/// `commitment = SHA256(cid_set_id || ir_digest || policy_hash || domain_hash || nonce)`
pub fn compute_commitment(
    cid_set_id: &Hash256,
    ir_digest: &Hash256,
    policy_hash: &Hash256,
    domain_hash: &Hash256,
    nonce: &Hash256,
) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(cid_set_id);
    hasher.update(ir_digest);
    hasher.update(policy_hash);
    hasher.update(domain_hash);
    hasher.update(nonce);
    hasher.finalize().into()
}

/// Derive the deterministic result handle for a job.
///
/// `result_handle = BASE58(SHA256(b"GATEWATCH_RESULT_HANDLE_V1" || job_id))`
///
/// Re-posting a result for the same job always lands on the same handle, so
/// result storage is idempotent and plan output handles are predictable.
pub fn derive_result_handle(job_id: &Pubkey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_RESULT_HANDLE);
    hasher.update(job_id.to_bytes());
    let digest: Hash256 = hasher.finalize().into();
    bs58::encode(digest).into_string()
}

/// Derive an operation IR digest from its registry name.
///
/// `ir_digest = SHA256(b"GATEWATCH_OPERATION_V1" || name)`
pub fn derive_operation_digest(name: &str) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_OPERATION_DIGEST);
    hasher.update(name.as_bytes());
    hasher.finalize().into()
}

/// Reconstruct the content-addressed storage reference for a content hash.
///
/// Mirrors the off-chain uploader's convention: `ipfs://Qm` followed by a
/// 46-character slice of the hex digest.
pub fn derive_storage_ref(content_hash: &Hash256) -> String {
    let hex_digest = hex::encode(content_hash);
    format!("ipfs://Qm{}", &hex_digest[2..48])
}

/// Deterministic re-execution digest for one leaf of a committed batch.
///
/// `SHA256(b"GATEWATCH_LEAF_REEXEC_V1" || commit_id || leaf_index_le)`
///
/// Every honest verifier re-executing the same leaf derives the same digest.
pub fn derive_leaf_digest(commit_id: &str, leaf_index: u64) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_LEAF_REEXEC);
    hasher.update(commit_id.as_bytes());
    hasher.update(leaf_index.to_le_bytes());
    hasher.finalize().into()
}

/// Rebuild a Merkle root from a leaf digest and its sibling path.
///
/// Sibling order at each level follows the leaf index parity: an odd index
/// hashes as the right child. An empty proof returns the leaf itself.
pub fn fold_merkle_proof(leaf: &Hash256, leaf_index: u64, proof: &[Hash256]) -> Hash256 {
    let mut current = *leaf;
    let mut index = leaf_index;

    for sibling in proof {
        let mut hasher = Sha256::new();
        if index & 1 == 1 {
            hasher.update(sibling);
            hasher.update(current);
        } else {
            hasher.update(current);
            hasher.update(sibling);
        }
        current = hasher.finalize().into();
        index >>= 1;
    }
    current
}

/// Render a 32-byte hash as a `0x`-prefixed lowercase hex string
pub fn hash_to_hex(hash: &Hash256) -> String {
    format!("0x{}", hex::encode(hash))
}

// ============================================================================
// Tests
// ============================================================================


// ============================================================================
// RFC 8785 Edge Case Test Vectors
// ============================================================================
