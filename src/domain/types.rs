//! Core type definitions for Gatewatch
//!
//! Shared hash aliases, serde helpers for chain-native encodings, and the
//! operation registry used across the ledger, queue, and API layers.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::sync::OnceLock;

use crate::crypto::derive_operation_digest;

/// 32-byte hash (SHA-256)
pub type Hash256 = [u8; 32];

/// Maximum CID handles per job or registration batch, enforced on-chain
pub const MAX_CIDS: usize = 16;

/// Serde module for Hash256 as 0x-prefixed hex strings
pub mod hash256_hex {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let hex_str = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(hex_str).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes for Hash256"))
    }
}

/// Serde module for optional Hash256 as 0x-prefixed hex strings
pub mod option_hash256_hex {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(opt: &Option<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match opt {
            Some(bytes) => serializer.serialize_some(&format!("0x{}", hex::encode(bytes))),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => {
                let hex_str = s.strip_prefix("0x").unwrap_or(&s);
                let bytes = hex::decode(hex_str).map_err(serde::de::Error::custom)?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("expected 32 bytes for Hash256"))?;
                Ok(Some(arr))
            }
            None => Ok(None),
        }
    }
}

/// Serde module for Vec<Hash256> as 0x-prefixed hex strings
pub mod vec_hash256_hex {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use serde::ser::SerializeSeq;

    pub fn serialize<S>(hashes: &[[u8; 32]], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(hashes.len()))?;
        for hash in hashes {
            seq.serialize_element(&format!("0x{}", hex::encode(hash)))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let strings: Vec<String> = Vec::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| {
                let hex_str = s.strip_prefix("0x").map(str::to_owned).unwrap_or(s);
                let bytes = hex::decode(&hex_str).map_err(serde::de::Error::custom)?;
                bytes
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("expected 32 bytes for Hash256"))
            })
            .collect()
    }
}

/// Serde module for optional 64-byte values as 0x-prefixed hex strings
pub mod option_bytes64_hex {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(opt: &Option<[u8; 64]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match opt {
            Some(bytes) => serializer.serialize_some(&format!("0x{}", hex::encode(bytes))),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 64]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => {
                let hex_str = s.strip_prefix("0x").unwrap_or(&s);
                let bytes = hex::decode(hex_str).map_err(serde::de::Error::custom)?;
                let arr: [u8; 64] = bytes
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("expected 64 bytes"))?;
                Ok(Some(arr))
            }
            None => Ok(None),
        }
    }
}

/// Serde module for Pubkey as base58 strings
pub mod pubkey_base58 {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&key.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Pubkey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde module for Vec<Pubkey> as base58 strings
pub mod vec_pubkey_base58 {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use serde::ser::SerializeSeq;
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S>(keys: &[Pubkey], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(keys.len()))?;
        for key in keys {
            seq.serialize_element(&key.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Pubkey>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let strings: Vec<String> = Vec::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| Pubkey::from_str(&s).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Parse a 0x-prefixed (or bare) 64-character hex string into a Hash256
pub fn parse_hash256(s: &str) -> Result<Hash256, String> {
    let hex_str = s.strip_prefix("0x").unwrap_or(s);
    if hex_str.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex_str.len()));
    }
    let bytes = hex::decode(hex_str).map_err(|e| e.to_string())?;
    bytes.try_into().map_err(|_| "expected 32 bytes".to_string())
}

/// Store key for a CID handle account: bare hex of the address bytes
pub fn cid_handle_hex(cid: &Pubkey) -> String {
    hex::encode(cid.to_bytes())
}

/// Job provenance as encoded on-chain (single byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobProvenance {
    Server,
    Client,
    Oracle,
    Dapp,
}

impl JobProvenance {
    /// Decode the wire byte; unknown values fall back to Client
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => JobProvenance::Server,
            1 => JobProvenance::Client,
            2 => JobProvenance::Oracle,
            3 => JobProvenance::Dapp,
            _ => JobProvenance::Client,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            JobProvenance::Server => 0,
            JobProvenance::Client => 1,
            JobProvenance::Oracle => 2,
            JobProvenance::Dapp => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobProvenance::Server => "server",
            JobProvenance::Client => "client",
            JobProvenance::Oracle => "oracle",
            JobProvenance::Dapp => "dapp",
        }
    }
}

impl fmt::Display for JobProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Supported confidential operations.
///
/// Each kind carries a fixed, namespaced IR digest derived at first use, so
/// submitters and the coordinator agree on the digest for a given operation
/// without a registry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Deposit,
    Withdraw,
    Borrow,
    Liquidation,
}

impl OperationKind {
    /// All operations, ordered by discriminant
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Deposit,
        OperationKind::Withdraw,
        OperationKind::Borrow,
        OperationKind::Liquidation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "deposit",
            OperationKind::Withdraw => "withdraw",
            OperationKind::Borrow => "borrow",
            OperationKind::Liquidation => "liquidation",
        }
    }

    /// Expected ciphertext input count, used for diagnostics only
    pub fn input_arity(&self) -> usize {
        match self {
            OperationKind::Deposit => 2,
            OperationKind::Withdraw => 2,
            OperationKind::Borrow => 3,
            OperationKind::Liquidation => 3,
        }
    }

    /// Namespaced IR digest for this operation
    pub fn ir_digest(&self) -> Hash256 {
        operation_digest_table()[*self as usize].1
    }

    /// Resolve an operation from its IR digest
    pub fn from_ir_digest(digest: &Hash256) -> Option<Self> {
        operation_digest_table()
            .iter()
            .find(|(_, d)| d == digest)
            .map(|(op, _)| *op)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn operation_digest_table() -> &'static [(OperationKind, Hash256); 4] {
    static TABLE: OnceLock<[(OperationKind, Hash256); 4]> = OnceLock::new();
    TABLE.get_or_init(|| OperationKind::ALL.map(|op| (op, derive_operation_digest(op.name()))))
}

/// Verify the operation digest table has no collisions.
///
/// Called once at startup; a collision would make digest-based lookup
/// ambiguous and is a fatal configuration error.
pub fn validate_operation_digests() -> Result<(), String> {
    let table = operation_digest_table();
    for i in 0..table.len() {
        for j in (i + 1)..table.len() {
            if table[i].1 == table[j].1 {
                return Err(format!(
                    "duplicate IR digest between operations {} and {}",
                    table[i].0, table[j].0
                ));
            }
        }
    }
    Ok(())
}

/// Derive the program address for a CID handle from its binding seeds.
///
/// Seeds: `["cid", ciphertext_hash, policy_hash, owner]` under the
/// gatekeeper program, matching the on-chain account derivation.
pub fn derive_cid_handle(
    program_id: &Pubkey,
    ciphertext_hash: &Hash256,
    policy_hash: &Hash256,
    owner: &Pubkey,
) -> Pubkey {
    let (address, _bump) = Pubkey::find_program_address(
        &[b"cid", ciphertext_hash, policy_hash, owner.as_ref()],
        program_id,
    );
    address
}
