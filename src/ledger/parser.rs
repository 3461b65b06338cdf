//! Program log parsing
//!
//! Gatekeeper events arrive as `Program data: <base64>` log lines where the
//! payload is an 8-byte discriminator followed by the event body
//! (little-endian integers, u32-count-prefixed lists, optionals as a 1-byte
//! flag then the value). Dispatch is table-driven: one row per event kind.
//!
//! Discriminator values are fixed wire constants assigned by the deployed
//! program. Do not regenerate them.

use std::sync::OnceLock;

use base64::Engine;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, warn};

use crate::domain::{
    BatchFinalizedEvent, BatchPostedEvent, CidHandleRegisteredEvent, DomainEvent, EventKind,
    Hash256, JobSubmittedEvent, RevealRequestedEvent,
};
use crate::infra::{GatewatchError, Result};

/// Prefix of log lines that carry an event payload
pub const EVENT_LOG_PREFIX: &str = "Program data: ";

const CID_HANDLE_REGISTERED: [u8; 8] = [140, 222, 163, 76, 56, 94, 99, 100];
const JOB_SUBMITTED: [u8; 8] = [129, 204, 35, 127, 38, 50, 131, 248];
const BATCH_POSTED: [u8; 8] = [154, 80, 3, 154, 143, 131, 227, 239];
const BATCH_FINALIZED: [u8; 8] = [27, 17, 160, 189, 95, 165, 89, 191];
const REVEAL_REQUESTED: [u8; 8] = [177, 216, 27, 24, 210, 88, 74, 198];

type DecodeFn = fn(&[u8]) -> Result<EventKind>;

struct EventRow {
    discriminator: [u8; 8],
    name: &'static str,
    decode: DecodeFn,
}

fn event_table() -> &'static [EventRow; 5] {
    static TABLE: OnceLock<[EventRow; 5]> = OnceLock::new();
    TABLE.get_or_init(|| {
        [
            EventRow {
                discriminator: CID_HANDLE_REGISTERED,
                name: "CidHandleRegistered",
                decode: decode_cid_handle_registered,
            },
            EventRow {
                discriminator: JOB_SUBMITTED,
                name: "JobSubmitted",
                decode: decode_job_submitted,
            },
            EventRow {
                discriminator: BATCH_POSTED,
                name: "BatchPosted",
                decode: decode_batch_posted,
            },
            EventRow {
                discriminator: BATCH_FINALIZED,
                name: "BatchFinalized",
                decode: decode_batch_finalized,
            },
            EventRow {
                discriminator: REVEAL_REQUESTED,
                name: "RevealRequested",
                decode: decode_reveal_requested,
            },
        ]
    })
}

/// Verify the event table has no duplicate discriminators.
///
/// Called once at startup; a duplicate would make dispatch nondeterministic
/// and is a fatal configuration error.
pub fn validate_event_table() -> Result<()> {
    let table = event_table();
    for i in 0..table.len() {
        for j in (i + 1)..table.len() {
            if table[i].discriminator == table[j].discriminator {
                return Err(GatewatchError::configuration(format!(
                    "duplicate event discriminator between {} and {}",
                    table[i].name, table[j].name
                )));
            }
        }
    }
    Ok(())
}

/// Parse all gatekeeper events from one transaction's log lines.
///
/// `log_index` is the position of the source line within the full log
/// array. Every line counts, matched or not, so indexes stay stable when
/// the runtime interleaves invoke and compute lines with event data.
///
/// A malformed line is logged and dropped without affecting the
/// transaction's other lines; this function never panics on hostile input.
pub fn parse_transaction_logs(
    logs: &[String],
    slot: u64,
    tx_signature: &str,
    block_time: i64,
) -> Vec<DomainEvent> {
    let mut events = Vec::new();

    for (log_index, line) in logs.iter().enumerate() {
        let Some(payload) = extract_event_payload(line) else {
            continue;
        };

        match decode_event(&payload) {
            Ok(Some(kind)) => {
                debug!(
                    event = kind.name(),
                    tx = short(tx_signature),
                    log_index,
                    "parsed event"
                );
                events.push(DomainEvent {
                    tx_signature: tx_signature.to_string(),
                    slot,
                    block_time,
                    log_index,
                    kind,
                });
            }
            // Unknown discriminator or sub-8-byte payload, already logged
            Ok(None) => {}
            Err(e) => {
                warn!(
                    error = %e,
                    tx = short(tx_signature),
                    line = line.get(..100).unwrap_or(line),
                    "failed to decode event"
                );
            }
        }
    }

    events
}

/// Pull the base64 payload out of a log line, if it carries one
fn extract_event_payload(line: &str) -> Option<Vec<u8>> {
    let (_, encoded) = line.split_once(EVENT_LOG_PREFIX)?;
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return None;
    }

    match base64::engine::general_purpose::STANDARD.decode(encoded) {
        Ok(data) => Some(data),
        Err(e) => {
            warn!(error = %e, line = line.get(..100).unwrap_or(line), "event payload is not valid base64");
            None
        }
    }
}

fn decode_event(data: &[u8]) -> Result<Option<EventKind>> {
    if data.len() < 8 {
        warn!(length = data.len(), "event payload too short");
        return Ok(None);
    }

    let (discriminator, body) = data.split_at(8);
    for row in event_table() {
        if row.discriminator.as_slice() == discriminator {
            return (row.decode)(body).map(Some);
        }
    }

    debug!(
        discriminator = %hex::encode(discriminator),
        "unknown event discriminator"
    );
    Ok(None)
}

/// cid(32) owner(32) ciphertext_hash(32) policy_hash(32) slot(u64)
fn decode_cid_handle_registered(body: &[u8]) -> Result<EventKind> {
    if body.len() < 136 {
        return Err(GatewatchError::parse(format!(
            "CidHandleRegistered body too short: {} bytes",
            body.len()
        )));
    }

    // Trailing slot bytes are ignored; the notification slot is authoritative.
    Ok(EventKind::CidHandleRegistered(CidHandleRegisteredEvent {
        cid: read_pubkey(body, 0)?,
        owner: read_pubkey(body, 32)?,
        ciphertext_hash: read_array::<32>(body, 64)?,
        policy_hash: read_array::<32>(body, 96)?,
    }))
}

/// job(32) batch(32) cid_set_id(32) count(u32) handles(count x 32)
/// commitment(32) ir_digest(32) provenance(u8) slot(u64)
fn decode_job_submitted(body: &[u8]) -> Result<EventKind> {
    let job = read_pubkey(body, 0)?;
    let batch = read_pubkey(body, 32)?;
    let cid_set_id = read_array::<32>(body, 64)?;

    let count = read_u32_le(body, 96)? as usize;
    // Bound the declared count by what the buffer can actually hold before
    // allocating; the fixed tail is commitment + ir_digest + provenance.
    let handles_len = count
        .checked_mul(32)
        .ok_or_else(|| GatewatchError::parse("JobSubmitted handle count overflows"))?;
    if 100 + handles_len + 65 > body.len() {
        return Err(GatewatchError::parse(format!(
            "JobSubmitted body too short for {} handles: {} bytes",
            count,
            body.len()
        )));
    }

    let mut offset = 100;
    let mut cid_handles = Vec::with_capacity(count);
    for _ in 0..count {
        cid_handles.push(read_pubkey(body, offset)?);
        offset += 32;
    }

    let commitment = read_array::<32>(body, offset)?;
    offset += 32;
    let ir_digest = read_array::<32>(body, offset)?;
    offset += 32;
    let provenance = read_u8(body, offset)?;

    Ok(EventKind::JobSubmitted(JobSubmittedEvent {
        job,
        batch,
        cid_set_id,
        cid_handles,
        commitment,
        ir_digest,
        provenance,
    }))
}

/// batch(32) window_start_slot(u64) commit_root(32) result_commitment(32)
/// processed_until_slot(u64) posted_slot(u64) window_end_slot(u64)
fn decode_batch_posted(body: &[u8]) -> Result<EventKind> {
    if body.len() < 128 {
        return Err(GatewatchError::parse(format!(
            "BatchPosted body too short: {} bytes",
            body.len()
        )));
    }

    Ok(EventKind::BatchPosted(BatchPostedEvent {
        batch: read_pubkey(body, 0)?,
        window_start_slot: read_u64_le(body, 32)?,
        commit_root: read_array::<32>(body, 40)?,
        result_commitment: read_array::<32>(body, 72)?,
        processed_until_slot: read_u64_le(body, 104)?,
        posted_slot: read_u64_le(body, 112)?,
        window_end_slot: read_u64_le(body, 120)?,
    }))
}

/// batch(32) window_start_slot(u64) result_commitment(32) finalized_slot(u64)
fn decode_batch_finalized(body: &[u8]) -> Result<EventKind> {
    if body.len() < 80 {
        return Err(GatewatchError::parse(format!(
            "BatchFinalized body too short: {} bytes",
            body.len()
        )));
    }

    Ok(EventKind::BatchFinalized(BatchFinalizedEvent {
        batch: read_pubkey(body, 0)?,
        window_start_slot: read_u64_le(body, 32)?,
        result_commitment: read_array::<32>(body, 40)?,
        finalized_slot: read_u64_le(body, 72)?,
    }))
}

/// handle(32) requester(32) is_public(u8) user_session_pubkey(Option<[u8;32]>)
/// domain_signature(Option<[u8;64]>) slot(u64)
fn decode_reveal_requested(body: &[u8]) -> Result<EventKind> {
    let handle = read_array::<32>(body, 0)?;
    let requester = read_pubkey(body, 32)?;
    let is_public = read_u8(body, 64)? == 1;

    let mut offset = 65;
    let user_session_pubkey = if read_u8(body, offset)? == 1 {
        offset += 1;
        let key = read_array::<32>(body, offset)?;
        offset += 32;
        Some(key)
    } else {
        offset += 1;
        None
    };

    let domain_signature = if read_u8(body, offset)? == 1 {
        offset += 1;
        Some(read_array::<64>(body, offset)?)
    } else {
        None
    };

    Ok(EventKind::RevealRequested(RevealRequestedEvent {
        handle,
        requester,
        is_public,
        user_session_pubkey,
        domain_signature,
    }))
}

/// Gatekeeper job account state.
///
/// The listener decodes this after a `JobSubmitted` event to recover
/// `submitter` and `policy_hash`, which the event body does not carry.
#[derive(Debug, Clone, PartialEq)]
pub struct JobAccount {
    pub batch: Pubkey,
    pub cid_set_id: Hash256,
    pub cid_count: u16,
    pub commitment: Hash256,
    pub ir_digest: Hash256,
    pub policy_hash: Hash256,
    pub provenance: u8,
    pub submitter: Pubkey,
    pub submitted_slot: u64,
}

/// Minimum serialized job account length, including the 8-byte
/// account discriminator
pub const JOB_ACCOUNT_MIN_LEN: usize = 212;

impl JobAccount {
    /// Decode from raw account data.
    ///
    /// Layout after the account discriminator: batch(32) cid_set_id(32)
    /// cid_count(u16) commitment(32) ir_digest(32) policy_hash(32)
    /// provenance(u8) submitter(32) submitted_slot(u64) bump(u8).
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < JOB_ACCOUNT_MIN_LEN {
            return Err(GatewatchError::parse(format!(
                "job account too short: {} bytes",
                data.len()
            )));
        }

        let body = &data[8..];
        Ok(Self {
            batch: read_pubkey(body, 0)?,
            cid_set_id: read_array::<32>(body, 32)?,
            cid_count: read_u16_le(body, 64)?,
            commitment: read_array::<32>(body, 66)?,
            ir_digest: read_array::<32>(body, 98)?,
            policy_hash: read_array::<32>(body, 130)?,
            provenance: read_u8(body, 162)?,
            submitter: read_pubkey(body, 163)?,
            submitted_slot: read_u64_le(body, 195)?,
        })
    }
}

/// Gatekeeper CID handle account state, fetched for existence confirmation
#[derive(Debug, Clone, PartialEq)]
pub struct CidHandleAccount {
    pub ciphertext_hash: Hash256,
    pub policy_hash: Hash256,
    pub owner: Pubkey,
    pub registered_at: u64,
}

/// Minimum serialized CID handle account length, including the 8-byte
/// account discriminator
pub const CID_ACCOUNT_MIN_LEN: usize = 113;

impl CidHandleAccount {
    /// Decode from raw account data.
    ///
    /// Layout after the account discriminator: ciphertext_hash(32)
    /// policy_hash(32) owner(32) registered_at(u64) bump(u8).
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < CID_ACCOUNT_MIN_LEN {
            return Err(GatewatchError::parse(format!(
                "cid handle account too short: {} bytes",
                data.len()
            )));
        }

        let body = &data[8..];
        Ok(Self {
            ciphertext_hash: read_array::<32>(body, 0)?,
            policy_hash: read_array::<32>(body, 32)?,
            owner: read_pubkey(body, 64)?,
            registered_at: read_u64_le(body, 96)?,
        })
    }
}

fn short(signature: &str) -> &str {
    signature.get(..8).unwrap_or(signature)
}

fn read_array<const N: usize>(body: &[u8], offset: usize) -> Result<[u8; N]> {
    let slice = body
        .get(offset..offset + N)
        .ok_or_else(|| GatewatchError::parse(format!("body truncated at offset {}", offset)))?;
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    Ok(out)
}

fn read_pubkey(body: &[u8], offset: usize) -> Result<Pubkey> {
    Ok(Pubkey::new_from_array(read_array::<32>(body, offset)?))
}

fn read_u8(body: &[u8], offset: usize) -> Result<u8> {
    Ok(read_array::<1>(body, offset)?[0])
}

fn read_u16_le(body: &[u8], offset: usize) -> Result<u16> {
    Ok(u16::from_le_bytes(read_array::<2>(body, offset)?))
}

fn read_u32_le(body: &[u8], offset: usize) -> Result<u32> {
    Ok(u32::from_le_bytes(read_array::<4>(body, offset)?))
}

fn read_u64_le(body: &[u8], offset: usize) -> Result<u64> {
    Ok(u64::from_le_bytes(read_array::<8>(body, offset)?))
}
