//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;

use gatewatch::crypto::{canonical_json_hash, compute_cid_set_id, compute_policy_hash};
use gatewatch::domain::{
    cid_handle_hex, ConfirmedCiphertext, EncryptionParams, JobProvenance, JobStatus,
    PendingCiphertext, Provenance, QueuedJob, VerificationInfo,
};
use gatewatch::infra::{
    BatchPlanner, ChallengeCoordinator, CidValidator, CiphertextStore, InMemoryCiphertextStore,
    InMemoryJobQueue, InMemoryPendingStore, InMemoryRegistrationLog, JobQueue, PendingStore,
    RegistrationLog, Result,
};
use gatewatch::ledger::{ConnectionConfig, EventListener, LedgerReader};
use gatewatch::server::{AppState, Config};
use gatewatch::Hash256;

/// Ledger reader that never answers; the listener is not exercised through
/// the HTTP surface in these tests.
pub struct UnreachableLedger;

#[async_trait]
impl LedgerReader for UnreachableLedger {
    async fn account_data(&self, address: &Pubkey) -> Result<Vec<u8>> {
        Err(gatewatch::GatewatchError::event(format!(
            "no ledger in tests: {address}"
        )))
    }

    async fn block_time(&self, _slot: u64) -> Result<i64> {
        Err(gatewatch::GatewatchError::event("no ledger in tests"))
    }
}

/// Build an [`AppState`] over fresh in-memory stores and a stub ledger.
pub fn create_test_state() -> AppState {
    let config = Config {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        pending_ttl_secs: 300,
        pending_sweep_secs: 30,
        store_capacity: 1000,
        max_ciphertext_bytes: 1_048_576,
        listener_autostart: false,
    };

    let pending: Arc<dyn PendingStore> = Arc::new(InMemoryPendingStore::new(
        config.store_capacity,
        config.max_ciphertext_bytes,
    ));
    let ciphertexts: Arc<dyn CiphertextStore> =
        Arc::new(InMemoryCiphertextStore::new(config.store_capacity));
    let registrations: Arc<dyn RegistrationLog> = Arc::new(InMemoryRegistrationLog::new());
    let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
    let validator = Arc::new(CidValidator::new(ciphertexts.clone()));
    let planner = Arc::new(BatchPlanner::new(queue.clone()));
    let challenges = Arc::new(ChallengeCoordinator::with_default_verifiers());

    let connection = ConnectionConfig::default();
    let listener = EventListener::new(
        connection,
        Arc::new(UnreachableLedger),
        pending.clone(),
        ciphertexts.clone(),
        registrations.clone(),
        queue.clone(),
        validator.clone(),
    );

    AppState {
        config,
        pending,
        ciphertexts,
        registrations,
        queue,
        validator,
        planner,
        challenges,
        listener,
    }
}

/// Build the full application router over a test state.
pub fn create_test_router(state: AppState) -> axum::Router {
    gatewatch::server::build_router()
        .expect("router construction")
        .with_state(state)
}

/// A ciphertext blob as a client would submit it
pub fn sample_blob(seed: u8) -> serde_json::Value {
    json!({
        "ct": base64_like(seed),
        "nonce": format!("{:02x}", seed),
    })
}

fn base64_like(seed: u8) -> String {
    format!("Q2lwaGVydGV4dF{:03}", seed)
}

/// Default owner-controlled policy context
pub fn sample_policy_ctx() -> serde_json::Value {
    json!({
        "allow": ["decrypt"],
        "version": "1.0",
        "decrypt_by": "owner",
    })
}

/// A confirmed ciphertext keyed by a fresh unique handle.
///
/// Returns the record together with the CID pubkey it was derived for.
pub fn confirmed_ciphertext(owner: Pubkey, seed: u8) -> (Pubkey, ConfirmedCiphertext) {
    let cid = Pubkey::new_unique();
    let blob = sample_blob(seed);
    let content_hash = canonical_json_hash(&blob);
    let policy_ctx = sample_policy_ctx();
    let record = ConfirmedCiphertext {
        handle: cid_handle_hex(&cid),
        ciphertext_blob: blob,
        content_hash,
        enc_params: EncryptionParams::default(),
        policy_ctx: policy_ctx.clone(),
        policy_hash: compute_policy_hash(&policy_ctx),
        owner,
        storage_ref: format!("ipfs://QmTest{seed}"),
        provenance: Provenance::Client,
        registered_slot: Some(100),
        created_at: Utc::now(),
        verification: VerificationInfo::confirmed("tx-sig", 100),
    };
    (cid, record)
}

/// A staged ciphertext awaiting on-chain confirmation.
pub fn pending_ciphertext(owner: Pubkey, seed: u8, ttl_secs: i64) -> PendingCiphertext {
    let cid = Pubkey::new_unique();
    let blob = sample_blob(seed);
    let content_hash = canonical_json_hash(&blob);
    let policy_ctx = sample_policy_ctx();
    PendingCiphertext::new(
        cid_handle_hex(&cid),
        blob,
        content_hash,
        EncryptionParams::default(),
        policy_ctx.clone(),
        compute_policy_hash(&policy_ctx),
        owner,
        format!("ipfs://QmTest{seed}"),
        Provenance::Client,
        ttl_secs,
    )
}

/// A queued job over the given ciphertext handles.
pub fn sample_job(slot: u64, batch_id: Pubkey, handles: Vec<Pubkey>) -> QueuedJob {
    let cid_set_id = compute_cid_set_id(&handles);
    QueuedJob {
        job_id: Pubkey::new_unique(),
        submitter: Pubkey::new_unique(),
        batch_id,
        commitment: [1u8; 32],
        cid_set_id,
        handles,
        ir_digest: [3u8; 32],
        policy_hash: [4u8; 32],
        provenance: JobProvenance::Client,
        queued_at: Utc::now(),
        submitted_at: 1_700_000_000,
        slot,
        tx_signature: "sig".to_string(),
        status: JobStatus::Queued,
        executor: None,
        execution_started_at: None,
        execution_completed_at: None,
        result_handle: None,
        error: None,
    }
}

/// Enqueue a job whose input ciphertexts are already confirmed in the store.
pub async fn seed_executable_job(state: &AppState, slot: u64, batch_id: Pubkey) -> QueuedJob {
    let owner = Pubkey::new_unique();
    let (cid_a, ct_a) = confirmed_ciphertext(owner, slot as u8);
    let (cid_b, ct_b) = confirmed_ciphertext(owner, slot as u8 + 1);
    state.ciphertexts.insert(ct_a).await.unwrap();
    state.ciphertexts.insert(ct_b).await.unwrap();

    let job = sample_job(slot, batch_id, vec![cid_a, cid_b]);
    state.queue.enqueue(job.clone()).await.unwrap()
}

/// A well-formed 32-byte digest rendered as 0x-prefixed hex
pub fn hex_digest(fill: u8) -> String {
    format!("0x{}", hex::encode([fill; 32]))
}

/// Parse a hash literal for assertions
pub fn digest(fill: u8) -> Hash256 {
    [fill; 32]
}
