//! REST API integration tests for Gatewatch.
//!
//! These tests drive the real router over fresh in-memory stores; the
//! ledger is stubbed out, so jobs are seeded directly through the queue.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use tower::ServiceExt;

use gatewatch::crypto::derive_result_handle;
use gatewatch::domain::JobStatus;
use gatewatch::infra::{CiphertextStore as _, JobQueue as _, PendingStore as _};

use common::*;

// ============================================================================
// Test Helpers
// ============================================================================

/// Send a request to the test router.
async fn send_request(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }

    let body = body
        .map(|v| Body::from(serde_json::to_vec(&v).unwrap()))
        .unwrap_or_else(|| Body::from(Vec::new()));

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();

    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec();

    let json = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&bytes) }))
    };

    (status, json)
}

// ============================================================================
// Health and status
// ============================================================================

#[tokio::test]
async fn test_health_and_ready() {
    let app = create_test_router(create_test_state());

    let (status, body) = send_request(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "gatewatch");

    let (status, body) = send_request(&app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["listener_running"], false);
}

#[tokio::test]
async fn test_status_reports_stores_and_operations() {
    let state = create_test_state();
    seed_executable_job(&state, 100, Pubkey::new_unique()).await;
    let app = create_test_router(state);

    let (status, body) = send_request(&app, Method::GET, "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "gatewatch");
    assert_eq!(body["queue"]["queued"], 1);
    assert_eq!(body["ciphertexts"]["confirmed"], 2);
    assert_eq!(body["domain"]["chain_id"], "devnet");

    let operations = body["operations"].as_array().unwrap();
    assert!(!operations.is_empty());
    for op in operations {
        assert!(op["ir_digest"].as_str().unwrap().starts_with("0x"));
        assert!(op["input_arity"].as_u64().unwrap() >= 1);
    }
}

// ============================================================================
// Job listing, claim, result
// ============================================================================

#[tokio::test]
async fn test_list_jobs_inlines_ciphertexts() {
    let state = create_test_state();
    let job = seed_executable_job(&state, 100, Pubkey::new_unique()).await;
    let app = create_test_router(state);

    let (status, body) = send_request(&app, Method::GET, "/api/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["status"], "queued");

    let listed = &body["jobs"][0];
    assert_eq!(listed["job_id"], job.job_id.to_string());
    let cts = listed["ciphertexts"].as_array().unwrap();
    assert_eq!(cts.len(), 2);
    for ct in cts {
        assert!(ct["ciphertext"].is_object());
        assert!(ct["ciphertext_hash"].as_str().unwrap().starts_with("0x"));
    }
}

#[tokio::test]
async fn test_list_jobs_renders_nulls_for_missing_ciphertexts() {
    let state = create_test_state();
    // Handles that were never stored.
    let job = sample_job(50, Pubkey::new_unique(), vec![Pubkey::new_unique()]);
    state.queue.enqueue(job).await.unwrap();
    let app = create_test_router(state);

    let (status, body) = send_request(&app, Method::GET, "/api/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    let ct = &body["jobs"][0]["ciphertexts"][0];
    assert!(ct["ciphertext"].is_null());
    assert!(ct["owner"].is_null());
}

#[tokio::test]
async fn test_list_jobs_rejects_unknown_status() {
    let app = create_test_router(create_test_state());
    let (status, body) =
        send_request(&app, Method::GET, "/api/jobs?status=bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_FIELD_VALUE");
}

#[tokio::test]
async fn test_claim_job_lifecycle() {
    let state = create_test_state();
    let job = seed_executable_job(&state, 100, Pubkey::new_unique()).await;
    let app = create_test_router(state);

    let uri = format!("/api/jobs/{}/claim", job.job_id);

    // Missing executor
    let (status, body) = send_request(&app, Method::POST, &uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_REQUIRED_FIELD");

    // First claim wins
    let (status, body) =
        send_request(&app, Method::POST, &uri, Some(json!({"executor": "worker-1"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"]["status"], "assigned");
    assert_eq!(body["job"]["executor"], "worker-1");

    // Second claim conflicts and reports the current status
    let (status, body) =
        send_request(&app, Method::POST, &uri, Some(json!({"executor": "worker-2"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "JOB_NOT_CLAIMABLE");
    assert_eq!(body["error"]["details"]["current_status"], "assigned");
}

#[tokio::test]
async fn test_claim_unknown_job_is_404() {
    let app = create_test_router(create_test_state());
    let uri = format!("/api/jobs/{}/claim", Pubkey::new_unique());
    let (status, body) =
        send_request(&app, Method::POST, &uri, Some(json!({"executor": "worker-1"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "JOB_NOT_FOUND");
}

#[tokio::test]
async fn test_submit_result_success_stores_deterministic_handle() {
    let state = create_test_state();
    let job = seed_executable_job(&state, 100, Pubkey::new_unique()).await;
    state.queue.claim(&job.job_id, "worker-1").await.unwrap();
    let app = create_test_router(state.clone());

    let uri = format!("/api/jobs/{}/result", job.job_id);
    let (status, body) = send_request(
        &app,
        Method::POST,
        &uri,
        Some(json!({
            "executor": "worker-1",
            "success": true,
            "result_ciphertext": {"ct": "cmVzdWx0"},
            "execution_time_ms": 42,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job_status"], "completed");

    let expected_handle = derive_result_handle(&job.job_id);
    assert_eq!(body["result_handle"], expected_handle);

    // The result landed in the store with executor provenance and the
    // job's policy hash.
    let stored = state
        .ciphertexts
        .get(&expected_handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.policy_hash, job.policy_hash);
    assert_eq!(stored.owner, job.submitter);
    assert!(state.ciphertexts.is_confirmed(&expected_handle).await.unwrap());

    let finished = state.queue.get(&job.job_id).await.unwrap().unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.result_handle.as_deref(), Some(expected_handle.as_str()));
}

#[tokio::test]
async fn test_submit_result_from_wrong_executor_is_403() {
    let state = create_test_state();
    let job = seed_executable_job(&state, 100, Pubkey::new_unique()).await;
    state.queue.claim(&job.job_id, "worker-1").await.unwrap();
    let app = create_test_router(state);

    let uri = format!("/api/jobs/{}/result", job.job_id);
    let (status, body) = send_request(
        &app,
        Method::POST,
        &uri,
        Some(json!({
            "executor": "worker-2",
            "success": true,
            "result_ciphertext": {"ct": "cmVzdWx0"},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "EXECUTOR_MISMATCH");
}

#[tokio::test]
async fn test_submit_result_on_queued_job_is_409() {
    let state = create_test_state();
    let job = seed_executable_job(&state, 100, Pubkey::new_unique()).await;
    // Never claimed, so executor is unset and the mismatch check fires first.
    let app = create_test_router(state);

    let uri = format!("/api/jobs/{}/result", job.job_id);
    let (status, _) = send_request(
        &app,
        Method::POST,
        &uri,
        Some(json!({
            "executor": "worker-1",
            "success": true,
            "result_ciphertext": {"ct": "cmVzdWx0"},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_submit_failure_records_error() {
    let state = create_test_state();
    let job = seed_executable_job(&state, 100, Pubkey::new_unique()).await;
    state.queue.claim(&job.job_id, "worker-1").await.unwrap();
    let app = create_test_router(state.clone());

    let uri = format!("/api/jobs/{}/result", job.job_id);
    let (status, body) = send_request(
        &app,
        Method::POST,
        &uri,
        Some(json!({
            "executor": "worker-1",
            "success": false,
            "error": "FHE evaluation diverged",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job_status"], "failed");

    let failed = state.queue.get(&job.job_id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("FHE evaluation diverged"));
}

// ============================================================================
// Ciphertext staging and retrieval
// ============================================================================

#[tokio::test]
async fn test_stage_ciphertexts_creates_pending_records() {
    let state = create_test_state();
    let app = create_test_router(state.clone());
    let owner = Pubkey::new_unique();

    let (status, body) = send_request(
        &app,
        Method::POST,
        "/api/ciphertext",
        Some(json!({
            "owner": owner.to_string(),
            "ciphertexts": [sample_blob(1), sample_blob(2)],
            "policy_type": "owner-controlled",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["reg_id"].as_str().unwrap().starts_with("RID-"));
    assert_eq!(body["expires_in_secs"], 300);

    let handles = body["handles"].as_array().unwrap();
    assert_eq!(handles.len(), 2);
    for entry in handles {
        let handle = entry["handle"].as_str().unwrap();
        assert_eq!(handle.len(), 64);
        assert!(entry["storage_ref"].as_str().unwrap().starts_with("ipfs://Qm"));
        assert!(state.pending.get(handle).await.unwrap().is_some());
    }

    // Receipt is queryable
    let reg_id = body["reg_id"].as_str().unwrap();
    let (status, body) =
        send_request(&app, Method::GET, &format!("/api/registration/{reg_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["registration"]["status"], "pending");
    assert_eq!(body["registration"]["owner"], owner.to_string());
}

#[tokio::test]
async fn test_stage_ciphertexts_is_deterministic_per_content() {
    let state = create_test_state();
    let app = create_test_router(state);
    let owner = Pubkey::new_unique();

    let request = json!({
        "owner": owner.to_string(),
        "ciphertexts": [sample_blob(7)],
    });
    let (_, first) =
        send_request(&app, Method::POST, "/api/ciphertext", Some(request.clone())).await;
    let (_, second) = send_request(&app, Method::POST, "/api/ciphertext", Some(request)).await;

    // Same content, policy, and owner derive the same handle.
    assert_eq!(first["handles"][0]["handle"], second["handles"][0]["handle"]);
    assert_ne!(first["reg_id"], second["reg_id"]);
}

#[tokio::test]
async fn test_stage_ciphertexts_validation() {
    let app = create_test_router(create_test_state());
    let owner = Pubkey::new_unique().to_string();

    let (status, _) = send_request(
        &app,
        Method::POST,
        "/api/ciphertext",
        Some(json!({"ciphertexts": [sample_blob(1)]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_request(
        &app,
        Method::POST,
        "/api/ciphertext",
        Some(json!({"owner": owner, "ciphertexts": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let too_many: Vec<_> = (0..17).map(|i| sample_blob(i as u8)).collect();
    let (status, body) = send_request(
        &app,
        Method::POST,
        "/api/ciphertext",
        Some(json!({"owner": Pubkey::new_unique().to_string(), "ciphertexts": too_many})),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], "BATCH_TOO_LARGE");
}

#[tokio::test]
async fn test_get_ciphertext() {
    let state = create_test_state();
    let (_, record) = confirmed_ciphertext(Pubkey::new_unique(), 9);
    let handle = record.handle.clone();
    state.ciphertexts.insert(record).await.unwrap();
    let app = create_test_router(state);

    let (status, body) =
        send_request(&app, Method::GET, &format!("/api/ciphertext/{handle}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["handle"], handle);

    let (status, body) =
        send_request(&app, Method::GET, "/api/ciphertext/deadbeef", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "CID not found");
}

// ============================================================================
// Batch planning
// ============================================================================

#[tokio::test]
async fn test_batch_plan_over_queued_jobs() {
    let state = create_test_state();
    let batch = Pubkey::new_unique();
    seed_executable_job(&state, 100, batch).await;
    seed_executable_job(&state, 110, batch).await;
    let app = create_test_router(state);

    let (status, body) = send_request(
        &app,
        Method::GET,
        &format!("/api/batch/plan?batch={batch}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "batch-plan");
    assert_eq!(body["window_start_slot"], 100);
    assert_eq!(body["dag"]["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(body["topo_order"].as_array().unwrap().len(), 2);
    assert!(body["decrypt_needed_bitmap"]
        .as_str()
        .unwrap()
        .starts_with("0x"));
}

#[tokio::test]
async fn test_batch_plan_slot_window() {
    let state = create_test_state();
    seed_executable_job(&state, 100, Pubkey::new_unique()).await;
    seed_executable_job(&state, 500, Pubkey::new_unique()).await;
    let app = create_test_router(state);

    let (status, body) = send_request(
        &app,
        Method::GET,
        "/api/batch/plan?window_start=90&window_end=200",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dag"]["nodes"].as_array().unwrap().len(), 1);

    // One-sided windows are rejected
    let (status, _) =
        send_request(&app, Method::GET, "/api/batch/plan?window_start=90", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Challenges
// ============================================================================

#[tokio::test]
async fn test_challenge_open_and_get() {
    let app = create_test_router(create_test_state());

    // Miss is a neutral status, not an error
    let (status, body) = send_request(
        &app,
        Method::GET,
        "/api/batch/challenge?commit_id=commit-1&leaf_idx=0",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "No challenge");

    let (status, body) = send_request(
        &app,
        Method::POST,
        "/api/batch/challenge",
        Some(json!({
            "commit_id": "commit-1",
            "leaf_idx": 0,
            "conflicting_digest": hex_digest(0xab),
            "merkle_proof": [hex_digest(0x01), hex_digest(0x02)],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["verification"]["quorum"].as_str().unwrap().contains('/'));
    assert_eq!(body["challenge"]["commit_id"], "commit-1");

    // Now retrievable
    let (status, body) = send_request(
        &app,
        Method::GET,
        "/api/batch/challenge?commit_id=commit-1&leaf_idx=0",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["commit_id"], "commit-1");
}

#[tokio::test]
async fn test_challenge_rejects_malformed_digest() {
    let app = create_test_router(create_test_state());
    let (status, body) = send_request(
        &app,
        Method::POST,
        "/api/batch/challenge",
        Some(json!({
            "commit_id": "commit-1",
            "leaf_idx": 0,
            "conflicting_digest": "0x1234",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_FIELD_VALUE");
}

// ============================================================================
// Listener lifecycle
// ============================================================================

#[tokio::test]
async fn test_listener_start_stop() {
    let state = create_test_state();
    let app = create_test_router(state.clone());

    assert!(!state.listener.is_running());

    let (status, body) = send_request(&app, Method::POST, "/api/listener/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["listener"]["is_running"], true);

    let (status, body) = send_request(&app, Method::POST, "/api/listener/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["listener"]["is_running"], false);
    assert!(!state.listener.is_running());
}
