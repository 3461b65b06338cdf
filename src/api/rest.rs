//! REST API endpoints for Gatewatch.
//!
//! The worker-facing surface: job discovery/claim/result, ciphertext staging
//! and retrieval, batch planning, and the challenge protocol. Handlers only
//! ever advance job state through the queue's transition methods; jobs are
//! created exclusively by the event listener from ledger-confirmed facts.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};

use crate::crypto::{
    canonical_json_hash, compute_domain_hash, derive_result_handle, derive_storage_ref,
    hash_to_hex,
};
use crate::domain::{
    cid_handle_hex, derive_cid_handle, parse_hash256, ConfirmedCiphertext, EncryptionParams,
    JobStatus, OperationKind, PendingCiphertext, PolicyKind, Provenance, QueuedJob,
    RegistrationRecord, RegistrationStatus, VerificationInfo, MAX_CIDS,
};
use crate::infra::{
    generate_reg_id, CiphertextStore as _, JobQueue as _, PendingStore as _, PlanSelector,
    RegistrationLog as _,
};
use crate::server::AppState;

use super::error::{ApiError, ErrorCode};

/// Build the `/api` router.
pub fn router() -> Router<AppState> {
    Router::new()
        // Worker-facing job surface
        .route("/jobs", get(list_jobs))
        .route("/jobs/:job_id/claim", post(claim_job))
        .route("/jobs/:job_id/result", post(submit_result))
        // Ciphertext staging and retrieval
        .route("/ciphertext", post(stage_ciphertexts))
        .route("/ciphertext/:handle", get(get_ciphertext))
        .route("/registration/:reg_id", get(get_registration))
        // Batch planning and optimistic verification
        .route("/batch/plan", get(batch_plan))
        .route("/batch/challenge", get(get_challenge).post(open_challenge))
        // Status and listener lifecycle
        .route("/status", get(service_status))
        .route("/listener/start", post(start_listener))
        .route("/listener/stop", post(stop_listener))
}

fn parse_pubkey(value: &str, field: &str) -> Result<Pubkey, ApiError> {
    Pubkey::from_str(value).map_err(|e| {
        ApiError::new(
            ErrorCode::InvalidFieldValue,
            format!("invalid {}: {}", field, e),
        )
        .with_resource_id(value.to_string())
    })
}

// ============================================================================
// Jobs
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListJobsQuery {
    status: Option<String>,
    limit: Option<usize>,
}

/// `GET /api/jobs?status=queued&limit=N`
///
/// Jobs are returned enriched with their input ciphertexts inlined so a
/// worker can execute without extra round trips. Store misses render null
/// fields rather than failing the listing.
async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = query.status.as_deref().unwrap_or("queued");
    let limit = query.limit.unwrap_or(10).min(100);

    let jobs: Vec<QueuedJob> = match status {
        "queued" => state.queue.queued_jobs(limit).await?,
        "executing" => {
            let mut active = state.queue.active_jobs().await?;
            active.truncate(limit);
            active
        }
        "completed" | "failed" => {
            let wanted: JobStatus = status
                .parse()
                .map_err(|e: String| ApiError::new(ErrorCode::InvalidFieldValue, e))?;
            state
                .queue
                .finished_jobs(usize::MAX)
                .await?
                .into_iter()
                .filter(|j| j.status == wanted)
                .take(limit)
                .collect()
        }
        other => {
            return Err(ApiError::new(
                ErrorCode::InvalidFieldValue,
                format!("unsupported status filter: {}", other),
            ))
        }
    };

    let mut enriched = Vec::with_capacity(jobs.len());
    for job in &jobs {
        enriched.push(enrich_job(&state, job).await?);
    }

    info!(status, count = enriched.len(), "jobs fetched by executor");
    Ok(Json(json!({
        "jobs": enriched,
        "total": enriched.len(),
        "status": status,
    })))
}

/// Inline the referenced ciphertexts into a job's JSON rendering.
async fn enrich_job(state: &AppState, job: &QueuedJob) -> Result<serde_json::Value, ApiError> {
    let keys: Vec<String> = job.handles.iter().map(cid_handle_hex).collect();
    let records = state.ciphertexts.get_many(&keys).await?;

    let ciphertexts: Vec<serde_json::Value> = job
        .handles
        .iter()
        .zip(records)
        .map(|(handle, record)| match record {
            Some(ct) => json!({
                "cid": handle.to_string(),
                "ciphertext": ct.ciphertext_blob,
                "ciphertext_hash": hash_to_hex(&ct.content_hash),
                "enc_params": ct.enc_params,
                "policy_ctx": ct.policy_ctx,
                "owner": ct.owner.to_string(),
            }),
            None => {
                warn!(cid = %handle, job = %job.job_id, "ciphertext not found for job handle");
                json!({
                    "cid": handle.to_string(),
                    "ciphertext": null,
                    "ciphertext_hash": null,
                    "enc_params": null,
                    "policy_ctx": null,
                    "owner": null,
                })
            }
        })
        .collect();

    let mut rendered = serde_json::to_value(job)
        .map_err(|e| ApiError::new(ErrorCode::InternalError, e.to_string()))?;
    rendered["ciphertexts"] = json!(ciphertexts);
    Ok(rendered)
}

#[derive(Debug, Deserialize)]
struct ClaimJobRequest {
    executor: Option<String>,
}

/// `POST /api/jobs/{job_id}/claim`
///
/// Claim is a compare-and-set on status: only one of several racing workers
/// can move a job from `queued` to `assigned`; the rest get a 409 carrying
/// the current status.
async fn claim_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<ClaimJobRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job_id = parse_pubkey(&job_id, "job id")?;
    let executor = request.executor.filter(|e| !e.is_empty()).ok_or_else(|| {
        ApiError::new(ErrorCode::MissingRequiredField, "executor field is required")
    })?;

    let job = state.queue.claim(&job_id, &executor).await?;
    info!(job = %job_id, executor = %executor, "job claimed by executor");

    Ok(Json(json!({
        "success": true,
        "job": job,
    })))
}

#[derive(Debug, Deserialize)]
struct SubmitResultRequest {
    executor: Option<String>,
    success: Option<bool>,
    result_ciphertext: Option<serde_json::Value>,
    error: Option<String>,
    execution_time_ms: Option<u64>,
}

/// `POST /api/jobs/{job_id}/result`
///
/// On success the result ciphertext lands at the job's deterministic result
/// handle with the job's policy hash and executor provenance; the handle is
/// derived from the job identity, never chosen by the worker.
async fn submit_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<SubmitResultRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job_id = parse_pubkey(&job_id, "job id")?;
    let executor = request.executor.filter(|e| !e.is_empty()).ok_or_else(|| {
        ApiError::new(ErrorCode::MissingRequiredField, "executor field is required")
    })?;
    let success = request.success.ok_or_else(|| {
        ApiError::new(
            ErrorCode::MissingRequiredField,
            "success field is required and must be boolean",
        )
    })?;

    let job = state
        .queue
        .get(&job_id)
        .await?
        .ok_or(crate::infra::GatewatchError::JobNotFound(job_id))?;

    if job.executor.as_deref() != Some(executor.as_str()) {
        warn!(
            job = %job_id,
            assigned = job.executor.as_deref().unwrap_or("<none>"),
            caller = %executor,
            "result from non-assignee rejected"
        );
        return Err(crate::infra::GatewatchError::ExecutorMismatch(job_id).into());
    }
    if !matches!(job.status, JobStatus::Assigned | JobStatus::Executing) {
        return Err(crate::infra::GatewatchError::NotExecutable {
            job_id,
            status: job.status,
        }
        .into());
    }

    if !success {
        let reason = request
            .error
            .unwrap_or_else(|| "execution failed".to_string());
        let failed = state.queue.fail(&job_id, &executor, reason).await?;
        info!(
            job = %job_id,
            executor = %executor,
            execution_time_ms = request.execution_time_ms.unwrap_or(0),
            "job failed"
        );
        return Ok(Json(json!({
            "success": true,
            "job_status": failed.status,
            "message": "Failure recorded",
        })));
    }

    let blob = request.result_ciphertext.ok_or_else(|| {
        ApiError::new(
            ErrorCode::MissingRequiredField,
            "result_ciphertext is required for successful execution",
        )
    })?;

    let result_handle = derive_result_handle(&job_id);
    let content_hash = canonical_json_hash(&blob);
    let record = ConfirmedCiphertext {
        handle: result_handle.clone(),
        ciphertext_blob: blob,
        content_hash,
        enc_params: EncryptionParams::default(),
        policy_ctx: json!({
            "allow": ["decrypt"],
            "version": "1.0",
            "decrypt_by": "public",
        }),
        policy_hash: job.policy_hash,
        owner: job.submitter,
        storage_ref: derive_storage_ref(&content_hash),
        provenance: Provenance::Executor,
        registered_slot: Some(job.slot),
        created_at: Utc::now(),
        verification: VerificationInfo::confirmed(format!("executor:{}", executor), job.slot),
    };
    state.ciphertexts.insert(record).await?;

    let completed = state
        .queue
        .complete(&job_id, &executor, result_handle.clone())
        .await?;
    info!(
        job = %job_id,
        executor = %executor,
        result_handle = %result_handle,
        execution_time_ms = request.execution_time_ms.unwrap_or(0),
        "job completed"
    );

    Ok(Json(json!({
        "success": true,
        "job_status": completed.status,
        "result_handle": result_handle,
        "message": "Result accepted",
    })))
}

// ============================================================================
// Ciphertexts
// ============================================================================

/// `GET /api/ciphertext/{handle}`
async fn get_ciphertext(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.ciphertexts.get(&handle).await? {
        Some(record) => Ok(Json(json!(record))),
        None => Err(ApiError::new(ErrorCode::CiphertextNotFound, "CID not found")
            .with_resource_id(handle)),
    }
}

#[derive(Debug, Deserialize)]
struct StageCiphertextsRequest {
    owner: Option<String>,
    ciphertexts: Option<Vec<serde_json::Value>>,
    policy_ctx: Option<serde_json::Value>,
    policy_type: Option<String>,
    enc_params: Option<EncryptionParams>,
    provenance: Option<Provenance>,
}

/// `POST /api/ciphertext`
///
/// Stage a batch of client-encrypted ciphertexts for on-chain registration.
/// Each handle is the program-derived address of its (content hash, policy
/// hash, owner) binding; records stay in the pending store until the
/// matching registration event confirms them or the TTL expires.
async fn stage_ciphertexts(
    State(state): State<AppState>,
    Json(request): Json<StageCiphertextsRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let owner = request.owner.ok_or_else(|| {
        ApiError::new(ErrorCode::MissingRequiredField, "owner field is required")
    })?;
    let owner = parse_pubkey(&owner, "owner")?;

    let ciphertexts = request.ciphertexts.unwrap_or_default();
    if ciphertexts.is_empty() {
        return Err(ApiError::new(
            ErrorCode::MissingRequiredField,
            "ciphertexts must be a non-empty array",
        ));
    }
    if ciphertexts.len() > MAX_CIDS {
        return Err(ApiError::new(
            ErrorCode::BatchTooLarge,
            format!("too many ciphertexts (max {})", MAX_CIDS),
        ));
    }

    let policy_ctx = match request.policy_ctx {
        Some(ctx) => ctx,
        None => PolicyKind::from_label(request.policy_type.as_deref().unwrap_or("owner-controlled"))
            .context(),
    };
    let policy_hash = crate::crypto::compute_policy_hash(&policy_ctx);
    let enc_params = request.enc_params.unwrap_or_default();
    let provenance = request.provenance.unwrap_or_default();

    let program_id = state.listener.connection().program_id;
    let mut handles = Vec::with_capacity(ciphertexts.len());
    let mut content_hashes = Vec::with_capacity(ciphertexts.len());
    let mut receipt_entries = Vec::with_capacity(ciphertexts.len());

    for blob in ciphertexts {
        let content_hash = canonical_json_hash(&blob);
        let cid = derive_cid_handle(&program_id, &content_hash, &policy_hash, &owner);
        let handle = cid_handle_hex(&cid);
        let storage_ref = derive_storage_ref(&content_hash);

        state
            .pending
            .put(PendingCiphertext::new(
                handle.clone(),
                blob,
                content_hash,
                enc_params.clone(),
                policy_ctx.clone(),
                policy_hash,
                owner,
                storage_ref.clone(),
                provenance,
                state.config.pending_ttl_secs,
            ))
            .await?;

        receipt_entries.push(json!({
            "handle": handle,
            "cid": cid.to_string(),
            "content_hash": hash_to_hex(&content_hash),
            "policy_hash": hash_to_hex(&policy_hash),
            "storage_ref": storage_ref,
        }));
        handles.push(handle);
        content_hashes.push(content_hash);
    }

    let reg_id = generate_reg_id();
    let count = handles.len();
    state
        .registrations
        .create(RegistrationRecord {
            reg_id: reg_id.clone(),
            handles,
            content_hashes,
            policy_hashes: vec![policy_hash; count],
            owner,
            domain: state.domain_info(),
            created_at: Utc::now(),
            status: RegistrationStatus::Pending,
        })
        .await?;

    info!(reg_id = %reg_id, count, owner = %owner, "ciphertexts staged for registration");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "reg_id": reg_id,
            "handles": receipt_entries,
            "expires_in_secs": state.config.pending_ttl_secs,
        })),
    ))
}

/// `GET /api/registration/{reg_id}`
async fn get_registration(
    State(state): State<AppState>,
    Path(reg_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = state.registrations.get(&reg_id).await?;
    let entries = state.registrations.entries(&reg_id).await?;
    Ok(Json(json!({
        "registration": record,
        "entries": entries,
    })))
}

// ============================================================================
// Batch planning and challenges
// ============================================================================

#[derive(Debug, Deserialize)]
struct PlanQuery {
    batch: Option<String>,
    window_start: Option<u64>,
    window_end: Option<u64>,
}

/// `GET /api/batch/plan?batch=...` or `?window_start=..&window_end=..`
async fn batch_plan(
    State(state): State<AppState>,
    Query(query): Query<PlanQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let selector = match (&query.batch, query.window_start, query.window_end) {
        (Some(batch), None, None) => PlanSelector::Batch(parse_pubkey(batch, "batch")?),
        (None, Some(start), Some(end)) => {
            if start > end {
                return Err(ApiError::new(
                    ErrorCode::InvalidFieldValue,
                    "window_start must not exceed window_end",
                ));
            }
            PlanSelector::SlotWindow { start, end }
        }
        (None, None, None) => PlanSelector::AllQueued,
        _ => {
            return Err(ApiError::new(
                ErrorCode::InvalidFieldValue,
                "specify either batch, or window_start and window_end, or neither",
            ))
        }
    };

    let plan = state.planner.plan(selector).await?;
    Ok(Json(json!({
        "type": "batch-plan",
        "window_start_slot": plan.window_start_slot,
        "dag": {
            "nodes": plan.nodes,
            "edges": plan.edges,
        },
        "topo_order": plan.topo_order,
        "decrypt_needed_bitmap": plan.decrypt_needed_bitmap,
        "execution_hints": plan.execution_hints,
        "queue_stats": plan.queue_stats,
    })))
}

#[derive(Debug, Deserialize)]
struct ChallengeQuery {
    commit_id: String,
    leaf_idx: u64,
}

/// `GET /api/batch/challenge?commit_id=..&leaf_idx=..`
///
/// A miss is a neutral "no challenge" status, not an error.
async fn get_challenge(
    State(state): State<AppState>,
    Query(query): Query<ChallengeQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.challenges.get(&query.commit_id, query.leaf_idx).await {
        Some(challenge) => Ok(Json(json!(challenge))),
        None => Ok(Json(json!({
            "status": "No challenge",
            "commit_id": query.commit_id,
            "leaf_idx": query.leaf_idx,
        }))),
    }
}

#[derive(Debug, Deserialize)]
struct OpenChallengeRequest {
    commit_id: Option<String>,
    leaf_idx: Option<u64>,
    conflicting_digest: Option<String>,
    merkle_proof: Option<Vec<String>>,
}

/// `POST /api/batch/challenge`
///
/// Opens a challenge against one leaf of a committed batch result and
/// resolves it synchronously through the verifier quorum.
async fn open_challenge(
    State(state): State<AppState>,
    Json(request): Json<OpenChallengeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let commit_id = request.commit_id.filter(|c| !c.is_empty()).ok_or_else(|| {
        ApiError::new(ErrorCode::MissingRequiredField, "commit_id is required")
    })?;
    let leaf_idx = request
        .leaf_idx
        .ok_or_else(|| ApiError::new(ErrorCode::MissingRequiredField, "leaf_idx is required"))?;
    let conflicting_digest = request.conflicting_digest.ok_or_else(|| {
        ApiError::new(
            ErrorCode::MissingRequiredField,
            "conflicting_digest is required",
        )
    })?;
    let conflicting_digest = parse_hash256(&conflicting_digest).map_err(|e| {
        ApiError::new(
            ErrorCode::InvalidFieldValue,
            format!("invalid conflicting_digest: {}", e),
        )
    })?;

    let merkle_proof = request
        .merkle_proof
        .unwrap_or_default()
        .iter()
        .map(|s| {
            parse_hash256(s).map_err(|e| {
                ApiError::new(
                    ErrorCode::InvalidFieldValue,
                    format!("invalid merkle_proof element: {}", e),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (challenge, resolution) = state
        .challenges
        .open_and_resolve(&commit_id, leaf_idx, conflicting_digest, merkle_proof)
        .await?;

    Ok(Json(json!({
        "message": "Challenge resolved by verifier quorum",
        "challenge": {
            "commit_id": challenge.commit_id,
            "leaf_idx": challenge.leaf_index,
            "status": challenge.status,
        },
        "verification": resolution,
        "attestations": challenge.attestations,
    })))
}

// ============================================================================
// Status and listener lifecycle
// ============================================================================

/// `GET /api/status`
async fn service_status(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let connection = state.listener.connection();
    let domain = state.domain_info();
    let domain_hash = compute_domain_hash(
        &domain.chain_id,
        &domain.gatekeeper_program,
        &domain.cpk_id,
        domain.key_epoch,
    );

    let operations: Vec<serde_json::Value> = OperationKind::ALL
        .iter()
        .map(|op| {
            json!({
                "name": op.name(),
                "ir_digest": hash_to_hex(&op.ir_digest()),
                "input_arity": op.input_arity(),
            })
        })
        .collect();

    Ok(Json(json!({
        "service": "gatewatch",
        "version": env!("CARGO_PKG_VERSION"),
        "program_id": connection.program_id.to_string(),
        "rpc_url": connection.rpc_url,
        "domain": domain,
        "domain_hash": hash_to_hex(&domain_hash),
        "listener": state.listener.state(),
        "queue": state.queue.stats().await?,
        "ciphertexts": state.ciphertexts.stats().await?,
        "pending": state.pending.stats().await?,
        "registrations": state.registrations.stats().await?,
        "operations": operations,
        "recent_registrations": state.registrations.list_recent(10).await?,
    })))
}

/// `POST /api/listener/start`
async fn start_listener(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.listener.start().await;
    Json(json!({
        "message": "Event listener running",
        "listener": state.listener.state(),
    }))
}

/// `POST /api/listener/stop`
async fn stop_listener(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.listener.stop().await;
    Json(json!({
        "message": "Event listener stopped",
        "listener": state.listener.state(),
    }))
}
