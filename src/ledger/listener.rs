//! Gatekeeper event listener
//!
//! Subscribes to the program's log stream, confirms each event against
//! ledger account state, and routes confirmed events into the stores and the
//! job queue. This is the only component that creates jobs or promotes
//! ciphertexts; the HTTP surface never does either.
//!
//! The subscription runs in a spawned task that owns both the pubsub client
//! and its stream (the stream borrows the client). Confirmation retries run
//! in per-transaction tasks so they never block the subscription path.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_client::rpc_response::{Response, RpcLogsResponse};
use solana_sdk::pubkey::Pubkey;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::crypto::hash_to_hex;
use crate::domain::{
    cid_handle_hex, BatchFinalizedEvent, BatchPostedEvent, CidHandleRegisteredEvent,
    ConfirmedCiphertext, DomainEvent, EventKind, JobSubmittedEvent, OperationKind, QueuedJob,
    RegistrationStatus, RevealRequestedEvent, VerificationInfo,
};
use crate::infra::{
    CidValidator, CiphertextStore, GatewatchError, JobQueue, PendingStore, RegistrationLog, Result,
    Retry, RetryConfig,
};

use super::connection::{ConnectionConfig, LedgerReader};
use super::parser::{parse_transaction_logs, CidHandleAccount, JobAccount};

/// Bounded dedup windows: transaction signatures and job ids
const DEDUP_CAPACITY: usize = 1000;
const DEDUP_EVICT_CHUNK: usize = 100;

/// Listener state snapshot for the status surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerState {
    pub is_running: bool,
    pub last_processed_slot: u64,
    pub total_events_processed: u64,
    pub errors_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<i64>,
}

#[derive(Debug, Default)]
struct Counters {
    running: AtomicBool,
    last_processed_slot: AtomicU64,
    total_events_processed: AtomicU64,
    errors_count: AtomicU64,
    // Unix seconds; 0 means never
    connected_at: AtomicI64,
    last_event_at: AtomicI64,
}

/// Live subscription to gatekeeper program events.
///
/// Cheap to clone; all state is shared. `start` and `stop` are idempotent
/// and serialize against each other.
#[derive(Clone)]
pub struct EventListener {
    config: Arc<ConnectionConfig>,
    reader: Arc<dyn LedgerReader>,
    pending: Arc<dyn PendingStore>,
    ciphertexts: Arc<dyn CiphertextStore>,
    registrations: Arc<dyn RegistrationLog>,
    queue: Arc<dyn JobQueue>,
    validator: Arc<CidValidator>,
    counters: Arc<Counters>,
    seen_txs: Arc<Mutex<DedupWindow>>,
    seen_jobs: Arc<Mutex<DedupWindow>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EventListener {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ConnectionConfig,
        reader: Arc<dyn LedgerReader>,
        pending: Arc<dyn PendingStore>,
        ciphertexts: Arc<dyn CiphertextStore>,
        registrations: Arc<dyn RegistrationLog>,
        queue: Arc<dyn JobQueue>,
        validator: Arc<CidValidator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            reader,
            pending,
            ciphertexts,
            registrations,
            queue,
            validator,
            counters: Arc::new(Counters::default()),
            seen_txs: Arc::new(Mutex::new(DedupWindow::new(DEDUP_CAPACITY, DEDUP_EVICT_CHUNK))),
            seen_jobs: Arc::new(Mutex::new(DedupWindow::new(DEDUP_CAPACITY, DEDUP_EVICT_CHUNK))),
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Connection settings the listener was built with
    pub fn connection(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Begin following program logs. No-op if already running.
    pub async fn start(&self) {
        let mut task_slot = self.task.lock().await;
        if self.counters.running.load(Ordering::SeqCst) {
            warn!("event listener already running");
            return;
        }

        info!(
            program = %self.config.program_id,
            ws = %self.config.ws_url,
            commitment = ?self.config.commitment.commitment,
            "starting event listener"
        );
        self.counters.running.store(true, Ordering::SeqCst);

        let listener = self.clone();
        *task_slot = Some(tokio::spawn(async move {
            listener.subscription_loop().await;
        }));
    }

    /// Stop following program logs. No-op if not running.
    ///
    /// Aborts the subscription task; confirmation retries already handed to
    /// per-transaction tasks run to completion on their own.
    pub async fn stop(&self) {
        let mut task_slot = self.task.lock().await;
        let was_running = self.counters.running.swap(false, Ordering::SeqCst);

        if let Some(handle) = task_slot.take() {
            handle.abort();
        }

        if was_running {
            info!("event listener stopped");
        } else {
            warn!("event listener not running");
        }
    }

    pub fn is_running(&self) -> bool {
        self.counters.running.load(Ordering::SeqCst)
    }

    /// Snapshot of the listener counters
    pub fn state(&self) -> ListenerState {
        let connected_at = self.counters.connected_at.load(Ordering::Relaxed);
        let last_event_at = self.counters.last_event_at.load(Ordering::Relaxed);
        ListenerState {
            is_running: self.is_running(),
            last_processed_slot: self.counters.last_processed_slot.load(Ordering::Relaxed),
            total_events_processed: self.counters.total_events_processed.load(Ordering::Relaxed),
            errors_count: self.counters.errors_count.load(Ordering::Relaxed),
            connected_at: (connected_at != 0).then_some(connected_at),
            last_event_at: (last_event_at != 0).then_some(last_event_at),
        }
    }

    /// Reconnect-with-backoff wrapper around one subscription session.
    ///
    /// Consecutive connect failures count against the reconnect budget; a
    /// session that delivered notifications resets it.
    async fn subscription_loop(self) {
        let mut failures = 0u32;

        loop {
            if !self.is_running() {
                break;
            }

            match self.run_subscription().await {
                Ok(notifications) => {
                    failures = 0;
                    info!(notifications, "log stream closed");
                }
                Err(e) => {
                    failures += 1;
                    self.counters.errors_count.fetch_add(1, Ordering::Relaxed);
                    if failures > self.config.reconnect.max_retries {
                        error!(
                            error = %e,
                            failures,
                            "ledger subscription abandoned after repeated failures"
                        );
                        self.counters.running.store(false, Ordering::SeqCst);
                        break;
                    }
                    warn!(error = %e, failures, "subscription error");
                }
            }

            if !self.is_running() {
                break;
            }
            let delay = self
                .config
                .reconnect
                .delay_for_attempt(failures.saturating_sub(1));
            info!(delay_ms = delay.as_millis() as u64, "resubscribing to program logs");
            tokio::time::sleep(delay).await;
        }
    }

    /// One subscription session: connect, subscribe, drain the stream.
    ///
    /// Returns how many notifications the session delivered once the server
    /// closes the stream.
    async fn run_subscription(&self) -> Result<u64> {
        let client = self.config.pubsub_client().await?;
        let filter = RpcTransactionLogsFilter::Mentions(vec![self.config.program_id.to_string()]);
        let config = RpcTransactionLogsConfig {
            commitment: Some(self.config.commitment),
        };

        let (mut stream, unsubscribe) = client.logs_subscribe(filter, config).await?;
        self.counters
            .connected_at
            .store(Utc::now().timestamp(), Ordering::Relaxed);
        info!(program = %self.config.program_id, "subscribed to program logs");

        let mut notifications = 0u64;
        while let Some(response) = stream.next().await {
            if !self.is_running() {
                break;
            }
            notifications += 1;
            self.dispatch_notification(response).await;
        }

        drop(stream);
        unsubscribe().await;
        Ok(notifications)
    }

    /// Dedup one notification and hand it to a processing task.
    ///
    /// Failed transactions are skipped outright: their account changes were
    /// rolled back, so confirmation could never succeed for their events.
    async fn dispatch_notification(&self, notification: Response<RpcLogsResponse>) {
        let slot = notification.context.slot;
        let logs = notification.value;

        if logs.err.is_some() {
            debug!(tx = short(&logs.signature), slot, "skipping failed transaction");
            return;
        }

        if self.seen_txs.lock().await.check_and_insert(&logs.signature) {
            debug!(tx = short(&logs.signature), "transaction already processed");
            return;
        }

        let listener = self.clone();
        tokio::spawn(async move {
            listener
                .process_transaction(slot, logs.signature, logs.logs)
                .await;
        });
    }

    /// Parse and process every event in one transaction, in log order
    async fn process_transaction(&self, slot: u64, signature: String, log_lines: Vec<String>) {
        let block_time = self.lookup_block_time(slot).await;
        let events = parse_transaction_logs(&log_lines, slot, &signature, block_time);
        if events.is_empty() {
            return;
        }

        info!(
            count = events.len(),
            tx = short(&signature),
            slot,
            "received events"
        );

        for event in &events {
            match self.process_event(event).await {
                Ok(()) => {
                    self.counters
                        .total_events_processed
                        .fetch_add(1, Ordering::Relaxed);
                    self.counters
                        .last_processed_slot
                        .fetch_max(slot, Ordering::Relaxed);
                    self.counters
                        .last_event_at
                        .store(Utc::now().timestamp(), Ordering::Relaxed);
                }
                Err(e) => {
                    self.counters.errors_count.fetch_add(1, Ordering::Relaxed);
                    error!(
                        error = %e,
                        event = event.kind.name(),
                        tx = short(&signature),
                        "event processing failed"
                    );
                }
            }
        }
    }

    async fn lookup_block_time(&self, slot: u64) -> i64 {
        match self.reader.block_time(slot).await {
            Ok(time) => time,
            Err(e) => {
                warn!(slot, error = %e, "failed to get block time, using current time");
                Utc::now().timestamp()
            }
        }
    }

    async fn process_event(&self, event: &DomainEvent) -> Result<()> {
        match &event.kind {
            EventKind::CidHandleRegistered(e) => self.handle_cid_registered(event, e).await,
            EventKind::JobSubmitted(e) => self.handle_job_submitted(event, e).await,
            EventKind::BatchPosted(e) => {
                self.handle_batch_posted(e);
                Ok(())
            }
            EventKind::BatchFinalized(e) => {
                self.handle_batch_finalized(e);
                Ok(())
            }
            EventKind::RevealRequested(e) => self.handle_reveal_requested(e).await,
        }
    }

    /// Promote the staged ciphertext for a registered handle, or synthesize
    /// a degraded record when no staged data exists.
    async fn handle_cid_registered(
        &self,
        ctx: &DomainEvent,
        event: &CidHandleRegisteredEvent,
    ) -> Result<()> {
        info!(cid = %event.cid, owner = %event.owner, "processing CidHandleRegistered");

        let account_data = self.confirm_account(&event.cid, "confirm cid account").await?;
        match CidHandleAccount::decode(&account_data) {
            Ok(account) => {
                if account.owner != event.owner || account.ciphertext_hash != event.ciphertext_hash
                {
                    warn!(cid = %event.cid, "cid account fields disagree with event");
                }
            }
            Err(e) => warn!(cid = %event.cid, error = %e, "undecodable cid account"),
        }

        let handle = cid_handle_hex(&event.cid);
        match self.pending.take(&handle).await? {
            Some(staged) => {
                self.ciphertexts
                    .insert(ConfirmedCiphertext::from_pending(staged))
                    .await?;
                info!(cid = %event.cid, slot = ctx.slot, "cid confirmed with staged data");
            }
            None => {
                // Late registration or a restart wiped the staging area
                warn!(cid = %event.cid, "no staged data found, recording from event fields only");
                self.ciphertexts
                    .insert(ConfirmedCiphertext::degraded(
                        handle.clone(),
                        event.ciphertext_hash,
                        event.policy_hash,
                        event.owner,
                        ctx.slot,
                    ))
                    .await?;
            }
        }

        self.ciphertexts
            .update_verification(
                &handle,
                VerificationInfo::confirmed(ctx.tx_signature.clone(), ctx.slot),
            )
            .await?;

        match self
            .registrations
            .update_entry_status(
                &handle,
                RegistrationStatus::Confirmed,
                Some(ctx.tx_signature.clone()),
            )
            .await
        {
            Ok(()) => {}
            // Expected when the registration predates this process
            Err(GatewatchError::RegistrationEntryNotFound(_)) => {
                debug!(cid = %event.cid, "no registration entry for handle");
            }
            Err(e) => return Err(e),
        }

        Ok(())
    }

    /// Admit a ledger-confirmed job into the queue.
    ///
    /// The job account supplies `submitter` and `policy_hash`, which the
    /// event body does not carry.
    async fn handle_job_submitted(
        &self,
        ctx: &DomainEvent,
        event: &JobSubmittedEvent,
    ) -> Result<()> {
        info!(
            job = %event.job,
            batch = %event.batch,
            cid_count = event.cid_handles.len(),
            slot = ctx.slot,
            "processing JobSubmitted"
        );

        if self
            .seen_jobs
            .lock()
            .await
            .check_and_insert(&event.job.to_string())
        {
            debug!(job = %event.job, "job already processed");
            return Ok(());
        }

        let account_data = self.confirm_account(&event.job, "confirm job account").await?;
        let account = JobAccount::decode(&account_data)?;
        if account.cid_count as usize != event.cid_handles.len() {
            warn!(
                job = %event.job,
                account_count = account.cid_count,
                event_count = event.cid_handles.len(),
                "job account cid count disagrees with event"
            );
        }

        match OperationKind::from_ir_digest(&event.ir_digest) {
            Some(op) => debug!(
                job = %event.job,
                operation = %op,
                expected_inputs = op.input_arity(),
                "recognized operation"
            ),
            None => debug!(
                job = %event.job,
                ir_digest = %hash_to_hex(&event.ir_digest),
                "unrecognized ir digest"
            ),
        }

        let report = self
            .validator
            .validate_job_cids(&event.cid_handles, &event.cid_set_id)
            .await?;
        if let Err(e) = report.ensure() {
            warn!(job = %event.job, error = %e, "job rejected by cid validation");
            return Err(e);
        }

        let job = QueuedJob::from_submission(
            event,
            account.submitter,
            account.policy_hash,
            ctx.tx_signature.clone(),
            ctx.slot,
            ctx.block_time,
        );
        let stored = self.queue.enqueue(job).await?;
        info!(
            job = %stored.job_id,
            cid_count = stored.handles.len(),
            slot = ctx.slot,
            "job enqueued for execution"
        );

        Ok(())
    }

    fn handle_batch_posted(&self, event: &BatchPostedEvent) {
        info!(
            batch = %event.batch,
            window_start = event.window_start_slot,
            window_end = event.window_end_slot,
            processed_until = event.processed_until_slot,
            commit_root = %hash_to_hex(&event.commit_root),
            "BatchPosted event received"
        );
    }

    fn handle_batch_finalized(&self, event: &BatchFinalizedEvent) {
        info!(
            batch = %event.batch,
            window_start = event.window_start_slot,
            finalized_slot = event.finalized_slot,
            result_commitment = %hash_to_hex(&event.result_commitment),
            "BatchFinalized event received"
        );
    }

    async fn handle_reveal_requested(&self, event: &RevealRequestedEvent) -> Result<()> {
        let known = self.validator.validate_handle(&hex::encode(event.handle)).await?;
        info!(
            handle = %hash_to_hex(&event.handle),
            requester = %event.requester,
            is_public = event.is_public,
            handle_confirmed = known,
            "RevealRequested event received"
        );
        Ok(())
    }

    /// Fetch an account with the confirmation retry schedule.
    ///
    /// The log stream commonly runs slightly ahead of account visibility at
    /// the same commitment; retries bridge that gap. Exhaustion drops the
    /// event, which is safe: no ledger-unconfirmed fact is ever admitted.
    async fn confirm_account(&self, address: &Pubkey, context: &str) -> Result<Vec<u8>> {
        let retry = Retry::new(RetryConfig::confirmation());
        let outcome = retry
            .run_with_context(context, || async {
                self.reader.account_data(address).await
            })
            .await;

        match outcome.result {
            Ok(data) => {
                debug!(address = %address, attempts = outcome.attempts, "account verified on-chain");
                Ok(data)
            }
            Err(e) => Err(GatewatchError::ConfirmationFailed {
                address: *address,
                reason: format!("{} attempts exhausted: {}", outcome.attempts, e),
            }),
        }
    }
}

/// Insertion-ordered set with bounded size.
///
/// At capacity, the oldest chunk of entries is dropped so long-running
/// sessions cannot grow without bound.
#[derive(Debug)]
struct DedupWindow {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
    evict_chunk: usize,
}

impl DedupWindow {
    fn new(capacity: usize, evict_chunk: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
            evict_chunk,
        }
    }

    /// Record a key, reporting whether it was already present
    fn check_and_insert(&mut self, key: &str) -> bool {
        if self.seen.contains(key) {
            return true;
        }

        self.seen.insert(key.to_string());
        self.order.push_back(key.to_string());

        if self.seen.len() > self.capacity {
            for _ in 0..self.evict_chunk {
                if let Some(oldest) = self.order.pop_front() {
                    self.seen.remove(&oldest);
                }
            }
        }

        false
    }

    fn len(&self) -> usize {
        self.seen.len()
    }
}

fn short(signature: &str) -> &str {
    signature.get(..8).unwrap_or(signature)
}
