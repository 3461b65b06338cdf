//! In-memory store of ledger-confirmed ciphertexts
//!
//! Keyed by CID handle with an owner secondary index. Records have no TTL;
//! their verification status tracks the short window between the store write
//! and the ledger-level confirmation flag. The store never evicts: silently
//! losing ciphertext material is a correctness hazard, so overflow fails
//! loudly instead.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::RwLock;

use crate::domain::{CiphertextStats, ConfirmedCiphertext, VerificationInfo, VerificationStatus};

use super::error::GatewatchError;
use super::traits::CiphertextStore;
use super::Result;

/// Bounded in-memory implementation of [`CiphertextStore`].
pub struct InMemoryCiphertextStore {
    capacity: usize,
    inner: RwLock<CiphertextIndex>,
}

#[derive(Default)]
struct CiphertextIndex {
    records: HashMap<String, ConfirmedCiphertext>,
    by_owner: HashMap<Pubkey, HashSet<String>>,
}

impl InMemoryCiphertextStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(CiphertextIndex::default()),
        }
    }
}

#[async_trait]
impl CiphertextStore for InMemoryCiphertextStore {
    async fn insert(&self, record: ConfirmedCiphertext) -> Result<()> {
        let mut inner = self.inner.write().await;

        let existing = inner
            .records
            .get(&record.handle)
            .map(|e| (e.verification.status, e.owner));
        match existing {
            Some((VerificationStatus::Confirmed, _)) => {
                tracing::debug!(handle = %record.handle, "Handle already confirmed, skipping insert");
                return Ok(());
            }
            Some((_, prev_owner)) => {
                // Replacing a not-yet-confirmed record: drop the stale owner
                // link so the index never holds a handle under two owners.
                if let Some(handles) = inner.by_owner.get_mut(&prev_owner) {
                    handles.remove(&record.handle);
                    if handles.is_empty() {
                        inner.by_owner.remove(&prev_owner);
                    }
                }
            }
            None => {
                if inner.records.len() >= self.capacity {
                    return Err(GatewatchError::CapacityExceeded {
                        store: "ciphertexts",
                        capacity: self.capacity,
                    });
                }
            }
        }

        tracing::debug!(
            handle = %record.handle,
            owner = %record.owner,
            provenance = %record.provenance,
            "Stored confirmed ciphertext"
        );
        inner
            .by_owner
            .entry(record.owner)
            .or_default()
            .insert(record.handle.clone());
        inner.records.insert(record.handle.clone(), record);
        Ok(())
    }

    async fn update_verification(
        &self,
        handle: &str,
        verification: VerificationInfo,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;

        let record = inner
            .records
            .get_mut(handle)
            .ok_or_else(|| GatewatchError::CiphertextNotFound(handle.to_string()))?;

        if record.verification.status == VerificationStatus::Confirmed
            && verification.status != VerificationStatus::Confirmed
        {
            tracing::debug!(
                handle = %handle,
                attempted = %verification.status,
                "Ignoring verification downgrade of confirmed handle"
            );
            return Ok(());
        }

        record.verification = verification;
        Ok(())
    }

    async fn get(&self, handle: &str) -> Result<Option<ConfirmedCiphertext>> {
        let inner = self.inner.read().await;
        Ok(inner.records.get(handle).cloned())
    }

    async fn get_many(&self, handles: &[String]) -> Result<Vec<Option<ConfirmedCiphertext>>> {
        let inner = self.inner.read().await;
        Ok(handles
            .iter()
            .map(|h| inner.records.get(h).cloned())
            .collect())
    }

    async fn is_confirmed(&self, handle: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .get(handle)
            .map(|r| r.verification.status == VerificationStatus::Confirmed)
            .unwrap_or(false))
    }

    async fn list_by_owner(&self, owner: &Pubkey) -> Result<Vec<ConfirmedCiphertext>> {
        let inner = self.inner.read().await;

        let mut records: Vec<ConfirmedCiphertext> = inner
            .by_owner
            .get(owner)
            .map(|handles| {
                handles
                    .iter()
                    .filter_map(|h| inner.records.get(h).cloned())
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by(|a, b| a.handle.cmp(&b.handle));
        Ok(records)
    }

    async fn expire_stale_pending(&self, max_age_secs: i64) -> Result<usize> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;

        let mut expired = 0;
        for record in inner.records.values_mut() {
            if record.verification.status == VerificationStatus::Pending
                && (now - record.created_at).num_seconds() > max_age_secs
            {
                record.verification.status = VerificationStatus::Expired;
                expired += 1;
            }
        }

        if expired > 0 {
            tracing::info!(expired = expired, "Marked stale pending ciphertexts expired");
        }
        Ok(expired)
    }

    async fn stats(&self) -> Result<CiphertextStats> {
        let inner = self.inner.read().await;

        let mut stats = CiphertextStats {
            total: inner.records.len(),
            ..Default::default()
        };
        for record in inner.records.values() {
            match record.verification.status {
                VerificationStatus::Confirmed => stats.confirmed += 1,
                VerificationStatus::Pending => stats.pending += 1,
                VerificationStatus::Expired => stats.expired += 1,
            }
            stats.total_bytes += record.blob_size();
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{EncryptionParams, PendingCiphertext, PolicyKind, Provenance};

    use super::*;

    fn confirmed_record(handle: &str, owner: Pubkey) -> ConfirmedCiphertext {
        let pending = PendingCiphertext::new(
            handle.to_string(),
            serde_json::json!({"c0": "dGVzdA=="}),
            [3u8; 32],
            EncryptionParams::default(),
            PolicyKind::OwnerControlled.context(),
            [4u8; 32],
            owner,
            format!("ipfs://Qm{}", handle),
            Provenance::Client,
            300,
        );
        ConfirmedCiphertext::from_pending(pending)
    }

    #[tokio::test]
    async fn insert_then_get() {
        let store = InMemoryCiphertextStore::new(100);
        let owner = Pubkey::new_unique();
        store.insert(confirmed_record("h1", owner)).await.unwrap();

        let got = store.get("h1").await.unwrap().unwrap();
        assert_eq!(got.owner, owner);
        assert_eq!(got.verification.status, VerificationStatus::Pending);
    }

    #[tokio::test]
    async fn reinserting_confirmed_handle_is_noop() {
        let store = InMemoryCiphertextStore::new(100);
        let owner = Pubkey::new_unique();
        store.insert(confirmed_record("h1", owner)).await.unwrap();
        store
            .update_verification("h1", VerificationInfo::confirmed("sig1", 42))
            .await
            .unwrap();

        // A second insert must not clobber the confirmed record.
        let other = confirmed_record("h1", Pubkey::new_unique());
        store.insert(other).await.unwrap();

        let got = store.get("h1").await.unwrap().unwrap();
        assert_eq!(got.owner, owner);
        assert_eq!(got.verification.status, VerificationStatus::Confirmed);
    }

    #[tokio::test]
    async fn confirmed_status_never_downgrades() {
        let store = InMemoryCiphertextStore::new(100);
        store
            .insert(confirmed_record("h1", Pubkey::new_unique()))
            .await
            .unwrap();
        store
            .update_verification("h1", VerificationInfo::confirmed("sig1", 42))
            .await
            .unwrap();

        store
            .update_verification("h1", VerificationInfo::pending())
            .await
            .unwrap();
        assert!(store.is_confirmed("h1").await.unwrap());
    }

    #[tokio::test]
    async fn update_verification_on_missing_handle_errors() {
        let store = InMemoryCiphertextStore::new(100);
        let err = store
            .update_verification("nope", VerificationInfo::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewatchError::CiphertextNotFound(_)));
    }

    #[tokio::test]
    async fn get_many_preserves_request_order() {
        let store = InMemoryCiphertextStore::new(100);
        let owner = Pubkey::new_unique();
        store.insert(confirmed_record("a", owner)).await.unwrap();
        store.insert(confirmed_record("c", owner)).await.unwrap();

        let got = store
            .get_many(&["c".into(), "b".into(), "a".into()])
            .await
            .unwrap();
        assert_eq!(got[0].as_ref().map(|r| r.handle.as_str()), Some("c"));
        assert!(got[1].is_none());
        assert_eq!(got[2].as_ref().map(|r| r.handle.as_str()), Some("a"));
    }

    #[tokio::test]
    async fn list_by_owner_uses_index() {
        let store = InMemoryCiphertextStore::new(100);
        let owner = Pubkey::new_unique();
        store.insert(confirmed_record("h1", owner)).await.unwrap();
        store.insert(confirmed_record("h2", owner)).await.unwrap();
        store
            .insert(confirmed_record("h3", Pubkey::new_unique()))
            .await
            .unwrap();

        let mine = store.list_by_owner(&owner).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|r| r.owner == owner));
    }

    #[tokio::test]
    async fn expire_stale_pending_only_touches_old_pending() {
        let store = InMemoryCiphertextStore::new(100);
        store
            .insert(confirmed_record("old", Pubkey::new_unique()))
            .await
            .unwrap();
        store
            .insert(confirmed_record("done", Pubkey::new_unique()))
            .await
            .unwrap();
        store
            .update_verification("done", VerificationInfo::confirmed("sig", 7))
            .await
            .unwrap();

        // max_age of -1s makes every pending record stale immediately.
        let expired = store.expire_stale_pending(-1).await.unwrap();
        assert_eq!(expired, 1);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.confirmed, 1);
    }

    #[tokio::test]
    async fn capacity_overflow_fails_loudly() {
        let store = InMemoryCiphertextStore::new(1);
        store
            .insert(confirmed_record("h1", Pubkey::new_unique()))
            .await
            .unwrap();

        let err = store
            .insert(confirmed_record("h2", Pubkey::new_unique()))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewatchError::CapacityExceeded { .. }));
    }

    #[tokio::test]
    async fn stats_counts_bytes() {
        let store = InMemoryCiphertextStore::new(100);
        store
            .insert(confirmed_record("h1", Pubkey::new_unique()))
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 1);
        assert!(stats.total_bytes > 0);
    }
}
