//! In-memory staging store for ciphertexts awaiting ledger confirmation
//!
//! Entries are keyed by their expected CID handle and carry a hard deadline.
//! Expiry is enforced twice: lazily on every read, and eagerly by a periodic
//! sweep. Both paths compare against the same `expires_at` instant so they
//! cannot disagree on the boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::{PendingCiphertext, PendingStats};

use super::error::GatewatchError;
use super::traits::PendingStore;
use super::Result;

/// Entries this close to their deadline count as "expiring soon" in stats.
const EXPIRING_SOON_SECS: i64 = 60;

/// Bounded in-memory implementation of [`PendingStore`].
pub struct InMemoryPendingStore {
    /// Maximum number of staged entries
    capacity: usize,
    /// Maximum serialized blob size per entry, in bytes
    max_blob_bytes: usize,
    entries: RwLock<HashMap<String, PendingCiphertext>>,
}

impl InMemoryPendingStore {
    pub fn new(capacity: usize, max_blob_bytes: usize) -> Self {
        Self {
            capacity,
            max_blob_bytes,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PendingStore for InMemoryPendingStore {
    async fn put(&self, entry: PendingCiphertext) -> Result<()> {
        let blob_size = entry.blob_size();
        if blob_size > self.max_blob_bytes {
            return Err(GatewatchError::PayloadTooLarge {
                size: blob_size,
                max: self.max_blob_bytes,
            });
        }

        let mut entries = self.entries.write().await;

        // Overwriting an existing handle does not consume a slot.
        if entries.len() >= self.capacity && !entries.contains_key(&entry.handle) {
            return Err(GatewatchError::CapacityExceeded {
                store: "pending",
                capacity: self.capacity,
            });
        }

        tracing::debug!(
            handle = %entry.handle,
            blob_bytes = blob_size,
            expires_at = %entry.expires_at,
            "Staged pending ciphertext"
        );
        entries.insert(entry.handle.clone(), entry);
        Ok(())
    }

    async fn get(&self, handle: &str) -> Result<Option<PendingCiphertext>> {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get(handle) {
            if Utc::now() >= entry.expires_at {
                entries.remove(handle);
                tracing::debug!(handle = %handle, "Pending ciphertext expired on read");
                return Ok(None);
            }
            return Ok(Some(entry.clone()));
        }

        Ok(None)
    }

    async fn take(&self, handle: &str) -> Result<Option<PendingCiphertext>> {
        let mut entries = self.entries.write().await;

        match entries.remove(handle) {
            Some(entry) if Utc::now() >= entry.expires_at => {
                tracing::debug!(handle = %handle, "Pending ciphertext expired on take");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        let removed = before - entries.len();

        if removed > 0 {
            tracing::info!(
                removed = removed,
                remaining = entries.len(),
                "Swept expired pending ciphertexts"
            );
        }
        Ok(removed)
    }

    async fn stats(&self) -> Result<PendingStats> {
        let now = Utc::now();
        let entries = self.entries.read().await;

        let expiring_soon = entries
            .values()
            .filter(|e| (e.expires_at - now).num_seconds() < EXPIRING_SOON_SECS)
            .count();
        let oldest_age_secs = entries
            .values()
            .map(|e| (now - e.created_at).num_seconds())
            .max();

        Ok(PendingStats {
            total: entries.len(),
            expiring_soon,
            oldest_age_secs,
        })
    }
}
