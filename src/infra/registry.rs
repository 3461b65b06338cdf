//! In-memory registration log
//!
//! Tracks every registration intent (one per staging request, possibly
//! covering several handles) and the per-handle confirmation outcome fed
//! back by the event listener. A handle maps to at most one live entry.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::RwLock;

use crate::domain::{LogEntry, RegistrationRecord, RegistrationStats, RegistrationStatus};

use super::error::GatewatchError;
use super::traits::RegistrationLog;
use super::Result;

/// New registration id: `RID-{unix_millis}-{6 random alphanumerics}`.
pub fn generate_reg_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();
    format!("RID-{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// In-memory implementation of [`RegistrationLog`].
#[derive(Default)]
pub struct InMemoryRegistrationLog {
    inner: RwLock<RegistryIndex>,
}

#[derive(Default)]
struct RegistryIndex {
    records: HashMap<String, RegistrationRecord>,
    entries: HashMap<String, LogEntry>,
    reg_by_handle: HashMap<String, String>,
}

impl InMemoryRegistrationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryIndex {
    /// Roll per-handle outcomes up into the parent record's status.
    fn refresh_record_status(&mut self, reg_id: &str) {
        let Some(record) = self.records.get_mut(reg_id) else {
            return;
        };

        let statuses: Vec<RegistrationStatus> = record
            .handles
            .iter()
            .filter_map(|h| self.entries.get(h).map(|e| e.status))
            .collect();

        record.status = if statuses.iter().any(|s| *s == RegistrationStatus::Failed) {
            RegistrationStatus::Failed
        } else if statuses.len() == record.handles.len()
            && statuses.iter().all(|s| *s == RegistrationStatus::Confirmed)
        {
            RegistrationStatus::Confirmed
        } else {
            RegistrationStatus::Pending
        };
    }
}

#[async_trait]
impl RegistrationLog for InMemoryRegistrationLog {
    async fn create(&self, record: RegistrationRecord) -> Result<()> {
        if record.handles.is_empty() {
            return Err(GatewatchError::validation(
                "registration must cover at least one handle",
            ));
        }
        if record.handles.len() != record.content_hashes.len()
            || record.handles.len() != record.policy_hashes.len()
        {
            return Err(GatewatchError::validation(
                "handle, content hash and policy hash lists must have equal length",
            ));
        }

        let mut inner = self.inner.write().await;

        // Reject before mutating anything so a duplicate leaves no trace.
        for handle in &record.handles {
            if let Some(entry) = inner.entries.get(handle) {
                if entry.status != RegistrationStatus::Failed {
                    return Err(GatewatchError::validation(format!(
                        "handle {} already has a live registration",
                        handle
                    )));
                }
            }
        }

        let now = Utc::now();
        for (i, handle) in record.handles.iter().enumerate() {
            inner.entries.insert(
                handle.clone(),
                LogEntry {
                    handle: handle.clone(),
                    content_hash: record.content_hashes[i],
                    policy_hash: record.policy_hashes[i],
                    status: RegistrationStatus::Pending,
                    tx_signature: None,
                    updated_at: now,
                },
            );
            inner
                .reg_by_handle
                .insert(handle.clone(), record.reg_id.clone());
        }

        tracing::info!(
            reg_id = %record.reg_id,
            handles = record.handles.len(),
            owner = %record.owner,
            "Created registration"
        );
        inner.records.insert(record.reg_id.clone(), record);
        Ok(())
    }

    async fn update_entry_status(
        &self,
        handle: &str,
        status: RegistrationStatus,
        tx_signature: Option<String>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;

        let entry = inner
            .entries
            .get_mut(handle)
            .ok_or_else(|| GatewatchError::RegistrationEntryNotFound(handle.to_string()))?;

        entry.status = status;
        if tx_signature.is_some() {
            entry.tx_signature = tx_signature;
        }
        entry.updated_at = Utc::now();

        let reg_id = inner.reg_by_handle.get(handle).cloned();
        if let Some(reg_id) = reg_id {
            inner.refresh_record_status(&reg_id);
        }
        Ok(())
    }

    async fn get(&self, reg_id: &str) -> Result<RegistrationRecord> {
        let inner = self.inner.read().await;
        inner
            .records
            .get(reg_id)
            .cloned()
            .ok_or_else(|| GatewatchError::RegistrationNotFound(reg_id.to_string()))
    }

    async fn entries(&self, reg_id: &str) -> Result<Vec<LogEntry>> {
        let inner = self.inner.read().await;

        let record = inner
            .records
            .get(reg_id)
            .ok_or_else(|| GatewatchError::RegistrationNotFound(reg_id.to_string()))?;
        Ok(record
            .handles
            .iter()
            .filter_map(|h| inner.entries.get(h).cloned())
            .collect())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<RegistrationRecord>> {
        let inner = self.inner.read().await;

        let mut records: Vec<RegistrationRecord> = inner.records.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn stats(&self) -> Result<RegistrationStats> {
        let inner = self.inner.read().await;

        let mut stats = RegistrationStats {
            records: inner.records.len(),
            entries: inner.entries.len(),
            ..Default::default()
        };
        for entry in inner.entries.values() {
            match entry.status {
                RegistrationStatus::Pending => stats.pending += 1,
                RegistrationStatus::Confirmed => stats.confirmed += 1,
                RegistrationStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use solana_sdk::pubkey::Pubkey;

    use crate::domain::DomainInfo;

    use super::*;

    fn sample_record(reg_id: &str, handles: &[&str]) -> RegistrationRecord {
        RegistrationRecord {
            reg_id: reg_id.to_string(),
            handles: handles.iter().map(|h| h.to_string()).collect(),
            content_hashes: vec![[1u8; 32]; handles.len()],
            policy_hashes: vec![[2u8; 32]; handles.len()],
            owner: Pubkey::new_unique(),
            domain: DomainInfo::new("devnet", "Gate11111", "v1-2025", 7),
            created_at: Utc::now(),
            status: RegistrationStatus::Pending,
        }
    }

    #[test]
    fn reg_id_shape() {
        let id = generate_reg_id();
        assert!(id.starts_with("RID-"));
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn create_and_fetch_entries_in_order() {
        let log = InMemoryRegistrationLog::new();
        log.create(sample_record("RID-1", &["b", "a"])).await.unwrap();

        let entries = log.entries("RID-1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].handle, "b");
        assert_eq!(entries[1].handle, "a");
        assert!(entries
            .iter()
            .all(|e| e.status == RegistrationStatus::Pending));
    }

    #[tokio::test]
    async fn duplicate_live_handle_is_rejected_without_mutation() {
        let log = InMemoryRegistrationLog::new();
        log.create(sample_record("RID-1", &["h1"])).await.unwrap();

        let err = log
            .create(sample_record("RID-2", &["h2", "h1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewatchError::Validation(_)));

        // Nothing from the rejected registration landed.
        assert!(log.get("RID-2").await.is_err());
        assert_eq!(log.stats().await.unwrap().entries, 1);
    }

    #[tokio::test]
    async fn failed_handle_can_be_reregistered() {
        let log = InMemoryRegistrationLog::new();
        log.create(sample_record("RID-1", &["h1"])).await.unwrap();
        log.update_entry_status("h1", RegistrationStatus::Failed, None)
            .await
            .unwrap();

        log.create(sample_record("RID-2", &["h1"])).await.unwrap();
        let entries = log.entries("RID-2").await.unwrap();
        assert_eq!(entries[0].status, RegistrationStatus::Pending);
    }

    #[tokio::test]
    async fn record_status_rolls_up_from_entries() {
        let log = InMemoryRegistrationLog::new();
        log.create(sample_record("RID-1", &["h1", "h2"])).await.unwrap();

        log.update_entry_status("h1", RegistrationStatus::Confirmed, Some("sig1".into()))
            .await
            .unwrap();
        assert_eq!(
            log.get("RID-1").await.unwrap().status,
            RegistrationStatus::Pending
        );

        log.update_entry_status("h2", RegistrationStatus::Confirmed, Some("sig2".into()))
            .await
            .unwrap();
        assert_eq!(
            log.get("RID-1").await.unwrap().status,
            RegistrationStatus::Confirmed
        );

        let entries = log.entries("RID-1").await.unwrap();
        assert_eq!(entries[0].tx_signature.as_deref(), Some("sig1"));
    }

    #[tokio::test]
    async fn unknown_handle_update_errors() {
        let log = InMemoryRegistrationLog::new();
        let err = log
            .update_entry_status("nope", RegistrationStatus::Confirmed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewatchError::RegistrationEntryNotFound(_)));
    }

    #[tokio::test]
    async fn list_recent_is_newest_first() {
        let log = InMemoryRegistrationLog::new();
        let mut older = sample_record("RID-old", &["h1"]);
        older.created_at = Utc::now() - chrono::Duration::seconds(60);
        log.create(older).await.unwrap();
        log.create(sample_record("RID-new", &["h2"])).await.unwrap();

        let recent = log.list_recent(10).await.unwrap();
        assert_eq!(recent[0].reg_id, "RID-new");
        assert_eq!(recent[1].reg_id, "RID-old");

        assert_eq!(log.list_recent(1).await.unwrap().len(), 1);
    }
}
