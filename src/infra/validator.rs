//! Job admission validation
//!
//! A submitted job is enqueued only if every referenced CID handle is
//! confirmed in the ciphertext store and the declared `cid_set_id` matches
//! the hash recomputed over the handles in declared order. Order matters: a
//! permuted handle list hashes differently and the submission is rejected
//! with no queue mutation.

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;

use crate::crypto::compute_cid_set_id;
use crate::domain::{cid_handle_hex, Hash256, MAX_CIDS};

use super::error::GatewatchError;
use super::traits::CiphertextStore;
use super::Result;

/// Outcome of validating one job submission.
#[derive(Debug, Clone)]
pub struct CidValidationReport {
    /// Number of handles the job references
    pub checked: usize,
    /// Within `1..=MAX_CIDS`
    pub count_ok: bool,
    /// Handles with no confirmed ciphertext record
    pub missing_handles: Vec<String>,
    pub declared_set_id: Hash256,
    /// Recomputed over the handles in declared order
    pub computed_set_id: Hash256,
}

impl CidValidationReport {
    pub fn is_valid(&self) -> bool {
        self.count_ok
            && self.missing_handles.is_empty()
            && self.computed_set_id == self.declared_set_id
    }

    /// First failed check, for logs and synchronous rejections.
    pub fn reason(&self) -> Option<String> {
        if !self.count_ok {
            return Some(format!(
                "cid count {} outside 1..={}",
                self.checked, MAX_CIDS
            ));
        }
        if !self.missing_handles.is_empty() {
            return Some(format!(
                "unconfirmed cid handles: {}",
                self.missing_handles.join(", ")
            ));
        }
        if self.computed_set_id != self.declared_set_id {
            return Some("cid_set_id does not match handles in declared order".to_string());
        }
        None
    }

    pub fn ensure(&self) -> Result<()> {
        match self.reason() {
            Some(reason) => Err(GatewatchError::CidValidation(reason)),
            None => Ok(()),
        }
    }
}

/// Validates submissions against the confirmed ciphertext store.
pub struct CidValidator {
    store: Arc<dyn CiphertextStore>,
}

impl CidValidator {
    pub fn new(store: Arc<dyn CiphertextStore>) -> Self {
        Self { store }
    }

    pub async fn validate_job_cids(
        &self,
        handles: &[Pubkey],
        declared_set_id: &Hash256,
    ) -> Result<CidValidationReport> {
        let mut missing_handles = Vec::new();
        for handle in handles {
            let key = cid_handle_hex(handle);
            if !self.store.is_confirmed(&key).await? {
                missing_handles.push(key);
            }
        }

        Ok(CidValidationReport {
            checked: handles.len(),
            count_ok: !handles.is_empty() && handles.len() <= MAX_CIDS,
            missing_handles,
            declared_set_id: *declared_set_id,
            computed_set_id: compute_cid_set_id(handles),
        })
    }

    /// Single-handle confirmation check (reveal path, diagnostics).
    pub async fn validate_handle(&self, handle: &str) -> Result<bool> {
        self.store.is_confirmed(handle).await
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{ConfirmedCiphertext, VerificationInfo};
    use crate::infra::InMemoryCiphertextStore;

    use super::*;

    async fn store_with_confirmed(handles: &[Pubkey]) -> Arc<InMemoryCiphertextStore> {
        let store = Arc::new(InMemoryCiphertextStore::new(100));
        for handle in handles {
            let key = cid_handle_hex(handle);
            store
                .insert(ConfirmedCiphertext::degraded(
                    key.clone(),
                    [1u8; 32],
                    [2u8; 32],
                    Pubkey::new_unique(),
                    5,
                ))
                .await
                .unwrap();
            store
                .update_verification(&key, VerificationInfo::confirmed("sig", 5))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn accepts_a_coherent_submission() {
        let handles = vec![Pubkey::new_unique(), Pubkey::new_unique()];
        let store = store_with_confirmed(&handles).await;
        let validator = CidValidator::new(store);

        let report = validator
            .validate_job_cids(&handles, &compute_cid_set_id(&handles))
            .await
            .unwrap();
        assert!(report.is_valid(), "reason: {:?}", report.reason());
        report.ensure().unwrap();
    }

    #[tokio::test]
    async fn rejects_reordered_handles() {
        let handles = vec![Pubkey::new_unique(), Pubkey::new_unique()];
        let store = store_with_confirmed(&handles).await;
        let validator = CidValidator::new(store);

        let mut reordered = handles.clone();
        reordered.swap(0, 1);
        let report = validator
            .validate_job_cids(&handles, &compute_cid_set_id(&reordered))
            .await
            .unwrap();
        assert!(!report.is_valid());
        assert!(report.reason().unwrap().contains("cid_set_id"));
        assert!(matches!(
            report.ensure().unwrap_err(),
            GatewatchError::CidValidation(_)
        ));
    }

    #[tokio::test]
    async fn rejects_unconfirmed_handles() {
        let known = Pubkey::new_unique();
        let unknown = Pubkey::new_unique();
        let store = store_with_confirmed(std::slice::from_ref(&known)).await;
        let validator = CidValidator::new(store);

        let handles = vec![known, unknown];
        let report = validator
            .validate_job_cids(&handles, &compute_cid_set_id(&handles))
            .await
            .unwrap();
        assert_eq!(report.missing_handles, vec![cid_handle_hex(&unknown)]);
        assert!(!report.is_valid());
    }

    #[tokio::test]
    async fn rejects_empty_and_oversized_handle_lists() {
        let store = store_with_confirmed(&[]).await;
        let validator = CidValidator::new(store.clone());

        let report = validator
            .validate_job_cids(&[], &compute_cid_set_id(&[]))
            .await
            .unwrap();
        assert!(!report.count_ok);
        assert!(report.reason().unwrap().contains("cid count"));

        let too_many: Vec<Pubkey> = (0..MAX_CIDS + 1).map(|_| Pubkey::new_unique()).collect();
        let report = validator
            .validate_job_cids(&too_many, &compute_cid_set_id(&too_many))
            .await
            .unwrap();
        assert!(!report.count_ok);
    }

    #[tokio::test]
    async fn validate_handle_checks_confirmation() {
        let known = Pubkey::new_unique();
        let store = store_with_confirmed(std::slice::from_ref(&known)).await;
        let validator = CidValidator::new(store);

        assert!(validator
            .validate_handle(&cid_handle_hex(&known))
            .await
            .unwrap());
        assert!(!validator
            .validate_handle(&cid_handle_hex(&Pubkey::new_unique()))
            .await
            .unwrap());
    }
}
