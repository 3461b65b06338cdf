//! Optimistic verification challenge coordinator
//!
//! A committed batch result can be disputed per leaf during its challenge
//! window. Opening a challenge triggers re-execution by a fixed verifier
//! quorum; the digest with the most votes wins, ties resolving to the digest
//! that reached the max count first. Resolution happens synchronously inside
//! the request that opened the challenge.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use solana_sdk::signature::{Keypair, Signer};
use tokio::sync::RwLock;

use crate::crypto::{derive_leaf_digest, fold_merkle_proof};
use crate::domain::{Attestation, Challenge, ChallengeResolution, ChallengeStatus, Hash256};

use super::error::GatewatchError;
use super::traits::LeafVerifier;
use super::Result;

/// Default quorum size when no explicit verifier set is injected.
const DEFAULT_VERIFIER_COUNT: usize = 3;

/// Verifier that deterministically re-executes a leaf and signs its digest.
pub struct ReExecutionVerifier {
    name: String,
    keypair: Keypair,
}

impl ReExecutionVerifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keypair: Keypair::new(),
        }
    }
}

#[async_trait]
impl LeafVerifier for ReExecutionVerifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attest(&self, commit_id: &str, leaf_index: u64) -> Result<Attestation> {
        let digest = derive_leaf_digest(commit_id, leaf_index);
        let signature = self.keypair.sign_message(&digest).to_string();
        Ok(Attestation {
            verifier: self.name.clone(),
            digest,
            signature,
        })
    }
}

/// Coordinates challenges keyed by `(commit_id, leaf_index)`.
pub struct ChallengeCoordinator {
    verifiers: Vec<Arc<dyn LeafVerifier>>,
    challenges: RwLock<HashMap<(String, u64), Challenge>>,
}

impl ChallengeCoordinator {
    pub fn new(verifiers: Vec<Arc<dyn LeafVerifier>>) -> Self {
        Self {
            verifiers,
            challenges: RwLock::new(HashMap::new()),
        }
    }

    /// Coordinator backed by `verifier-1..n` re-execution verifiers.
    pub fn with_default_verifiers() -> Self {
        let verifiers = (1..=DEFAULT_VERIFIER_COUNT)
            .map(|i| {
                Arc::new(ReExecutionVerifier::new(format!("verifier-{}", i)))
                    as Arc<dyn LeafVerifier>
            })
            .collect();
        Self::new(verifiers)
    }

    /// Open a challenge and resolve it through the verifier quorum.
    pub async fn open_and_resolve(
        &self,
        commit_id: &str,
        leaf_index: u64,
        conflicting_digest: Hash256,
        merkle_proof: Vec<Hash256>,
    ) -> Result<(Challenge, ChallengeResolution)> {
        let key = (commit_id.to_string(), leaf_index);
        let challenge = Challenge::open(
            commit_id,
            leaf_index,
            conflicting_digest,
            merkle_proof.clone(),
        );
        // Visible as Opened while the quorum runs; the lock is not held
        // across verifier awaits.
        self.challenges
            .write()
            .await
            .insert(key.clone(), challenge.clone());

        let mut attestations = Vec::new();
        for verifier in &self.verifiers {
            match verifier.attest(commit_id, leaf_index).await {
                Ok(attestation) => attestations.push(attestation),
                Err(e) => tracing::warn!(
                    verifier = verifier.name(),
                    commit_id = %commit_id,
                    leaf_index = leaf_index,
                    error = %e,
                    "Verifier did not respond to challenge"
                ),
            }
        }
        if attestations.is_empty() {
            return Err(GatewatchError::internal(
                "no verifier responded to challenge",
            ));
        }

        // First-seen tally order is what breaks ties.
        let mut tally: Vec<(Hash256, usize)> = Vec::new();
        for attestation in &attestations {
            match tally.iter_mut().find(|(d, _)| *d == attestation.digest) {
                Some((_, votes)) => *votes += 1,
                None => tally.push((attestation.digest, 1)),
            }
        }
        let (mut accepted_digest, mut max_votes) = tally[0];
        for &(digest, votes) in &tally[1..] {
            if votes > max_votes {
                accepted_digest = digest;
                max_votes = votes;
            }
        }

        let new_result_root = fold_merkle_proof(&accepted_digest, leaf_index, &merkle_proof);
        let resolution = ChallengeResolution {
            verifiers: attestations.iter().map(|a| a.verifier.clone()).collect(),
            quorum: format!("{}/{}", max_votes, self.verifiers.len()),
            accepted_digest,
            new_result_root,
        };

        let resolved = {
            let mut challenges = self.challenges.write().await;
            let entry = challenges
                .get_mut(&key)
                .ok_or_else(|| GatewatchError::internal("challenge vanished during resolution"))?;
            entry.status = ChallengeStatus::Resolved;
            entry.attestations = attestations;
            entry.accepted_digest = Some(accepted_digest);
            entry.new_result_root = Some(new_result_root);
            entry.resolved_at = Some(Utc::now());
            entry.clone()
        };

        tracing::info!(
            commit_id = %commit_id,
            leaf_index = leaf_index,
            quorum = %resolution.quorum,
            "Challenge resolved"
        );
        Ok((resolved, resolution))
    }

    /// Current state of a challenge; `None` means no challenge was opened.
    pub async fn get(&self, commit_id: &str, leaf_index: u64) -> Option<Challenge> {
        let challenges = self.challenges.read().await;
        challenges
            .get(&(commit_id.to_string(), leaf_index))
            .cloned()
    }
}
