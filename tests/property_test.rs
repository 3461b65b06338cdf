//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for any valid input.

use proptest::prelude::*;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;

use gatewatch::crypto::{
    canonical_json_hash, compute_cid_set_id, derive_leaf_digest, derive_result_handle,
    derive_storage_ref, fold_merkle_proof, hash_to_hex,
};
use gatewatch::domain::{parse_hash256, DagEdge, DagNode};
use gatewatch::infra::{decrypt_bitmap, topological_order};

// ============================================================================
// Custom Strategies
// ============================================================================

/// Generate a random public key
fn arb_pubkey() -> impl Strategy<Value = Pubkey> {
    any::<[u8; 32]>().prop_map(Pubkey::new_from_array)
}

/// Generate a random 32-byte hash
fn arb_hash256() -> impl Strategy<Value = [u8; 32]> {
    any::<[u8; 32]>()
}

/// Generate a random JSON payload
fn arb_payload() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(json!({})),
        (any::<i64>(), ".*").prop_map(|(num, str)| json!({ "ct": str, "nonce": num })),
        any::<i64>().prop_map(|n| json!({
            "params": {
                "scheme": {
                    "level": n
                }
            }
        })),
        prop::collection::vec(any::<i32>(), 0..10).prop_map(|v| json!({ "chunks": v })),
    ]
}

/// Generate a list of 1..=16 distinct handles
fn arb_handles() -> impl Strategy<Value = Vec<Pubkey>> {
    prop::collection::vec(arb_pubkey(), 1..=16)
}

// ============================================================================
// Canonical JSON Hash Properties
// ============================================================================

proptest! {
    /// Property: Canonical hash is deterministic
    #[test]
    fn canonical_hash_is_deterministic(payload in arb_payload()) {
        let hash1 = canonical_json_hash(&payload);
        let hash2 = canonical_json_hash(&payload);
        prop_assert_eq!(hash1, hash2);
    }

    /// Property: Key order doesn't affect canonical hash
    #[test]
    fn canonical_hash_ignores_key_order(
        a in any::<i64>(),
        b in any::<i64>(),
        c in any::<i64>()
    ) {
        let payload1 = json!({ "a": a, "b": b, "c": c });
        let payload2 = json!({ "c": c, "a": a, "b": b });

        prop_assert_eq!(canonical_json_hash(&payload1), canonical_json_hash(&payload2));
    }

    /// Property: Different payloads produce different hashes (with high probability)
    #[test]
    fn different_payloads_different_hashes(
        a in any::<i64>(),
        b in any::<i64>()
    ) {
        prop_assume!(a != b);

        let payload1 = json!({ "value": a });
        let payload2 = json!({ "value": b });

        prop_assert_ne!(canonical_json_hash(&payload1), canonical_json_hash(&payload2));
    }

    /// Property: hash text round-trips through the 0x-hex rendering
    #[test]
    fn hash_hex_round_trips(hash in arb_hash256()) {
        let rendered = hash_to_hex(&hash);
        prop_assert!(rendered.starts_with("0x"));
        prop_assert_eq!(rendered.len(), 66);
        prop_assert_eq!(parse_hash256(&rendered).unwrap(), hash);
    }
}

// ============================================================================
// CID Set Identity Properties
// ============================================================================

proptest! {
    /// Property: the set id is deterministic over the same handle order
    #[test]
    fn cid_set_id_is_deterministic(handles in arb_handles()) {
        prop_assert_eq!(compute_cid_set_id(&handles), compute_cid_set_id(&handles));
    }

    /// Property: the set id is order-sensitive
    #[test]
    fn cid_set_id_is_order_sensitive(handles in arb_handles()) {
        prop_assume!(handles.len() >= 2);
        prop_assume!(handles[0] != handles[1]);

        let mut permuted = handles.clone();
        permuted.swap(0, 1);
        prop_assert_ne!(compute_cid_set_id(&handles), compute_cid_set_id(&permuted));
    }

    /// Property: dropping a handle changes the set id
    #[test]
    fn cid_set_id_covers_every_handle(handles in arb_handles()) {
        prop_assume!(handles.len() >= 2);
        let truncated = &handles[..handles.len() - 1];
        prop_assert_ne!(compute_cid_set_id(&handles), compute_cid_set_id(truncated));
    }
}

// ============================================================================
// Deterministic Derivation Properties
// ============================================================================

proptest! {
    /// Property: result handles are a pure function of the job id
    #[test]
    fn result_handle_is_deterministic(job_id in arb_pubkey()) {
        prop_assert_eq!(derive_result_handle(&job_id), derive_result_handle(&job_id));
    }

    /// Property: distinct jobs get distinct result handles
    #[test]
    fn result_handles_are_distinct(a in arb_pubkey(), b in arb_pubkey()) {
        prop_assume!(a != b);
        prop_assert_ne!(derive_result_handle(&a), derive_result_handle(&b));
    }

    /// Property: storage refs are fixed-shape and content-addressed
    #[test]
    fn storage_ref_shape(hash in arb_hash256()) {
        let storage_ref = derive_storage_ref(&hash);
        prop_assert!(storage_ref.starts_with("ipfs://Qm"));
        prop_assert_eq!(storage_ref.len(), "ipfs://Qm".len() + 46);
        prop_assert_eq!(storage_ref.clone(), derive_storage_ref(&hash));
    }

    /// Property: folding a proof is deterministic and digest-sensitive
    #[test]
    fn merkle_fold_is_digest_sensitive(
        leaf_a in arb_hash256(),
        leaf_b in arb_hash256(),
        index in 0u64..1024,
        proof in prop::collection::vec(arb_hash256(), 0..8)
    ) {
        prop_assume!(leaf_a != leaf_b);
        let root_a = fold_merkle_proof(&leaf_a, index, &proof);
        prop_assert_eq!(root_a, fold_merkle_proof(&leaf_a, index, &proof));
        prop_assert_ne!(root_a, fold_merkle_proof(&leaf_b, index, &proof));
    }

    /// Property: leaf digests differ across commits and leaves
    #[test]
    fn leaf_digest_binds_commit_and_index(
        commit in "[a-z0-9-]{1,32}",
        a in 0u64..1000,
        b in 0u64..1000
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(derive_leaf_digest(&commit, a), derive_leaf_digest(&commit, b));
        prop_assert_eq!(derive_leaf_digest(&commit, a), derive_leaf_digest(&commit, a));
    }
}

// ============================================================================
// Planner Properties
// ============================================================================

fn edge_free_nodes(count: usize) -> Vec<DagNode> {
    (0..count)
        .map(|id| DagNode {
            id,
            job_id: Pubkey::new_unique(),
            cid_handles: vec![],
            output_handle: String::new(),
            depends_on: vec![],
        })
        .collect()
}

proptest! {
    /// Property: an edge-free DAG schedules in input order
    #[test]
    fn edge_free_topo_order_is_input_order(count in 0usize..64) {
        let order = topological_order(count, &[]).unwrap();
        prop_assert_eq!(order, (0..count).collect::<Vec<_>>());
    }

    /// Property: a forward chain always schedules, in chain order
    #[test]
    fn forward_chain_is_schedulable(count in 1usize..64) {
        let edges: Vec<DagEdge> = (1..count)
            .map(|i| DagEdge { from: i - 1, to: i })
            .collect();
        let order = topological_order(count, &edges).unwrap();
        prop_assert_eq!(order, (0..count).collect::<Vec<_>>());
    }

    /// Property: closing a chain into a ring is always rejected
    #[test]
    fn ring_is_always_a_cycle(count in 2usize..64) {
        let mut edges: Vec<DagEdge> = (1..count)
            .map(|i| DagEdge { from: i - 1, to: i })
            .collect();
        edges.push(DagEdge { from: count - 1, to: 0 });
        prop_assert!(topological_order(count, &edges).is_err());
    }

    /// Property: topological order visits every node exactly once
    #[test]
    fn topo_order_is_a_permutation(
        count in 1usize..32,
        seed_edges in prop::collection::vec((0usize..32, 0usize..32), 0..16)
    ) {
        // Forward-only edges cannot form cycles.
        let edges: Vec<DagEdge> = seed_edges
            .into_iter()
            .map(|(a, b)| (a % count, b % count))
            .filter(|(a, b)| a < b)
            .map(|(from, to)| DagEdge { from, to })
            .collect();

        let mut order = topological_order(count, &edges).unwrap();
        order.sort_unstable();
        prop_assert_eq!(order, (0..count).collect::<Vec<_>>());
    }

    /// Property: bitmap length tracks node count and sets one bit per ready node
    #[test]
    fn bitmap_length_and_population(count in 0usize..64) {
        let nodes = edge_free_nodes(count);
        let bitmap = decrypt_bitmap(&nodes);

        prop_assert!(bitmap.starts_with("0x"));
        prop_assert_eq!(bitmap.len(), 2 + 2 * count.div_ceil(8));

        let bytes = hex::decode(&bitmap[2..]).unwrap();
        let set_bits: u32 = bytes.iter().map(|b| b.count_ones()).sum();
        prop_assert_eq!(set_bits as usize, count);
    }
}
