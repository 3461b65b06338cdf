//! Batch execution plans
//!
//! A plan covers a set of queued jobs as a dependency DAG with a topological
//! execution order and a decrypt-priority bitmap. The current dependency
//! model has no edges (dependency inference needs IR parsing), but the edge
//! set is first-class so richer models slot in without reshaping the plan.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use super::{pubkey_base58, vec_pubkey_base58, QueueStats};

/// One job in the plan; `id` is the dense index in slot order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagNode {
    pub id: usize,
    #[serde(with = "pubkey_base58")]
    pub job_id: Pubkey,
    #[serde(with = "vec_pubkey_base58")]
    pub cid_handles: Vec<Pubkey>,
    /// Deterministic result handle this job will produce
    pub output_handle: String,
    pub depends_on: Vec<usize>,
}

/// Directed dependency: `from` must complete before `to`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagEdge {
    pub from: usize,
    pub to: usize,
}

/// Scheduling hints for executors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHints {
    pub description: String,
    pub decrypt_priority: String,
    /// Nodes executable immediately (zero unresolved dependencies)
    pub parallelism: usize,
}

/// Execution plan over a window of queued jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub window_start_slot: u64,
    pub nodes: Vec<DagNode>,
    pub edges: Vec<DagEdge>,
    pub topo_order: Vec<usize>,
    /// Bit i of byte i/8 set when node i has zero in-degree; rendered as
    /// 0x-prefixed minimal-length hex
    pub decrypt_needed_bitmap: String,
    pub execution_hints: ExecutionHints,
    pub queue_stats: QueueStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_serde_round_trip() {
        let plan = BatchPlan {
            window_start_slot: 10,
            nodes: vec![DagNode {
                id: 0,
                job_id: Pubkey::new_unique(),
                cid_handles: vec![Pubkey::new_unique()],
                output_handle: "ResultHandle".to_string(),
                depends_on: vec![],
            }],
            edges: vec![],
            topo_order: vec![0],
            decrypt_needed_bitmap: "0x01".to_string(),
            execution_hints: ExecutionHints {
                description: "1 job ready".to_string(),
                decrypt_priority: "0x01".to_string(),
                parallelism: 1,
            },
            queue_stats: QueueStats::default(),
        };

        let json = serde_json::to_string(&plan).unwrap();
        let back: BatchPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plan);
    }
}
