//! Batch execution planner
//!
//! Turns a window of queued jobs into a dependency DAG with a topological
//! execution order (Kahn's algorithm) and a decrypt-priority bitmap. The
//! dependency model is currently edge-free, so the order degenerates to
//! submission order, but the algorithm runs the general case and the cycle
//! check is real: a future edge source must not be able to smuggle in a
//! cycle and get a partial order back.

use std::collections::VecDeque;
use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;

use crate::crypto::derive_result_handle;
use crate::domain::{BatchPlan, DagEdge, DagNode, ExecutionHints, JobStatus};

use super::error::GatewatchError;
use super::traits::JobQueue;
use super::Result;

/// Which jobs a plan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSelector {
    /// All jobs of one batch account that are still queued
    Batch(Pubkey),
    /// Queued jobs submitted in `[start, end]`
    SlotWindow { start: u64, end: u64 },
    /// Everything currently queued
    AllQueued,
}

/// Plans execution over the live job queue.
pub struct BatchPlanner {
    queue: Arc<dyn JobQueue>,
}

impl BatchPlanner {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    pub async fn plan(&self, selector: PlanSelector) -> Result<BatchPlan> {
        let jobs = match selector {
            PlanSelector::Batch(batch_id) => self.queue.jobs_by_batch(&batch_id).await?,
            PlanSelector::SlotWindow { start, end } => {
                self.queue.jobs_by_slot_range(start, end).await?
            }
            PlanSelector::AllQueued => self.queue.queued_jobs(usize::MAX).await?,
        };
        let jobs: Vec<_> = jobs
            .into_iter()
            .filter(|j| j.status == JobStatus::Queued)
            .collect();

        let nodes: Vec<DagNode> = jobs
            .iter()
            .enumerate()
            .map(|(id, job)| DagNode {
                id,
                job_id: job.job_id,
                cid_handles: job.handles.clone(),
                output_handle: derive_result_handle(&job.job_id),
                depends_on: Vec::new(),
            })
            .collect();
        let edges: Vec<DagEdge> = Vec::new();

        let topo_order = topological_order(nodes.len(), &edges)?;
        let bitmap = decrypt_bitmap(&nodes);
        let ready = nodes.iter().filter(|n| n.depends_on.is_empty()).count();

        let window_start_slot = match selector {
            PlanSelector::SlotWindow { start, .. } => start,
            _ => jobs.iter().map(|j| j.slot).min().unwrap_or(0),
        };

        Ok(BatchPlan {
            window_start_slot,
            execution_hints: ExecutionHints {
                description: format!(
                    "{} of {} jobs executable immediately",
                    ready,
                    nodes.len()
                ),
                decrypt_priority: bitmap.clone(),
                parallelism: ready,
            },
            decrypt_needed_bitmap: bitmap,
            topo_order,
            nodes,
            edges,
            queue_stats: self.queue.stats().await?,
        })
    }
}

/// Kahn's algorithm over `node_count` nodes and the given edge list.
///
/// Returns the node ids in a valid execution order, or a cycle error when
/// not every node can be scheduled. Ready nodes release in id order, so an
/// edge-free graph yields exactly `0..node_count`.
pub fn topological_order(node_count: usize, edges: &[DagEdge]) -> Result<Vec<usize>> {
    let mut in_degree = vec![0usize; node_count];
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for edge in edges {
        if edge.from >= node_count || edge.to >= node_count {
            return Err(GatewatchError::validation(format!(
                "dag edge {} -> {} references an unknown node",
                edge.from, edge.to
            )));
        }
        adjacency[edge.from].push(edge.to);
        in_degree[edge.to] += 1;
    }

    let mut ready: VecDeque<usize> = (0..node_count).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(node_count);
    while let Some(node) = ready.pop_front() {
        order.push(node);
        for &next in &adjacency[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    if order.len() != node_count {
        return Err(GatewatchError::PlanCycle(format!(
            "{} of {} nodes form a dependency cycle",
            node_count - order.len(),
            node_count
        )));
    }
    Ok(order)
}

/// Bit i of byte i/8 set when node i has no unresolved dependencies.
pub fn decrypt_bitmap(nodes: &[DagNode]) -> String {
    let mut bytes = vec![0u8; (nodes.len() + 7) / 8];
    for (i, node) in nodes.iter().enumerate() {
        if node.depends_on.is_empty() {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    format!("0x{}", hex::encode(bytes))
}
