//! Critical path and topological order via Kahn's algorithm.

use crate::domain::NodeId;
use crate::graph::{Graph, Neighbors};
use std::collections::{HashMap, VecDeque};

/// In-degree table and successor lists, both keyed in load order.
struct Kahn {
    indegree: HashMap<NodeId, usize>,
    dependents: HashMap<NodeId, Vec<NodeId>>,
}

impl Kahn {
    fn new(graph: &Graph) -> Self {
        let mut indegree = HashMap::with_capacity(graph.len());
        let mut dependents = HashMap::with_capacity(graph.len());
        for id in graph.node_ids() {
            let known = graph
                .neighbors(*id, Neighbors::DependsOn)
                .into_iter()
                .filter(|dep| graph.contains(*dep))
                .count();
            indegree.insert(*id, known);
            dependents.insert(*id, graph.neighbors(*id, Neighbors::Dependents));
        }
        Self {
            indegree,
            dependents,
        }
    }

    /// Seed queue: nodes without prerequisites, in load order.
    fn roots(&self, graph: &Graph) -> VecDeque<NodeId> {
        graph
            .node_ids()
            .iter()
            .filter(|id| self.indegree.get(id) == Some(&0))
            .copied()
            .collect()
    }

    /// Record that `child` lost a prerequisite; returns `true` once it has none left.
    fn release(&mut self, child: NodeId) -> bool {
        match self.indegree.get_mut(&child) {
            Some(degree) => {
                *degree = degree.saturating_sub(1);
                *degree == 0
            }
            None => false,
        }
    }
}

/// Nodes in dependency order: every node after all of its prerequisites.
///
/// Ties are broken by load order. Nodes on a cycle (only possible on a
/// corrupted graph) are left out and the omission is logged.
pub fn topological_order(graph: &Graph) -> Vec<NodeId> {
    let mut kahn = Kahn::new(graph);
    let mut queue = kahn.roots(graph);

    let mut ordered = Vec::with_capacity(graph.len());
    while let Some(id) = queue.pop_front() {
        ordered.push(id);
        let children = kahn.dependents.get(&id).cloned().unwrap_or_default();
        for child in children {
            if kahn.release(child) {
                queue.push_back(child);
            }
        }
    }

    if ordered.len() != graph.len() {
        tracing::warn!(
            ordered = ordered.len(),
            total = graph.len(),
            "Topological order incomplete; graph contains a cycle"
        );
    }
    ordered
}

/// The longest directed chain of dependencies.
///
/// Kahn's traversal keeps, per node, the length of the longest chain reaching
/// it and the predecessor on that chain. The path is reconstructed back from
/// the node with the greatest length. When several nodes share that length,
/// the first one dequeued wins, which is not necessarily the first whose
/// length was raised to it: a node waiting on a slower prerequisite is
/// dequeued late. The queue is seeded and fed in load order, so the result
/// is deterministic.
///
/// Returns an empty path for an empty graph and a single node for a graph
/// without edges.
pub fn critical_path(graph: &Graph) -> Vec<NodeId> {
    let mut kahn = Kahn::new(graph);
    let mut queue = kahn.roots(graph);

    let mut path_length: HashMap<NodeId, usize> =
        graph.node_ids().iter().map(|id| (*id, 0)).collect();
    let mut predecessor: HashMap<NodeId, NodeId> = HashMap::new();
    let mut best: Option<(NodeId, usize)> = None;
    let mut visited = 0usize;

    while let Some(current) = queue.pop_front() {
        visited += 1;
        let current_length = path_length.get(&current).copied().unwrap_or(0);
        if best.is_none_or(|(_, length)| current_length > length) {
            best = Some((current, current_length));
        }

        let children = kahn.dependents.get(&current).cloned().unwrap_or_default();
        for child in children {
            let candidate = current_length + 1;
            if let Some(length) = path_length.get_mut(&child) {
                if candidate > *length {
                    *length = candidate;
                    predecessor.insert(child, current);
                }
            }
            if kahn.release(child) {
                queue.push_back(child);
            }
        }
    }

    if visited != graph.len() {
        tracing::warn!(
            visited,
            total = graph.len(),
            "Critical path computed over acyclic part only; graph contains a cycle"
        );
    }

    let Some((end, _)) = best else {
        return Vec::new();
    };
    let mut path = vec![end];
    let mut cursor = end;
    while let Some(previous) = predecessor.get(&cursor) {
        path.push(*previous);
        cursor = *previous;
        if path.len() > graph.len() {
            break;
        }
    }
    path.reverse();
    path
}
