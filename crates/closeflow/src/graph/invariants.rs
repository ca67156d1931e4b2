//! Audit of a loaded graph against its data-model invariants.

use std::collections::{HashMap, HashSet, VecDeque};

use super::Graph;
use crate::domain::NodeId;

/// A broken data-model invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A node lists itself as a prerequisite.
    SelfLoop { node_id: NodeId },
    /// A prerequisite is not part of the graph.
    UnknownNodeReference { node_id: NodeId, missing_node_id: NodeId },
    /// The prerequisite relation contains a cycle through these nodes.
    CycleDetected { node_ids: Vec<NodeId> },
    /// The derived edge list disagrees with the prerequisite sets.
    EdgeListOutOfSync { from: NodeId, to: NodeId },
}

/// Audit a graph against the data-model invariants.
///
/// Returns an empty list for a healthy graph. Used by tests and by the
/// controller after rebuilding from the store.
pub fn invariant_violations(graph: &Graph) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let mut indegree: HashMap<NodeId, usize> = graph.node_ids().iter().map(|id| (*id, 0)).collect();
    let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::with_capacity(graph.len());
    let mut expected = HashSet::new();

    for node in graph.nodes() {
        for dep in node.dependency_ids() {
            if *dep == node.id {
                violations.push(InvariantViolation::SelfLoop { node_id: node.id });
                continue;
            }
            if !graph.contains(*dep) {
                violations.push(InvariantViolation::UnknownNodeReference {
                    node_id: node.id,
                    missing_node_id: *dep,
                });
                continue;
            }
            expected.insert((*dep, node.id));
            *indegree.entry(node.id).or_insert(0) += 1;
            dependents.entry(*dep).or_default().push(node.id);
        }
    }

    // Kahn's algorithm: whatever never reaches in-degree zero sits on a cycle
    // or downstream of one.
    let mut queue: VecDeque<NodeId> = graph
        .node_ids()
        .iter()
        .filter(|id| indegree.get(id) == Some(&0))
        .copied()
        .collect();
    while let Some(id) = queue.pop_front() {
        for child in dependents.get(&id).into_iter().flatten() {
            if let Some(degree) = indegree.get_mut(child) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*child);
                }
            }
        }
    }
    let stuck: Vec<NodeId> = graph
        .node_ids()
        .iter()
        .filter(|id| indegree.get(id).is_some_and(|degree| *degree > 0))
        .copied()
        .collect();
    if !stuck.is_empty() {
        violations.push(InvariantViolation::CycleDetected { node_ids: stuck });
    }

    let derived: HashSet<(NodeId, NodeId)> =
        graph.edges().iter().map(|edge| (edge.from, edge.to)).collect();
    for (from, to) in expected.symmetric_difference(&derived) {
        if from != to && graph.contains(*from) {
            violations.push(InvariantViolation::EdgeListOutOfSync {
                from: *from,
                to: *to,
            });
        }
    }

    violations
}
