//! Edge validation and cycle detection.
//!
//! [`can_add_edge`] decides whether `from` may become a prerequisite of `to`.
//! The checks run in a fixed order and the first failure wins:
//!
//! 1. `from == to` is a self-dependency
//! 2. either endpoint missing from the graph
//! 3. `to` already depends on `from`
//! 4. the edge would close a cycle
//!
//! # Cycle Check
//!
//! The edge is tentatively inserted and a depth-first traversal starts at
//! `to`, following prerequisite links while keeping the current recursion
//! stack. Reaching a node that is already on the stack means the new edge
//! closes a loop. On an acyclic graph the only node that can be hit this way
//! is `to` itself; on a graph that is already corrupted the check still
//! rejects, which keeps a bad graph from getting worse.
//!
//! Removing an edge can never introduce a cycle, so [`can_remove_edge`]
//! always succeeds.

use crate::domain::NodeId;
use crate::graph::Graph;
use std::collections::HashSet;
use thiserror::Error;

/// Why a proposed dependency edge was declined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EdgeRejection {
    /// The node would depend on itself.
    #[error("self-dependency: node {node} cannot depend on itself")]
    SelfDependency {
        /// The node in question
        node: NodeId,
    },

    /// One endpoint is not part of the graph.
    #[error("unknown node: {node} is not part of this workflow")]
    UnknownNode {
        /// The missing node
        node: NodeId,
    },

    /// The dependency already exists.
    #[error("duplicate dependency: {to} already depends on {from}")]
    DuplicateDependency {
        /// The prerequisite
        from: NodeId,
        /// The dependent
        to: NodeId,
    },

    /// The dependency would close a cycle.
    #[error("circular dependency: {from} already depends on {to}, directly or transitively")]
    CircularDependency {
        /// The prerequisite
        from: NodeId,
        /// The dependent
        to: NodeId,
    },
}

impl EdgeRejection {
    /// Short human-readable reason, suitable for a toast.
    pub fn reason(&self) -> &'static str {
        match self {
            EdgeRejection::SelfDependency { .. } => "self-dependency",
            EdgeRejection::UnknownNode { .. } => "unknown node",
            EdgeRejection::DuplicateDependency { .. } => "duplicate dependency",
            EdgeRejection::CircularDependency { .. } => "circular dependency",
        }
    }
}

/// Decide whether `from` may become a prerequisite of `to`.
///
/// # Errors
///
/// Returns the first [`EdgeRejection`] that applies, in the order listed in
/// the module documentation.
pub fn can_add_edge(graph: &Graph, from: NodeId, to: NodeId) -> Result<(), EdgeRejection> {
    if from == to {
        return Err(EdgeRejection::SelfDependency { node: from });
    }
    if !graph.contains(from) {
        return Err(EdgeRejection::UnknownNode { node: from });
    }
    let Some(target) = graph.node(to) else {
        return Err(EdgeRejection::UnknownNode { node: to });
    };
    if target.depends_on(from) {
        return Err(EdgeRejection::DuplicateDependency { from, to });
    }
    if closes_cycle(graph, from, to) {
        return Err(EdgeRejection::CircularDependency { from, to });
    }
    Ok(())
}

/// Decide whether `from` may stop being a prerequisite of `to`.
///
/// Always succeeds; the signature mirrors [`can_add_edge`] so callers can
/// treat both edits the same way.
#[allow(clippy::unnecessary_wraps)]
pub fn can_remove_edge(_graph: &Graph, _from: NodeId, _to: NodeId) -> Result<(), EdgeRejection> {
    Ok(())
}

/// Whether inserting `from` into the prerequisites of `to` creates a cycle.
///
/// Iterative DFS from `to` over prerequisite links, with `from` added to the
/// prerequisites of `to` for the duration of the walk.
fn closes_cycle(graph: &Graph, from: NodeId, to: NodeId) -> bool {
    let prerequisites = |id: NodeId| -> Vec<NodeId> {
        let mut deps: Vec<NodeId> = graph
            .node(id)
            .map(|node| node.dependency_ids().iter().copied().collect())
            .unwrap_or_default();
        if id == to {
            deps.push(from);
        }
        deps
    };

    let mut on_stack: HashSet<NodeId> = HashSet::new();
    let mut finished: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<(NodeId, Vec<NodeId>)> = vec![(to, prerequisites(to))];
    on_stack.insert(to);

    while let Some((current, pending)) = stack.last_mut() {
        let current = *current;
        let Some(next) = pending.pop() else {
            on_stack.remove(&current);
            finished.insert(current);
            stack.pop();
            continue;
        };
        if on_stack.contains(&next) {
            tracing::debug!(%from, %to, revisited = %next, "Edge would close a cycle");
            return true;
        }
        if finished.contains(&next) || !graph.contains(next) {
            continue;
        }
        on_stack.insert(next);
        stack.push((next, prerequisites(next)));
    }

    false
}
