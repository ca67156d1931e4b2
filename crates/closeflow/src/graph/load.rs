//! Building a [`Graph`] from the store's node list.
//!
//! Loading never fails on bad data. Anything that would break a graph
//! invariant is skipped and reported as a [`LoadWarning`], so a scope with a
//! corrupted dependency still opens and the user can repair it.

use super::Graph;
use crate::domain::{GraphEdge, GraphNode, NodeId, ScopeKind, ScopeSnapshot};
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// Non-fatal problems found while loading a scope.
///
/// # Handling Warnings
///
/// Each warning describes data the store returned that the graph refused to
/// take as-is. Callers should log them; the controller also forwards them as
/// notices so the presentation layer can show them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// A second record carried an ID already loaded
    ///
    /// **Effect**: The later record is dropped; the first one wins.
    DuplicateNode { id: NodeId },

    /// A node listed itself as a prerequisite
    ///
    /// **Effect**: The self-reference is dropped.
    SelfDependency { id: NodeId },

    /// A prerequisite lies outside the loaded scope
    ///
    /// **Effect**: No edge is drawn, but the ID is remembered on the node and
    /// sent back with every dependency write for it.
    /// **Common causes**: A category filter that hides part of a template family.
    ExternalDependency { from: NodeId, to: NodeId },

    /// Accepting this prerequisite would close a cycle
    ///
    /// **Effect**: The dependency is skipped to break the cycle.
    /// **Common causes**: Concurrent edits from two clients that each passed
    /// their own local check.
    CircularDependency { from: NodeId, to: NodeId },

    /// The store's edge list and the derived edge list disagree
    ///
    /// **Effect**: None; derived edges are authoritative.
    EdgeMismatch {
        from: NodeId,
        to: NodeId,
        /// `true` if the store reported an edge the graph does not have,
        /// `false` if the graph derived an edge the store left out
        reported_only: bool,
    },
}

/// A freshly loaded graph and everything that was skipped while building it.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// The loaded graph
    pub graph: Graph,

    /// Problems found in the store's data
    pub warnings: Vec<LoadWarning>,
}

impl Graph {
    /// Build a graph from the records the store returned for one scope.
    ///
    /// # Algorithm
    ///
    /// 1. Insert every node with no prerequisites, in load order
    /// 2. Walk each node's prerequisites in load order, accepting each one
    ///    unless it is a self-reference, lies outside the scope, or would close
    ///    a cycle with the prerequisites accepted so far
    /// 3. Compare the store's edge list with the derived one
    ///
    /// Step 2 keeps a petgraph mirror of the accepted edges and asks whether
    /// the dependent already reaches the prerequisite; if so the new edge
    /// would complete a loop.
    pub fn from_snapshot(scope_kind: ScopeKind, snapshot: ScopeSnapshot) -> LoadOutcome {
        let mut graph = Graph::new(scope_kind);
        let mut warnings = Vec::new();

        // === Pass 1: nodes ===
        let mut pending = Vec::with_capacity(snapshot.nodes.len());
        for record in snapshot.nodes {
            if graph.contains(record.id) {
                warnings.push(LoadWarning::DuplicateNode { id: record.id });
                continue;
            }
            let mut node = GraphNode::new(record.id, record.label);
            node.attributes = record.attributes;
            node.position = record.position;
            graph.order.push(node.id);
            graph.nodes.insert(node.id, node);
            pending.push((record.id, record.dependency_ids));
        }

        // === Pass 2: dependencies ===
        let mut mirror: DiGraph<NodeId, ()> = DiGraph::with_capacity(graph.len(), 0);
        let index: HashMap<NodeId, NodeIndex> = graph
            .order
            .iter()
            .map(|id| (*id, mirror.add_node(*id)))
            .collect();

        // Dependencies already reported above, so pass 3 stays quiet about them
        let mut skipped: HashSet<(NodeId, NodeId)> = HashSet::new();
        for (id, dependency_ids) in pending {
            let mut accepted = Vec::new();
            let mut external = Vec::new();
            for dep in dependency_ids {
                if dep == id {
                    warnings.push(LoadWarning::SelfDependency { id });
                    skipped.insert((id, id));
                    continue;
                }
                let (Some(&dep_index), Some(&node_index)) = (index.get(&dep), index.get(&id))
                else {
                    warnings.push(LoadWarning::ExternalDependency { from: dep, to: id });
                    external.push(dep);
                    continue;
                };
                if accepted.contains(&dep) {
                    continue;
                }
                if algo::has_path_connecting(&mirror, node_index, dep_index, None) {
                    warnings.push(LoadWarning::CircularDependency { from: dep, to: id });
                    skipped.insert((dep, id));
                    continue;
                }
                mirror.add_edge(dep_index, node_index, ());
                accepted.push(dep);
            }
            if let Some(node) = graph.nodes.get_mut(&id) {
                node.dependency_ids.extend(accepted);
                node.external_dependency_ids.extend(external);
            }
        }
        graph.rebuild_edges();

        // === Pass 3: compare edge lists ===
        let derived: HashSet<(NodeId, NodeId)> =
            graph.edges.iter().map(|edge| (edge.from, edge.to)).collect();
        let reported: HashSet<(NodeId, NodeId)> = snapshot
            .edges
            .iter()
            .map(|edge: &GraphEdge| (edge.from, edge.to))
            .collect();

        let mut seen = HashSet::new();
        for edge in &snapshot.edges {
            let key = (edge.from, edge.to);
            if seen.insert(key) && !derived.contains(&key) && !skipped.contains(&key) {
                warnings.push(LoadWarning::EdgeMismatch {
                    from: edge.from,
                    to: edge.to,
                    reported_only: true,
                });
            }
        }
        if !snapshot.edges.is_empty() {
            for edge in &graph.edges {
                if !reported.contains(&(edge.from, edge.to)) {
                    warnings.push(LoadWarning::EdgeMismatch {
                        from: edge.from,
                        to: edge.to,
                        reported_only: false,
                    });
                }
            }
        }

        tracing::debug!(
            nodes = graph.len(),
            edges = graph.edges.len(),
            warnings = warnings.len(),
            "Built workflow graph"
        );

        LoadOutcome { graph, warnings }
    }
}
