//! Graph analytics over a loaded workflow.
//!
//! Every function here is pure: it takes a [`Graph`] by reference, derives
//! what it needs, and keeps no state between calls. Results that list nodes
//! follow load order unless stated otherwise, so repeated calls on the same
//! graph produce identical output.
//!
//! - Connectivity: [`connected_components`], [`disconnected_nodes`]
//! - Endpoints: [`source_nodes`], [`sink_nodes`]
//! - Depth: [`depth`], [`depths`]
//! - Ordering: [`critical_path`], [`topological_order`]
//! - Reachability: [`ancestors`], [`descendants`]
//! - Roll-up: [`summary_statistics`]

mod critical_path;
mod depth;

pub use critical_path::{critical_path, topological_order};
pub use depth::{depth, depths};

use crate::domain::NodeId;
use crate::graph::{Graph, Neighbors};
use petgraph::unionfind::UnionFind;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Roll-up numbers shown in the workflow side panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSummary {
    /// Number of nodes
    pub total_nodes: usize,

    /// Number of derived edges
    pub total_edges: usize,

    /// Nodes with no prerequisites
    pub source_node_count: usize,

    /// Nodes nothing depends on
    pub sink_node_count: usize,

    /// Nodes with neither prerequisites nor dependents
    pub disconnected_node_count: usize,

    /// Connected components that contain at least one edge
    pub chain_count: usize,

    /// Greatest `depth()` over all nodes
    pub max_depth: usize,

    /// Edges divided by nodes; `0.0` for an empty graph
    pub average_prerequisites_per_node: f64,
}

/// Groups of nodes connected when edge direction is ignored.
///
/// The result partitions the node set: every node appears in exactly one
/// group. Groups are ordered by their first member in load order, and members
/// within a group follow load order.
pub fn connected_components(graph: &Graph) -> Vec<Vec<NodeId>> {
    let index: HashMap<NodeId, usize> = graph
        .node_ids()
        .iter()
        .enumerate()
        .map(|(position, id)| (*id, position))
        .collect();

    let mut sets = UnionFind::<usize>::new(graph.len());
    for edge in graph.edges() {
        if let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) {
            sets.union(from, to);
        }
    }

    let mut groups: Vec<Vec<NodeId>> = Vec::new();
    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    for (position, id) in graph.node_ids().iter().enumerate() {
        let root = sets.find(position);
        let slot = *group_of_root.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(*id);
    }
    groups
}

/// Nodes with no prerequisites, in load order.
pub fn source_nodes(graph: &Graph) -> Vec<NodeId> {
    graph
        .nodes()
        .filter(|node| node.dependency_ids().is_empty())
        .map(|node| node.id)
        .collect()
}

/// Nodes that are not the prerequisite of any other node, in load order.
pub fn sink_nodes(graph: &Graph) -> Vec<NodeId> {
    let prerequisites: HashSet<NodeId> = graph.edges().iter().map(|edge| edge.from).collect();
    graph
        .node_ids()
        .iter()
        .filter(|id| !prerequisites.contains(id))
        .copied()
        .collect()
}

/// Nodes with neither prerequisites nor dependents, in load order.
pub fn disconnected_nodes(graph: &Graph) -> Vec<NodeId> {
    let touched: HashSet<NodeId> = graph
        .edges()
        .iter()
        .flat_map(|edge| [edge.from, edge.to])
        .collect();
    graph
        .node_ids()
        .iter()
        .filter(|id| !touched.contains(id))
        .copied()
        .collect()
}

/// Every node `id` transitively depends on.
pub fn ancestors(graph: &Graph, id: NodeId) -> BTreeSet<NodeId> {
    reachable(graph, id, Neighbors::DependsOn)
}

/// Every node that transitively depends on `id`.
pub fn descendants(graph: &Graph, id: NodeId) -> BTreeSet<NodeId> {
    reachable(graph, id, Neighbors::Dependents)
}

fn reachable(graph: &Graph, id: NodeId, direction: Neighbors) -> BTreeSet<NodeId> {
    let mut seen = BTreeSet::new();
    let mut stack = graph.neighbors(id, direction);
    while let Some(next) = stack.pop() {
        if next == id || !graph.contains(next) || !seen.insert(next) {
            continue;
        }
        stack.extend(graph.neighbors(next, direction));
    }
    seen
}

/// Compute the side-panel roll-up for a graph.
#[allow(clippy::cast_precision_loss)]
pub fn summary_statistics(graph: &Graph) -> GraphSummary {
    let total_nodes = graph.len();
    let total_edges = graph.edges().len();
    let chain_count = connected_components(graph)
        .iter()
        .filter(|group| group.len() > 1)
        .count();
    let max_depth = depths(graph).into_values().max().unwrap_or(0);
    let average_prerequisites_per_node = if total_nodes == 0 {
        0.0
    } else {
        total_edges as f64 / total_nodes as f64
    };

    GraphSummary {
        total_nodes,
        total_edges,
        source_node_count: source_nodes(graph).len(),
        sink_node_count: sink_nodes(graph).len(),
        disconnected_node_count: disconnected_nodes(graph).len(),
        chain_count,
        max_depth,
        average_prerequisites_per_node,
    }
}
