//! In-memory workflow graph for one scope.
//!
//! A [`Graph`] holds the nodes of a single scope (a template family or one
//! period's tasks) together with the edge list derived from every node's
//! prerequisite set. It performs no validation: callers that need the
//! acyclicity guarantee go through [`crate::validation`] before mutating.
//!
//! # Edge Direction Convention
//!
//! Edges point from **prerequisite to dependent**, the direction work flows:
//!
//! - If task B lists task A in its `dependency_ids`, the edge is `A -> B`
//! - `Neighbors::DependsOn` of B yields A
//! - `Neighbors::Dependents` of A yields B
//!
//! # Ordering
//!
//! Nodes keep the order the store returned them in ("load order"). Every
//! iteration the graph exposes follows that order, which is what makes the
//! analytics tie-breaks and the layout deterministic.

mod invariants;
mod load;

pub use invariants::{InvariantViolation, invariant_violations};
pub use load::{LoadOutcome, LoadWarning};

use crate::domain::{GraphEdge, GraphNode, NodeId, Position, ScopeKind};
use crate::error::{Error, Result};
use std::collections::{BTreeSet, HashMap};

/// Which side of a node to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighbors {
    /// The node's prerequisites
    DependsOn,

    /// Nodes that list this node as a prerequisite
    Dependents,
}

/// The nodes and derived edges of one scope.
#[derive(Debug, Clone)]
pub struct Graph {
    scope_kind: ScopeKind,

    /// Nodes indexed by ID for O(1) lookups
    nodes: HashMap<NodeId, GraphNode>,

    /// Node IDs in load order
    order: Vec<NodeId>,

    /// Derived from `dependency_ids`; rebuilt on every dependency change
    edges: Vec<GraphEdge>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new(scope_kind: ScopeKind) -> Self {
        Self {
            scope_kind,
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Kind of scope this graph was loaded from.
    pub fn scope_kind(&self) -> ScopeKind {
        self.scope_kind
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Nodes in load order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> + '_ {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Node IDs in load order.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    /// Whether the node belongs to this graph.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Position of the node in load order.
    pub fn load_index(&self, id: NodeId) -> Option<usize> {
        self.order.iter().position(|candidate| *candidate == id)
    }

    /// The derived edge list, grouped by dependent in load order.
    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Direct neighbors of a node.
    ///
    /// Prerequisites come back in ascending ID order, dependents in load
    /// order. Returns an empty list for unknown IDs.
    pub fn neighbors(&self, id: NodeId, direction: Neighbors) -> Vec<NodeId> {
        match direction {
            Neighbors::DependsOn => self
                .nodes
                .get(&id)
                .map(|node| node.dependency_ids.iter().copied().collect())
                .unwrap_or_default(),
            Neighbors::Dependents => self
                .nodes()
                .filter(|node| node.dependency_ids.contains(&id))
                .map(|node| node.id)
                .collect(),
        }
    }

    /// Add a node at the end of the load order.
    ///
    /// Prerequisites that are not (yet) part of the graph are kept as-is;
    /// callers that assemble a graph incrementally are expected to add
    /// prerequisites first. Fails if the ID is already taken, since IDs are
    /// stable for the lifetime of the graph.
    pub fn insert_node(&mut self, node: GraphNode) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(Error::DuplicateNode(node.id));
        }
        self.order.push(node.id);
        self.nodes.insert(node.id, node);
        self.rebuild_edges();
        Ok(())
    }

    /// Replace a node's prerequisite set, returning the previous set.
    ///
    /// This bypasses validation; see [`crate::validation::can_add_edge`].
    pub fn set_dependencies(
        &mut self,
        id: NodeId,
        dependency_ids: BTreeSet<NodeId>,
    ) -> Result<BTreeSet<NodeId>> {
        let node = self.nodes.get_mut(&id).ok_or(Error::NodeNotFound(id))?;
        let previous = std::mem::replace(&mut node.dependency_ids, dependency_ids);
        self.rebuild_edges();
        Ok(previous)
    }

    /// Record `from` as a prerequisite of `to`. Returns `false` if it already was.
    pub fn insert_dependency(&mut self, from: NodeId, to: NodeId) -> Result<bool> {
        if !self.nodes.contains_key(&from) {
            return Err(Error::NodeNotFound(from));
        }
        let node = self.nodes.get_mut(&to).ok_or(Error::NodeNotFound(to))?;
        let inserted = node.dependency_ids.insert(from);
        if inserted {
            self.rebuild_edges();
        }
        Ok(inserted)
    }

    /// Drop `from` from the prerequisites of `to`. Returns `false` if it was absent.
    pub fn remove_dependency(&mut self, from: NodeId, to: NodeId) -> Result<bool> {
        let node = self.nodes.get_mut(&to).ok_or(Error::NodeNotFound(to))?;
        let removed = node.dependency_ids.remove(&from);
        if removed {
            self.rebuild_edges();
        }
        Ok(removed)
    }

    /// Set a node's canvas position, returning the previous one.
    pub fn set_position(&mut self, id: NodeId, position: Position) -> Result<Option<Position>> {
        let node = self.nodes.get_mut(&id).ok_or(Error::NodeNotFound(id))?;
        Ok(node.position.replace(position))
    }

    /// Forget a node's canvas position, returning the previous one.
    pub fn clear_position(&mut self, id: NodeId) -> Result<Option<Position>> {
        let node = self.nodes.get_mut(&id).ok_or(Error::NodeNotFound(id))?;
        Ok(node.position.take())
    }

    fn rebuild_edges(&mut self) {
        let mut edges = Vec::with_capacity(self.edges.len() + 1);
        for id in &self.order {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            for dep in &node.dependency_ids {
                edges.push(GraphEdge::new(*dep, node.id));
            }
        }
        self.edges = edges;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build a graph from `(id, prerequisites)` pairs, in the given order.
    pub(crate) fn graph_of(shape: &[(i64, &[i64])]) -> Graph {
        let mut graph = Graph::new(ScopeKind::Template);
        for (id, deps) in shape {
            let mut node = GraphNode::new(*id, format!("task-{id}"));
            node.dependency_ids = deps.iter().copied().map(NodeId).collect();
            graph.insert_node(node).unwrap();
        }
        graph
    }

    /// A straight chain `1 -> 2 -> ... -> n`.
    pub(crate) fn chain(n: i64) -> Graph {
        let mut graph = Graph::new(ScopeKind::Template);
        for id in 1..=n {
            let mut node = GraphNode::new(id, format!("task-{id}"));
            if id > 1 {
                node.dependency_ids.insert(NodeId(id - 1));
            }
            graph.insert_node(node).unwrap();
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::graph_of;
    use super::*;

    fn ids(raw: &[i64]) -> Vec<NodeId> {
        raw.iter().copied().map(NodeId).collect()
    }

    #[test]
    fn test_edges_are_derived_from_dependencies() {
        let graph = graph_of(&[(1, &[]), (2, &[1]), (3, &[1, 2])]);

        let pairs: Vec<_> = graph.edges().iter().map(|e| (e.from.0, e.to.0)).collect();
        assert_eq!(pairs, vec![(1, 2), (1, 3), (2, 3)]);
        assert_eq!(graph.edges()[0].id, "e1-2");
    }

    #[test]
    fn test_neighbors_both_directions() {
        let graph = graph_of(&[(1, &[]), (2, &[1]), (3, &[1, 2])]);

        assert_eq!(graph.neighbors(NodeId(3), Neighbors::DependsOn), ids(&[1, 2]));
        assert_eq!(graph.neighbors(NodeId(1), Neighbors::Dependents), ids(&[2, 3]));
        assert!(graph.neighbors(NodeId(42), Neighbors::DependsOn).is_empty());
    }

    #[test]
    fn test_nodes_keep_load_order() {
        let graph = graph_of(&[(9, &[]), (3, &[]), (5, &[])]);
        let order: Vec<_> = graph.nodes().map(|n| n.id.0).collect();
        assert_eq!(order, vec![9, 3, 5]);
        assert_eq!(graph.load_index(NodeId(5)), Some(2));
    }

    #[test]
    fn test_insert_node_rejects_duplicate_id() {
        let mut graph = graph_of(&[(1, &[])]);
        let result = graph.insert_node(GraphNode::new(1, "again"));
        assert!(matches!(result, Err(Error::DuplicateNode(NodeId(1)))));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_set_dependencies_rebuilds_edges() {
        let mut graph = graph_of(&[(1, &[]), (2, &[1]), (3, &[])]);

        let previous = graph
            .set_dependencies(NodeId(2), [NodeId(3)].into_iter().collect())
            .unwrap();

        assert_eq!(previous, [NodeId(1)].into_iter().collect());
        let pairs: Vec<_> = graph.edges().iter().map(|e| (e.from.0, e.to.0)).collect();
        assert_eq!(pairs, vec![(3, 2)]);
    }

    #[test]
    fn test_insert_and_remove_dependency() {
        let mut graph = graph_of(&[(1, &[]), (2, &[])]);

        assert!(graph.insert_dependency(NodeId(1), NodeId(2)).unwrap());
        assert!(!graph.insert_dependency(NodeId(1), NodeId(2)).unwrap());
        assert_eq!(graph.edges().len(), 1);

        assert!(graph.remove_dependency(NodeId(1), NodeId(2)).unwrap());
        assert!(!graph.remove_dependency(NodeId(1), NodeId(2)).unwrap());
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn test_mutating_unknown_node_fails() {
        let mut graph = graph_of(&[(1, &[])]);
        assert!(matches!(
            graph.insert_dependency(NodeId(1), NodeId(7)),
            Err(Error::NodeNotFound(NodeId(7)))
        ));
        assert!(matches!(
            graph.set_position(NodeId(7), Position::new(0.0, 0.0)),
            Err(Error::NodeNotFound(NodeId(7)))
        ));
    }

    #[test]
    fn test_set_position_returns_previous() {
        let mut graph = graph_of(&[(1, &[])]);
        assert_eq!(graph.set_position(NodeId(1), Position::new(1.0, 2.0)).unwrap(), None);
        assert_eq!(
            graph.set_position(NodeId(1), Position::new(3.0, 4.0)).unwrap(),
            Some(Position::new(1.0, 2.0))
        );
    }
}
