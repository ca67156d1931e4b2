//! Prerequisite-chain depth.

use crate::domain::NodeId;
use crate::graph::Graph;
use std::collections::{HashMap, HashSet};

/// Memoizing walker for `depth()` with a cycle guard.
///
/// The guard tracks the nodes on the current descent. Meeting one of them
/// again can only happen on a corrupted graph; the walker logs the breach and
/// treats that branch as depth zero so the computation stays bounded.
pub(super) struct DepthWalker<'a> {
    graph: &'a Graph,
    memo: HashMap<NodeId, usize>,
    on_path: HashSet<NodeId>,
}

impl<'a> DepthWalker<'a> {
    pub(super) fn new(graph: &'a Graph) -> Self {
        Self {
            graph,
            memo: HashMap::with_capacity(graph.len()),
            on_path: HashSet::new(),
        }
    }

    pub(super) fn depth_of(&mut self, id: NodeId) -> usize {
        if let Some(depth) = self.memo.get(&id) {
            return *depth;
        }
        if !self.on_path.insert(id) {
            tracing::warn!(node_id = %id, "Cycle met while computing depth; graph invariant broken");
            return 0;
        }

        let graph = self.graph;
        let depth = graph
            .node(id)
            .map(|node| {
                node.dependency_ids()
                    .iter()
                    .filter(|dep| graph.contains(**dep))
                    .map(|dep| self.depth_of(*dep) + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);

        self.on_path.remove(&id);
        self.memo.insert(id, depth);
        depth
    }
}

/// Length of the longest prerequisite chain ending at `id`.
///
/// `0` for a node without prerequisites, otherwise one more than the deepest
/// prerequisite. Returns `None` if the node is not part of the graph.
pub fn depth(graph: &Graph, id: NodeId) -> Option<usize> {
    if !graph.contains(id) {
        return None;
    }
    Some(DepthWalker::new(graph).depth_of(id))
}

/// Depth of every node, computed in one pass.
pub fn depths(graph: &Graph) -> HashMap<NodeId, usize> {
    let mut walker = DepthWalker::new(graph);
    graph
        .node_ids()
        .iter()
        .map(|id| (*id, walker.depth_of(*id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::{chain, graph_of};

    #[test]
    fn test_depth_of_chain() {
        let graph = chain(4);
        assert_eq!(depth(&graph, NodeId(1)), Some(0));
        assert_eq!(depth(&graph, NodeId(4)), Some(3));
        assert_eq!(depth(&graph, NodeId(99)), None);
    }

    #[test]
    fn test_depth_takes_longest_branch() {
        // 1 -> 2 -> 3 -> 5 and 4 -> 5
        let graph = graph_of(&[(1, &[]), (2, &[1]), (3, &[2]), (4, &[]), (5, &[3, 4])]);
        assert_eq!(depth(&graph, NodeId(5)), Some(3));
    }

    #[test]
    fn test_depth_terminates_on_corrupted_graph() {
        let mut graph = chain(3);
        graph.insert_dependency(NodeId(3), NodeId(1)).unwrap();

        let all = depths(&graph);
        assert_eq!(all.len(), 3);
        assert!(all.values().all(|depth| *depth <= 3));
    }
}
