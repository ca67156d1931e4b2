//! Property tests for validation, analytics and layout.

mod common;

use closeflow::analytics::{connected_components, critical_path, depths, sink_nodes};
use closeflow::domain::{NodeId, ScopeKind};
use closeflow::graph::{Graph, invariant_violations};
use closeflow::layout::{LayoutConfig, LayoutDirection, layout_with};
use closeflow::validation::{EdgeRejection, can_add_edge};
use common::graph_of;
use petgraph::algo;
use petgraph::graph::DiGraph;
use proptest::prelude::*;
use std::collections::HashMap;

const MAX_NODES: i64 = 12;

/// Grow a graph by offering random edges to the validator and keeping the
/// accepted ones.
fn grow(node_count: i64, proposals: &[(i64, i64)]) -> Graph {
    let shape: Vec<(i64, &[i64])> = (1..=node_count).map(|id| (id, &[][..])).collect();
    let mut graph = graph_of(&shape);
    for (from, to) in proposals {
        let (from, to) = (NodeId(from % node_count + 1), NodeId(to % node_count + 1));
        if can_add_edge(&graph, from, to).is_ok() {
            graph.insert_dependency(from, to).unwrap();
        }
    }
    graph
}

fn petgraph_mirror(graph: &Graph) -> DiGraph<NodeId, ()> {
    let mut mirror = DiGraph::new();
    let index: HashMap<NodeId, _> = graph
        .node_ids()
        .iter()
        .map(|id| (*id, mirror.add_node(*id)))
        .collect();
    for edge in graph.edges() {
        mirror.add_edge(index[&edge.from], index[&edge.to], ());
    }
    mirror
}

fn arb_graph() -> impl Strategy<Value = Graph> {
    (1..=MAX_NODES, prop::collection::vec((0..MAX_NODES, 0..MAX_NODES), 0..40))
        .prop_map(|(count, proposals)| grow(count, &proposals))
}

proptest! {
    #[test]
    fn accepted_edges_keep_graph_acyclic(graph in arb_graph()) {
        prop_assert!(!algo::is_cyclic_directed(&petgraph_mirror(&graph)));
        prop_assert!(invariant_violations(&graph).is_empty());
        prop_assert_eq!(graph.scope_kind(), ScopeKind::Template);
    }

    #[test]
    fn self_edges_are_always_rejected(graph in arb_graph(), pick in 0..MAX_NODES) {
        let id = graph.node_ids()[usize::try_from(pick).unwrap() % graph.len()];
        prop_assert_eq!(
            can_add_edge(&graph, id, id),
            Err(EdgeRejection::SelfDependency { node: id })
        );
    }

    #[test]
    fn existing_edges_are_duplicates(graph in arb_graph()) {
        for edge in graph.edges() {
            prop_assert_eq!(
                can_add_edge(&graph, edge.from, edge.to),
                Err(EdgeRejection::DuplicateDependency { from: edge.from, to: edge.to })
            );
        }
    }

    #[test]
    fn validator_agrees_with_reachability(
        graph in arb_graph(),
        from in 0..MAX_NODES,
        to in 0..MAX_NODES,
    ) {
        let count = graph.len();
        let from = graph.node_ids()[usize::try_from(from).unwrap() % count];
        let to = graph.node_ids()[usize::try_from(to).unwrap() % count];
        prop_assume!(from != to && !graph.node(to).unwrap().depends_on(from));

        let mirror = petgraph_mirror(&graph);
        let index = |id: NodeId| {
            mirror.node_indices().find(|i| mirror[*i] == id).unwrap()
        };
        let closes_loop = algo::has_path_connecting(&mirror, index(to), index(from), None);

        prop_assert_eq!(can_add_edge(&graph, from, to).is_err(), closes_loop);
    }

    #[test]
    fn components_partition_nodes(graph in arb_graph()) {
        let mut seen: Vec<NodeId> = connected_components(&graph).into_iter().flatten().collect();
        seen.sort();
        let mut all = graph.node_ids().to_vec();
        all.sort();
        prop_assert_eq!(seen, all);
    }

    #[test]
    fn critical_path_spans_deepest_sink(graph in arb_graph()) {
        let path = critical_path(&graph);
        let all = depths(&graph);
        let deepest = sink_nodes(&graph).iter().map(|id| all[id]).max().unwrap_or(0);

        prop_assert_eq!(path.len(), deepest + 1);
        for pair in path.windows(2) {
            prop_assert!(graph.node(pair[1]).unwrap().depends_on(pair[0]));
        }
    }

    #[test]
    fn layout_respects_prerequisites(graph in arb_graph(), left_to_right in any::<bool>()) {
        let config = LayoutConfig {
            direction: if left_to_right {
                LayoutDirection::LeftToRight
            } else {
                LayoutDirection::TopToBottom
            },
            ..LayoutConfig::default()
        };

        let first = layout_with(&graph, &config);
        let second = layout_with(&graph, &config);
        prop_assert_eq!(&first, &second);

        let along = |id: NodeId| {
            let p = first.positions[&id];
            if left_to_right { p.x } else { p.y }
        };
        for edge in graph.edges() {
            prop_assert!(along(edge.from) < along(edge.to));
        }

        let roots: Vec<f64> = graph
            .node_ids()
            .iter()
            .filter(|id| first.ranks[*id] == 0)
            .map(|id| along(*id))
            .collect();
        prop_assert!(roots.windows(2).all(|pair| (pair[0] - pair[1]).abs() < f64::EPSILON));
    }
}
