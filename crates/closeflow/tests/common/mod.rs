//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use closeflow::domain::{NodeId, NodeRecord, ScopeKind, ScopeSnapshot};
use closeflow::graph::Graph;
use closeflow::store::InMemoryStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Route `tracing` output to the test harness; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("closeflow=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Records from `(id, prerequisites)` pairs, labelled `task-{id}`.
pub fn records(shape: &[(i64, &[i64])]) -> Vec<NodeRecord> {
    shape
        .iter()
        .map(|(id, deps)| {
            NodeRecord::new(*id, format!("task-{id}")).with_dependencies(deps.iter().copied())
        })
        .collect()
}

/// A template graph built through the tolerant loader.
pub fn graph_of(shape: &[(i64, &[i64])]) -> Graph {
    Graph::from_snapshot(ScopeKind::Template, ScopeSnapshot::from_nodes(records(shape))).graph
}

/// An in-memory store holding the given templates, uncategorised.
pub async fn template_store(store: InMemoryStore, shape: &[(i64, &[i64])]) -> Arc<InMemoryStore> {
    for record in records(shape) {
        store.insert_template(record, None).await;
    }
    Arc::new(store)
}

pub fn ids(raw: &[i64]) -> Vec<NodeId> {
    raw.iter().copied().map(NodeId).collect()
}
