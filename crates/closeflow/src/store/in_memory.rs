//! In-memory workflow store.
//!
//! Holds templates and period tasks in RAM and behaves like the real backend
//! where it matters to the engine:
//!
//! - scopes are filtered by template category or period
//! - dependency writes are checked for unknown nodes, self-references and
//!   cycles against the store's own (possibly newer) data
//! - batched position writes are optional and all-or-nothing
//!
//! # Fault Injection
//!
//! Tests drive the controller's failure paths with [`InMemoryStore::set_offline`],
//! [`InMemoryStore::reject_writes_for`] and [`InMemoryStore::pause_writes`].
//! [`InMemoryStore::apply_external_edit`] simulates another client changing
//! dependencies behind the controller's back.
//!
//! # Thread Safety
//!
//! State lives behind a `tokio::sync::Mutex`. The pause gate is a `watch`
//! channel awaited *before* the lock is taken, so paused writes never block
//! reads.

use super::WorkflowStore;
use crate::domain::{NodeId, NodeRecord, Position, Scope, ScopeKind, ScopeSnapshot};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use tokio::sync::{Mutex, watch};

/// A write the store accepted, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRecord {
    /// `persist_node_dependencies`
    Dependencies { node: NodeId, dependency_ids: Vec<NodeId> },
    /// `persist_node_position`
    Position { node: NodeId, position: Position },
    /// `persist_node_positions`
    Positions { count: usize },
}

#[derive(Debug, Clone)]
enum Membership {
    Template { category: Option<String> },
    Period(i64),
}

#[derive(Debug, Clone)]
struct StoredNode {
    record: NodeRecord,
    membership: Membership,
}

impl StoredNode {
    fn in_scope(&self, scope: &Scope) -> bool {
        match (scope, &self.membership) {
            (Scope::TemplateFamily { category: None }, Membership::Template { .. }) => true,
            (
                Scope::TemplateFamily {
                    category: Some(wanted),
                },
                Membership::Template { category },
            ) => category.as_deref() == Some(wanted.as_str()),
            (Scope::Period { period_id }, Membership::Period(stored)) => period_id == stored,
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    templates: Vec<StoredNode>,
    tasks: Vec<StoredNode>,
    offline: bool,
    rejections: HashMap<NodeId, String>,
    writes: Vec<WriteRecord>,
    loads: usize,
}

impl StoreInner {
    fn table(&self, kind: ScopeKind) -> &Vec<StoredNode> {
        match kind {
            ScopeKind::Template => &self.templates,
            ScopeKind::PeriodInstance => &self.tasks,
        }
    }

    fn table_mut(&mut self, kind: ScopeKind) -> &mut Vec<StoredNode> {
        match kind {
            ScopeKind::Template => &mut self.templates,
            ScopeKind::PeriodInstance => &mut self.tasks,
        }
    }

    fn check_reachable(&self, node: NodeId) -> StoreResult<()> {
        if self.offline {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        if let Some(detail) = self.rejections.get(&node) {
            return Err(StoreError::Rejected {
                node,
                detail: detail.clone(),
            });
        }
        Ok(())
    }

    /// Whether giving `node` the prerequisites `proposed` leaves the table acyclic.
    fn would_cycle(&self, kind: ScopeKind, node: NodeId, proposed: &[NodeId]) -> bool {
        let table = self.table(kind);
        let mut graph: DiGraph<NodeId, ()> = DiGraph::with_capacity(table.len(), 0);
        let index: HashMap<NodeId, NodeIndex> = table
            .iter()
            .map(|stored| (stored.record.id, graph.add_node(stored.record.id)))
            .collect();

        for stored in table {
            let deps = if stored.record.id == node {
                proposed
            } else {
                stored.record.dependency_ids.as_slice()
            };
            for dep in deps {
                if let (Some(&from), Some(&to)) = (index.get(dep), index.get(&stored.record.id)) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        algo::is_cyclic_directed(&graph)
    }
}

/// Workflow store backed by process memory.
#[derive(Debug)]
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
    gate: watch::Sender<bool>,
    batch_positions: bool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty store that writes positions one node at a time.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            inner: Mutex::new(StoreInner::default()),
            gate,
            batch_positions: false,
        }
    }

    /// Create an empty store that accepts batched position writes.
    pub fn with_batch_positions() -> Self {
        Self {
            batch_positions: true,
            ..Self::new()
        }
    }

    /// Add a template, optionally tagged with a category.
    pub async fn insert_template(&self, record: NodeRecord, category: Option<&str>) {
        let mut inner = self.inner.lock().await;
        inner.templates.push(StoredNode {
            record,
            membership: Membership::Template {
                category: category.map(str::to_string),
            },
        });
    }

    /// Add a task belonging to a period.
    pub async fn insert_task(&self, period_id: i64, record: NodeRecord) {
        let mut inner = self.inner.lock().await;
        inner.tasks.push(StoredNode {
            record,
            membership: Membership::Period(period_id),
        });
    }

    /// The stored record for a node.
    pub async fn record(&self, kind: ScopeKind, node: NodeId) -> Option<NodeRecord> {
        let inner = self.inner.lock().await;
        inner
            .table(kind)
            .iter()
            .find(|stored| stored.record.id == node)
            .map(|stored| stored.record.clone())
    }

    /// Overwrite a node's prerequisites without any checks, as another client would.
    pub async fn apply_external_edit(
        &self,
        kind: ScopeKind,
        node: NodeId,
        dependency_ids: Vec<NodeId>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .table_mut(kind)
            .iter_mut()
            .find(|stored| stored.record.id == node)
            .ok_or(StoreError::NotFound(node))?;
        stored.record.dependency_ids = dependency_ids;
        Ok(())
    }

    /// Make every call fail with [`StoreError::Unavailable`].
    pub async fn set_offline(&self, offline: bool) {
        self.inner.lock().await.offline = offline;
    }

    /// Make every write for `node` fail with [`StoreError::Rejected`].
    pub async fn reject_writes_for(&self, node: NodeId, detail: impl Into<String>) {
        self.inner.lock().await.rejections.insert(node, detail.into());
    }

    /// Stop rejecting writes for every node.
    pub async fn clear_rejections(&self) {
        self.inner.lock().await.rejections.clear();
    }

    /// Hold every write until [`resume_writes`](Self::resume_writes).
    pub fn pause_writes(&self) {
        self.gate.send_replace(true);
    }

    /// Let held and future writes proceed.
    pub fn resume_writes(&self) {
        self.gate.send_replace(false);
    }

    /// Writes accepted so far, in arrival order.
    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.inner.lock().await.writes.clone()
    }

    /// Number of successful `load_graph` calls.
    pub async fn load_count(&self) -> usize {
        self.inner.lock().await.loads
    }

    async fn wait_for_gate(&self) -> StoreResult<()> {
        let mut gate = self.gate.subscribe();
        gate.wait_for(|paused| !*paused)
            .await
            .map(|_| ())
            .map_err(|_| StoreError::Unavailable("store shut down".to_string()))
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn load_graph(&self, scope: &Scope) -> StoreResult<ScopeSnapshot> {
        let mut inner = self.inner.lock().await;
        if inner.offline {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        inner.loads += 1;

        let nodes: Vec<NodeRecord> = inner
            .table(scope.kind())
            .iter()
            .filter(|stored| stored.in_scope(scope))
            .map(|stored| stored.record.clone())
            .collect();
        let in_scope: HashSet<NodeId> = nodes.iter().map(|record| record.id).collect();

        let mut snapshot = ScopeSnapshot::from_nodes(nodes);
        snapshot
            .edges
            .retain(|edge| in_scope.contains(&edge.from) && in_scope.contains(&edge.to));

        tracing::debug!(%scope, nodes = snapshot.nodes.len(), "Store served scope");
        Ok(snapshot)
    }

    async fn persist_node_dependencies(
        &self,
        scope: &Scope,
        node: NodeId,
        dependency_ids: &[NodeId],
    ) -> StoreResult<()> {
        self.wait_for_gate().await?;
        let mut inner = self.inner.lock().await;
        inner.check_reachable(node)?;

        let kind = scope.kind();
        let table = inner.table(kind);
        if !table.iter().any(|stored| stored.record.id == node) {
            return Err(StoreError::NotFound(node));
        }
        if let Some(missing) = dependency_ids
            .iter()
            .find(|dep| !table.iter().any(|stored| stored.record.id == **dep))
        {
            return Err(StoreError::NotFound(*missing));
        }
        if dependency_ids.contains(&node) {
            return Err(StoreError::Rejected {
                node,
                detail: "a node cannot depend on itself".to_string(),
            });
        }
        if inner.would_cycle(kind, node, dependency_ids) {
            return Err(StoreError::CircularDependency { node });
        }

        if let Some(stored) = inner
            .table_mut(kind)
            .iter_mut()
            .find(|stored| stored.record.id == node)
        {
            stored.record.dependency_ids = dependency_ids.to_vec();
        }
        inner.writes.push(WriteRecord::Dependencies {
            node,
            dependency_ids: dependency_ids.to_vec(),
        });
        Ok(())
    }

    async fn persist_node_position(
        &self,
        scope: &Scope,
        node: NodeId,
        position: Position,
    ) -> StoreResult<()> {
        self.wait_for_gate().await?;
        let mut inner = self.inner.lock().await;
        inner.check_reachable(node)?;

        let stored = inner
            .table_mut(scope.kind())
            .iter_mut()
            .find(|stored| stored.record.id == node)
            .ok_or(StoreError::NotFound(node))?;
        stored.record.position = Some(position);
        inner.writes.push(WriteRecord::Position { node, position });
        Ok(())
    }

    fn supports_batch_positions(&self) -> bool {
        self.batch_positions
    }

    async fn persist_node_positions(
        &self,
        scope: &Scope,
        positions: &[(NodeId, Position)],
    ) -> StoreResult<()> {
        if !self.batch_positions {
            return Err(StoreError::Unsupported("batched position writes"));
        }
        self.wait_for_gate().await?;
        let mut inner = self.inner.lock().await;

        // All-or-nothing: check every node before touching any
        for (node, _) in positions {
            inner.check_reachable(*node)?;
            if !inner
                .table(scope.kind())
                .iter()
                .any(|stored| stored.record.id == *node)
            {
                return Err(StoreError::NotFound(*node));
            }
        }
        for (node, position) in positions {
            if let Some(stored) = inner
                .table_mut(scope.kind())
                .iter_mut()
                .find(|stored| stored.record.id == *node)
            {
                stored.record.position = Some(*position);
            }
        }
        inner.writes.push(WriteRecord::Positions {
            count: positions.len(),
        });
        Ok(())
    }
}
