//! Mutation and sync controller.
//!
//! The [`Controller`] owns the graph of the scope being edited. Every user
//! edit is validated locally, applied to the graph at once, and then
//! persisted in a spawned task, so the caller can keep editing while writes
//! are in flight. Completions come back over a channel and are folded into
//! the controller state by [`Controller::next_event`],
//! [`Controller::process_ready`] or [`Controller::settle`].
//!
//! # Consistency
//!
//! - A committed dependency write triggers a refetch of the whole scope when
//!   `refetch-after-commit` is on, which also clears divergence.
//! - A failed write raises a [`SyncNotice`]. Under
//!   [`ConsistencyPolicy::RollbackOnFailure`] the node's pre-edit value is put
//!   back unless a later edit already replaced it; under
//!   [`ConsistencyPolicy::Optimistic`] the local value stays and the node is
//!   marked divergent until the next refetch.
//! - Writes to the same node are not sequenced: the last answer wins.
//! - A result that arrives after [`Controller::switch_scope`] updates its edit
//!   record but never touches the new scope's graph.
//!
//! # Example
//!
//! ```no_run
//! use closeflow::config::EngineConfig;
//! use closeflow::domain::{NodeId, NodeRecord, Scope};
//! use closeflow::store::InMemoryStore;
//! use closeflow::sync::Controller;
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(InMemoryStore::new());
//!     store.insert_template(NodeRecord::new(1, "Accruals"), None).await;
//!     store.insert_template(NodeRecord::new(2, "Reconcile"), None).await;
//!
//!     let mut controller =
//!         Controller::load(store, Scope::all_templates(), EngineConfig::default()).await?;
//!     let edit = controller.add_edge(NodeId(1), NodeId(2))?;
//!     controller.settle().await;
//!
//!     println!("{edit}: {:?}", controller.edit_state(edit));
//!     Ok(())
//! }
//! ```

mod edit;
mod positions;

pub use edit::{
    EditId, EditKind, EditRecord, EditState, PositionWriteMode, PositionWriteReport, SyncNotice,
};

use crate::config::{ConsistencyPolicy, EngineConfig};
use crate::domain::{NodeId, Position, Scope};
use crate::error::{Error, Result, StoreError, StoreResult};
use crate::graph::{Graph, LoadWarning, invariant_violations};
use crate::layout::layout_with;
use crate::store::WorkflowStore;
use crate::validation::{can_add_edge, can_remove_edge};
use edit::{PositionChange, Undo};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// A store answer on its way back to the controller.
#[derive(Debug)]
struct Completion {
    edit: EditId,
    outcome: Outcome,
}

#[derive(Debug)]
enum Outcome {
    Dependencies(StoreResult<()>),
    Positions(PositionWriteReport),
}

impl Outcome {
    fn succeeded(&self) -> bool {
        match self {
            Outcome::Dependencies(result) => result.is_ok(),
            Outcome::Positions(report) => report.all_succeeded(),
        }
    }
}

/// Owns a scope's graph and keeps it in step with the store.
pub struct Controller {
    store: Arc<dyn WorkflowStore>,
    scope: Scope,
    graph: Graph,
    config: EngineConfig,
    runtime: Handle,

    /// Bumped on every scope switch
    generation: u64,
    next_edit: u64,
    edits: BTreeMap<EditId, EditRecord>,
    divergent: BTreeSet<NodeId>,
    notices: VecDeque<SyncNotice>,
    warnings: Vec<LoadWarning>,

    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    in_flight: usize,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("scope", &self.scope)
            .field("nodes", &self.graph.len())
            .field("generation", &self.generation)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Load a scope from the store and take ownership of its graph.
    ///
    /// Must be called from inside a tokio runtime; persistence tasks are
    /// spawned on it.
    pub async fn load(
        store: Arc<dyn WorkflowStore>,
        scope: Scope,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;
        let (graph, warnings) = fetch(store.as_ref(), &scope).await?;
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let mut controller = Self {
            store,
            scope,
            graph,
            config,
            runtime,
            generation: 0,
            next_edit: 0,
            edits: BTreeMap::new(),
            divergent: BTreeSet::new(),
            notices: VecDeque::new(),
            warnings: Vec::new(),
            completions_tx,
            completions_rx,
            in_flight: 0,
        };
        controller.replace_warnings(warnings);
        Ok(controller)
    }

    /// The graph as the user currently sees it.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The scope being edited.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Problems found when the current graph was last loaded.
    pub fn load_warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    /// State of an edit, if it was recorded.
    pub fn edit_state(&self, edit: EditId) -> Option<EditState> {
        self.edits.get(&edit).map(|record| record.state)
    }

    /// Full record of an edit.
    pub fn edit(&self, edit: EditId) -> Option<&EditRecord> {
        self.edits.get(&edit)
    }

    /// Edits still waiting for the store, oldest first.
    pub fn pending_edits(&self) -> Vec<EditId> {
        self.edits
            .values()
            .filter(|record| record.state == EditState::Persisting)
            .map(|record| record.id)
            .collect()
    }

    /// Number of writes not yet folded back in.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Nodes whose local value may differ from the store.
    pub fn divergent_nodes(&self) -> &BTreeSet<NodeId> {
        &self.divergent
    }

    /// Take every notice raised so far, oldest first.
    pub fn drain_notices(&mut self) -> Vec<SyncNotice> {
        self.notices.drain(..).collect()
    }

    /// Make `from` a prerequisite of `to`.
    ///
    /// Invalid edges are declined with [`Error::InvalidEdge`] before anything
    /// is sent to the store.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<EditId> {
        let kind = EditKind::AddEdge { from, to };
        tracing::debug!(%from, %to, state = ?EditState::Proposed, "Edit proposed");
        if let Err(rejection) = can_add_edge(&self.graph, from, to) {
            tracing::debug!(%from, %to, reason = rejection.reason(), "Edit declined");
            return Err(rejection.into());
        }
        self.change_dependencies(kind, to, |deps| {
            deps.insert(from);
        })
    }

    /// Drop `from` from the prerequisites of `to`.
    ///
    /// Fails with [`Error::DependencyNotFound`] if `to` does not depend on
    /// `from`, and with [`Error::NodeNotFound`] for unknown nodes.
    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) -> Result<EditId> {
        let kind = EditKind::RemoveEdge { from, to };
        tracing::debug!(%from, %to, state = ?EditState::Proposed, "Edit proposed");
        can_remove_edge(&self.graph, from, to)?;
        let node = self.graph.node(to).ok_or(Error::NodeNotFound(to))?;
        if !node.depends_on(from) {
            return Err(Error::DependencyNotFound { from, to });
        }
        self.change_dependencies(kind, to, |deps| {
            deps.remove(&from);
        })
    }

    /// Move one node and save its new position.
    pub fn move_node(&mut self, node: NodeId, position: Position) -> Result<EditId> {
        if !self.graph.contains(node) {
            return Err(Error::NodeNotFound(node));
        }
        self.change_positions(EditKind::MoveNode { node }, vec![(node, position)])
    }

    /// Lay out the whole scope, apply every position, and save them.
    pub fn auto_layout(&mut self) -> Result<EditId> {
        let layout = layout_with(&self.graph, &self.config.layout);
        let positions: Vec<(NodeId, Position)> = self
            .graph
            .node_ids()
            .iter()
            .filter_map(|id| layout.position(*id).map(|position| (*id, position)))
            .collect();
        let kind = EditKind::AutoLayout {
            nodes: positions.len(),
        };
        self.change_positions(kind, positions)
    }

    /// Reload the current scope from the store.
    ///
    /// On success the graph is rebuilt and divergence cleared. On failure the
    /// local graph is kept and the error returned.
    pub async fn refetch(&mut self) -> Result<()> {
        let (graph, warnings) = fetch(self.store.as_ref(), &self.scope).await?;
        self.graph = graph;
        self.divergent.clear();
        self.replace_warnings(warnings);
        Ok(())
    }

    /// Load another scope and make it current.
    ///
    /// Writes still in flight for the previous scope finish normally, but
    /// their results are only recorded.
    pub async fn switch_scope(&mut self, scope: Scope) -> Result<()> {
        let (graph, warnings) = fetch(self.store.as_ref(), &scope).await?;
        self.generation += 1;
        tracing::info!(from = %self.scope, to = %scope, "Switched scope");
        self.scope = scope;
        self.graph = graph;
        self.divergent.clear();
        self.replace_warnings(warnings);
        Ok(())
    }

    /// Wait for the next write to finish and fold it in.
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn next_event(&mut self) -> Option<EditId> {
        if self.in_flight == 0 {
            return None;
        }
        let completion = self.completions_rx.recv().await?;
        let edit = completion.edit;
        self.complete(completion).await;
        Some(edit)
    }

    /// Fold in every write that has already finished, without waiting.
    pub async fn process_ready(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.complete(completion).await;
            processed += 1;
        }
        processed
    }

    /// Wait until no write is in flight.
    pub async fn settle(&mut self) {
        while self.next_event().await.is_some() {}
    }

    fn change_dependencies(
        &mut self,
        kind: EditKind,
        node: NodeId,
        change: impl FnOnce(&mut BTreeSet<NodeId>),
    ) -> Result<EditId> {
        let current = self.graph.node(node).ok_or(Error::NodeNotFound(node))?;
        let mut after = current.dependency_ids().clone();
        change(&mut after);

        let id = self.begin(kind);
        let before = self.graph.set_dependencies(node, after.clone())?;
        self.advance(id, EditState::Applied);

        let payload = self
            .graph
            .node(node)
            .map(|n| n.persisted_dependency_ids())
            .unwrap_or_default();
        self.record_undo(id, Undo::Dependencies { node, before, after });

        let store = Arc::clone(&self.store);
        let scope = self.scope.clone();
        self.spawn(id, async move {
            let result = store.persist_node_dependencies(&scope, node, &payload).await;
            Outcome::Dependencies(result)
        });
        Ok(id)
    }

    fn change_positions(
        &mut self,
        kind: EditKind,
        targets: Vec<(NodeId, Position)>,
    ) -> Result<EditId> {
        let id = self.begin(kind);
        let mut changes = Vec::with_capacity(targets.len());
        for (node, after) in &targets {
            let before = self.graph.set_position(*node, *after)?;
            changes.push(PositionChange {
                node: *node,
                before,
                after: *after,
            });
        }
        self.advance(id, EditState::Applied);
        self.record_undo(id, Undo::Positions(changes));

        let store = Arc::clone(&self.store);
        let scope = self.scope.clone();
        let max_in_flight = self.config.sync.max_in_flight_positions;
        self.spawn(id, async move {
            let report =
                positions::write_positions(store.as_ref(), &scope, targets, max_in_flight).await;
            Outcome::Positions(report)
        });
        Ok(id)
    }

    /// Record a new edit that already passed validation.
    fn begin(&mut self, kind: EditKind) -> EditId {
        self.next_edit += 1;
        let id = EditId(self.next_edit);
        self.edits.insert(
            id,
            EditRecord {
                id,
                kind,
                state: EditState::Proposed,
                position_report: None,
                generation: self.generation,
                undo: Undo::Positions(Vec::new()),
            },
        );
        self.advance(id, EditState::Validated);
        id
    }

    fn advance(&mut self, id: EditId, state: EditState) {
        if let Some(record) = self.edits.get_mut(&id) {
            tracing::debug!(edit_id = %id, kind = %record.kind, ?state, "Edit state changed");
            record.state = state;
        }
    }

    fn record_undo(&mut self, id: EditId, undo: Undo) {
        if let Some(record) = self.edits.get_mut(&id) {
            record.undo = undo;
        }
    }

    fn spawn<F>(&mut self, id: EditId, write: F)
    where
        F: std::future::Future<Output = Outcome> + Send + 'static,
    {
        let tx = self.completions_tx.clone();
        self.runtime.spawn(async move {
            let outcome = write.await;
            // The receiver only goes away with the controller
            let _ = tx.send(Completion { edit: id, outcome });
        });
        self.in_flight += 1;
        self.advance(id, EditState::Persisting);
    }

    async fn complete(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let Completion { edit, outcome } = completion;
        let Some(record) = self.edits.get_mut(&edit) else {
            return;
        };

        let committed = outcome.succeeded();
        record.state = if committed {
            EditState::Committed
        } else {
            EditState::Failed
        };
        let stale = record.generation != self.generation;
        let undo = record.undo.clone();
        let is_dependency_write = matches!(outcome, Outcome::Dependencies(_));
        let failures = match outcome {
            Outcome::Dependencies(Ok(())) => Vec::new(),
            Outcome::Dependencies(Err(error)) => match &undo {
                Undo::Dependencies { node, .. } => vec![(*node, error)],
                Undo::Positions(_) => Vec::new(),
            },
            Outcome::Positions(report) => {
                let failures: Vec<(NodeId, StoreError)> = report
                    .outcomes
                    .iter()
                    .filter_map(|(node, result)| {
                        result.as_ref().err().map(|error| (*node, error.clone()))
                    })
                    .collect();
                record.position_report = Some(report);
                failures
            }
        };

        if stale {
            tracing::info!(edit_id = %edit, committed, "Write finished after scope switch");
            self.notices
                .push_back(SyncNotice::StaleResult { edit, committed });
            return;
        }

        if committed {
            tracing::info!(edit_id = %edit, scope = %self.scope, "Edit committed");
            if is_dependency_write && self.config.sync.refetch_after_commit {
                if let Err(err) = self.refetch().await {
                    tracing::warn!(scope = %self.scope, error = %err, "Refetch after commit failed");
                    let error = match err {
                        Error::Store(error) => error,
                        other => StoreError::Unavailable(other.to_string()),
                    };
                    self.notices.push_back(SyncNotice::RefetchFailed { error });
                }
            }
            return;
        }

        for (node, error) in failures {
            let rolled_back = self.handle_failure(&undo, node);
            tracing::warn!(
                edit_id = %edit,
                node_id = %node,
                error = %error,
                rolled_back,
                "Persistence failed"
            );
            self.notices.push_back(SyncNotice::WriteFailed {
                edit,
                node,
                error,
                rolled_back,
            });
        }
    }

    /// Apply the consistency policy to one failed node. Returns whether the
    /// local value was restored.
    fn handle_failure(&mut self, undo: &Undo, node: NodeId) -> bool {
        let restored = match self.config.sync.consistency {
            ConsistencyPolicy::Optimistic => false,
            ConsistencyPolicy::RollbackOnFailure => self.roll_back(undo, node),
        };
        if !restored {
            self.divergent.insert(node);
        }
        restored
    }

    fn roll_back(&mut self, undo: &Undo, node: NodeId) -> bool {
        let Some(current) = self.graph.node(node) else {
            return false;
        };
        match undo {
            Undo::Dependencies { before, after, .. } => {
                if current.dependency_ids() != after {
                    return false;
                }
                self.graph.set_dependencies(node, before.clone()).is_ok()
            }
            Undo::Positions(changes) => {
                let Some(change) = changes.iter().find(|change| change.node == node) else {
                    return false;
                };
                if current.position != Some(change.after) {
                    return false;
                }
                match change.before {
                    Some(before) => self.graph.set_position(node, before).is_ok(),
                    None => self.graph.clear_position(node).is_ok(),
                }
            }
        }
    }

    fn replace_warnings(&mut self, warnings: Vec<LoadWarning>) {
        for warning in &warnings {
            tracing::warn!(scope = %self.scope, ?warning, "Skipped invalid workflow data");
            self.notices.push_back(SyncNotice::Load(warning.clone()));
        }
        self.warnings = warnings;
    }
}

async fn fetch(store: &dyn WorkflowStore, scope: &Scope) -> Result<(Graph, Vec<LoadWarning>)> {
    let snapshot = store.load_graph(scope).await?;
    let outcome = Graph::from_snapshot(scope.kind(), snapshot);
    for violation in invariant_violations(&outcome.graph) {
        tracing::warn!(%scope, ?violation, "Loaded graph breaks an invariant");
    }
    tracing::info!(
        %scope,
        nodes = outcome.graph.len(),
        edges = outcome.graph.edges().len(),
        warnings = outcome.warnings.len(),
        "Loaded workflow graph"
    );
    Ok((outcome.graph, outcome.warnings))
}
