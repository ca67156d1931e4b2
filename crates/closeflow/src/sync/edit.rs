//! Edit records and the notices the controller raises.

use crate::domain::{NodeId, Position};
use crate::error::{StoreError, StoreResult};
use crate::graph::LoadWarning;
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of one user edit, unique per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EditId(pub u64);

impl fmt::Display for EditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edit-{}", self.0)
    }
}

/// Where an edit is in its life.
///
/// ```text
/// Proposed -> Validated -> Applied -> Persisting -> Committed
///                                               \-> Failed
/// ```
///
/// Edits that fail validation never get past `Proposed` and are not
/// recorded; the caller gets the rejection back instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditState {
    /// Requested but not checked
    Proposed,
    /// Passed local validation
    Validated,
    /// Visible in the local graph
    Applied,
    /// Write sent, no answer yet
    Persisting,
    /// The store accepted the write
    Committed,
    /// The store refused the write or could not be reached
    Failed,
}

impl EditState {
    /// Whether the edit has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(self, EditState::Committed | EditState::Failed)
    }
}

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditKind {
    /// Make `from` a prerequisite of `to`
    AddEdge { from: NodeId, to: NodeId },
    /// Drop `from` from the prerequisites of `to`
    RemoveEdge { from: NodeId, to: NodeId },
    /// Drag a node to a new place
    MoveNode { node: NodeId },
    /// Re-layout the whole scope
    AutoLayout { nodes: usize },
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditKind::AddEdge { from, to } => write!(f, "add {from} -> {to}"),
            EditKind::RemoveEdge { from, to } => write!(f, "remove {from} -> {to}"),
            EditKind::MoveNode { node } => write!(f, "move {node}"),
            EditKind::AutoLayout { nodes } => write!(f, "auto-layout of {nodes} nodes"),
        }
    }
}

/// Local values an edit replaced, kept for rollback.
#[derive(Debug, Clone)]
pub(crate) enum Undo {
    Dependencies {
        node: NodeId,
        before: BTreeSet<NodeId>,
        after: BTreeSet<NodeId>,
    },
    Positions(Vec<PositionChange>),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PositionChange {
    pub(crate) node: NodeId,
    pub(crate) before: Option<Position>,
    pub(crate) after: Position,
}

/// Bookkeeping for one edit.
#[derive(Debug, Clone)]
pub struct EditRecord {
    /// Edit identifier
    pub id: EditId,

    /// What was requested
    pub kind: EditKind,

    /// Current state
    pub state: EditState,

    /// Per-node outcome of position writes, once known
    pub position_report: Option<PositionWriteReport>,

    /// Scope generation the edit was made in
    pub(crate) generation: u64,

    pub(crate) undo: Undo,
}

/// How a set of positions reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionWriteMode {
    /// One all-or-nothing call
    Batched,
    /// One call per node, a bounded number at a time
    Queued,
}

/// Outcome of every position write belonging to one edit.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionWriteReport {
    /// Transport used
    pub mode: PositionWriteMode,

    /// One entry per node, in submission order
    pub outcomes: Vec<(NodeId, StoreResult<()>)>,
}

impl PositionWriteReport {
    /// Whether every write succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_ok())
    }

    /// Nodes whose write failed, in submission order.
    pub fn failed_nodes(&self) -> Vec<NodeId> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_err())
            .map(|(node, _)| *node)
            .collect()
    }

    /// The first failure, if any.
    pub fn first_error(&self) -> Option<&StoreError> {
        self.outcomes
            .iter()
            .find_map(|(_, outcome)| outcome.as_ref().err())
    }
}

/// A non-fatal event the presentation layer should tell the user about.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotice {
    /// The store refused or never received a write
    WriteFailed {
        edit: EditId,
        node: NodeId,
        error: StoreError,
        /// Whether the local value was put back
        rolled_back: bool,
    },

    /// Rebuilding from the store failed; the local graph was kept
    RefetchFailed { error: StoreError },

    /// A write finished after the controller moved to another scope
    StaleResult { edit: EditId, committed: bool },

    /// The store returned data the graph could not take as-is
    Load(LoadWarning),
}

impl fmt::Display for SyncNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncNotice::WriteFailed {
                edit,
                node,
                error,
                rolled_back,
            } => {
                write!(f, "could not save node {node} ({edit}): {error}")?;
                if *rolled_back {
                    write!(f, "; change undone")
                } else {
                    write!(f, "; local view may differ from the server")
                }
            }
            SyncNotice::RefetchFailed { error } => {
                write!(f, "could not refresh workflow: {error}")
            }
            SyncNotice::StaleResult { edit, committed } => {
                let outcome = if *committed { "saved" } else { "failed" };
                write!(f, "{edit} {outcome} after the view changed")
            }
            SyncNotice::Load(warning) => write!(f, "workflow data issue: {warning:?}"),
        }
    }
}
