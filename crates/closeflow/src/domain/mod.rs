//! Domain types for workflow dependency graphs.
//!
//! This module contains the value types shared by every part of the engine:
//! node identifiers, the records exchanged with the workflow store, and the
//! in-memory node representation held by [`Graph`](crate::graph::Graph).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Unique identifier for a node (a task or a task template) within a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i64);

impl NodeId {
    /// Create a new node ID
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw integer value
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NodeId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A point on the workflow canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate
    pub x: f64,

    /// Vertical coordinate
    pub y: f64,
}

impl Position {
    /// Create a new position
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Which kind of workflow universe a graph was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// Reusable task templates
    Template,

    /// Concrete tasks belonging to one close period
    PeriodInstance,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Template => write!(f, "template"),
            ScopeKind::PeriodInstance => write!(f, "period"),
        }
    }
}

/// Selector for the set of nodes a graph covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    /// A template family, optionally narrowed to one category (department)
    TemplateFamily {
        /// Category filter; `None` selects every template
        category: Option<String>,
    },

    /// The task instances of a single close period
    Period {
        /// Identifier of the period
        period_id: i64,
    },
}

impl Scope {
    /// Every template, unfiltered.
    pub fn all_templates() -> Self {
        Scope::TemplateFamily { category: None }
    }

    /// Templates of one category.
    pub fn template_category(category: impl Into<String>) -> Self {
        Scope::TemplateFamily {
            category: Some(category.into()),
        }
    }

    /// Tasks of one period.
    pub fn period(period_id: i64) -> Self {
        Scope::Period { period_id }
    }

    /// The kind of nodes this scope selects.
    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::TemplateFamily { .. } => ScopeKind::Template,
            Scope::Period { .. } => ScopeKind::PeriodInstance,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::TemplateFamily { category: None } => write!(f, "templates"),
            Scope::TemplateFamily {
                category: Some(category),
            } => write!(f, "templates[{category}]"),
            Scope::Period { period_id } => write!(f, "period-{period_id}"),
        }
    }
}

/// Minimal user reference attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUser {
    /// User identifier in the external store
    pub id: i64,

    /// Display name
    pub name: String,
}

/// Descriptive node data owned by the workflow store.
///
/// The engine carries these fields through untouched; none of the graph
/// algorithms read them. Unknown fields sent by the store are kept in `extra`
/// so they survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeAttributes {
    /// Free-form description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Task status; templates have none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Owning department
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    /// Accountable owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<NodeUser>,

    /// Person doing the work
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<NodeUser>,

    /// Due date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,

    /// Priority as reported by the store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    /// Any additional fields the store sends
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A node as returned by the workflow store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node identifier
    pub id: NodeId,

    /// Display label
    #[serde(alias = "name")]
    pub label: String,

    /// Store-owned descriptive data
    #[serde(default)]
    pub attributes: NodeAttributes,

    /// Saved canvas position, if any
    #[serde(default)]
    pub position: Option<Position>,

    /// Prerequisites of this node
    #[serde(default)]
    pub dependency_ids: Vec<NodeId>,
}

impl NodeRecord {
    /// Create a record with no attributes, position or dependencies.
    pub fn new(id: impl Into<NodeId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            attributes: NodeAttributes::default(),
            position: None,
            dependency_ids: Vec::new(),
        }
    }

    /// Builder-style setter for the prerequisite list.
    #[must_use]
    pub fn with_dependencies(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.dependency_ids = ids.into_iter().map(NodeId).collect();
        self
    }

    /// Builder-style setter for the saved position.
    #[must_use]
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

/// A directed edge from a prerequisite to its dependent.
///
/// Edges are always derived from `dependency_ids`; an edge `(from, to)`
/// exists exactly when `to` lists `from` as a prerequisite.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Edge identifier in the form `e{from}-{to}`
    pub id: String,

    /// The prerequisite
    #[serde(alias = "source")]
    pub from: NodeId,

    /// The dependent
    #[serde(alias = "target")]
    pub to: NodeId,
}

impl GraphEdge {
    /// Create the edge for `to` depending on `from`.
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self {
            id: Self::edge_id(from, to),
            from,
            to,
        }
    }

    /// The canonical edge identifier.
    pub fn edge_id(from: NodeId, to: NodeId) -> String {
        format!("e{from}-{to}")
    }
}

/// Everything the store returns for one scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    /// Nodes in load order
    pub nodes: Vec<NodeRecord>,

    /// Edges as computed by the store
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl ScopeSnapshot {
    /// Build a snapshot whose edge list is derived from the node records.
    pub fn from_nodes(nodes: Vec<NodeRecord>) -> Self {
        let edges = nodes
            .iter()
            .flat_map(|node| {
                node.dependency_ids
                    .iter()
                    .map(move |dep| GraphEdge::new(*dep, node.id))
            })
            .collect();
        Self { nodes, edges }
    }
}

/// A node held in memory by a [`Graph`](crate::graph::Graph).
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    /// Node identifier
    pub id: NodeId,

    /// Display label
    pub label: String,

    /// Store-owned descriptive data
    pub attributes: NodeAttributes,

    /// Canvas position, if placed
    pub position: Option<Position>,

    /// Prerequisites inside the loaded scope
    pub(crate) dependency_ids: BTreeSet<NodeId>,

    /// Prerequisites the store reported that lie outside the loaded scope.
    ///
    /// They take no part in any graph algorithm but are sent back with every
    /// dependency write so a filtered view never erases them.
    pub(crate) external_dependency_ids: BTreeSet<NodeId>,
}

impl GraphNode {
    /// Create a node with no prerequisites.
    pub fn new(id: impl Into<NodeId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            attributes: NodeAttributes::default(),
            position: None,
            dependency_ids: BTreeSet::new(),
            external_dependency_ids: BTreeSet::new(),
        }
    }

    /// Prerequisites inside the loaded scope.
    pub fn dependency_ids(&self) -> &BTreeSet<NodeId> {
        &self.dependency_ids
    }

    /// Prerequisites outside the loaded scope.
    pub fn external_dependency_ids(&self) -> &BTreeSet<NodeId> {
        &self.external_dependency_ids
    }

    /// Whether `id` is a direct prerequisite of this node.
    pub fn depends_on(&self, id: NodeId) -> bool {
        self.dependency_ids.contains(&id)
    }

    /// The complete list sent to the store on a dependency write.
    pub fn persisted_dependency_ids(&self) -> Vec<NodeId> {
        self.dependency_ids
            .union(&self.external_dependency_ids)
            .copied()
            .collect()
    }
}
