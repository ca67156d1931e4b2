//! Boundary to the workflow store.
//!
//! The engine talks to the system that owns task and template data through
//! the [`WorkflowStore`] trait: one read call that returns a whole scope and
//! narrow write calls for dependencies and positions. Transport is up to the
//! implementation; the crate ships an [`InMemoryStore`] for tests and local
//! use.
//!
//! # Architecture
//!
//! The trait is async and object-safe so the controller can hold it as
//! `Arc<dyn WorkflowStore>` and move clones into spawned persistence tasks.
//! Implementations must be `Send + Sync`.
//!
//! # Example
//!
//! ```no_run
//! use closeflow::domain::{NodeRecord, Scope};
//! use closeflow::store::{InMemoryStore, WorkflowStore};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let store = InMemoryStore::new();
//!     store.insert_template(NodeRecord::new(1, "Accruals"), Some("GL")).await;
//!
//!     let snapshot = store.load_graph(&Scope::all_templates()).await?;
//!     println!("loaded {} nodes", snapshot.nodes.len());
//!     Ok(())
//! }
//! ```

use crate::domain::{NodeId, Position, Scope, ScopeSnapshot};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;

pub mod in_memory;

pub use in_memory::InMemoryStore;

/// Read and write access to the canonical workflow data.
///
/// # Error Handling
///
/// All methods return [`StoreResult`]. The controller treats every error as a
/// non-fatal persistence failure; see [`StoreError`] for the variants.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Fetch every node of a scope, with the store's own edge list.
    async fn load_graph(&self, scope: &Scope) -> StoreResult<ScopeSnapshot>;

    /// Replace a node's complete prerequisite list.
    ///
    /// The list is the full set, never a delta. Stores may run their own
    /// cycle check and answer [`StoreError::CircularDependency`].
    async fn persist_node_dependencies(
        &self,
        scope: &Scope,
        node: NodeId,
        dependency_ids: &[NodeId],
    ) -> StoreResult<()>;

    /// Save one node's canvas position.
    async fn persist_node_position(
        &self,
        scope: &Scope,
        node: NodeId,
        position: Position,
    ) -> StoreResult<()>;

    /// Whether [`persist_node_positions`](Self::persist_node_positions) is
    /// available and atomic.
    fn supports_batch_positions(&self) -> bool {
        false
    }

    /// Save many positions in one all-or-nothing call.
    ///
    /// Only called when [`supports_batch_positions`](Self::supports_batch_positions)
    /// returns `true`.
    async fn persist_node_positions(
        &self,
        _scope: &Scope,
        _positions: &[(NodeId, Position)],
    ) -> StoreResult<()> {
        Err(StoreError::Unsupported("batched position writes"))
    }
}
