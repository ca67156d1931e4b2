//! Persisting many node positions at once.
//!
//! Stores that can take every position in one call get exactly one call.
//! Otherwise writes go out one node at a time through a bounded queue: at
//! most `max_in_flight` requests are outstanding, and the outcomes come back
//! in submission order whatever order the store answers in.

use super::edit::{PositionWriteMode, PositionWriteReport};
use crate::domain::{NodeId, Position, Scope};
use crate::store::WorkflowStore;
use futures::stream::{self, StreamExt};

/// Send `positions` to the store and report the outcome for every node.
pub(crate) async fn write_positions(
    store: &dyn WorkflowStore,
    scope: &Scope,
    positions: Vec<(NodeId, Position)>,
    max_in_flight: usize,
) -> PositionWriteReport {
    if store.supports_batch_positions() {
        let result = store.persist_node_positions(scope, &positions).await;
        return PositionWriteReport {
            mode: PositionWriteMode::Batched,
            outcomes: positions
                .into_iter()
                .map(|(node, _)| (node, result.clone()))
                .collect(),
        };
    }

    let outcomes = stream::iter(positions)
        .map(|(node, position)| async move {
            (node, store.persist_node_position(scope, node, position).await)
        })
        .buffered(max_in_flight.max(1))
        .collect()
        .await;

    PositionWriteReport {
        mode: PositionWriteMode::Queued,
        outcomes,
    }
}
