//! Integration tests for the mutation and sync controller.
//!
//! These drive a [`Controller`] against the in-memory store, using its fault
//! injection to cover failed writes, backend-side cycle detection, writes that
//! overlap, and results that arrive after a scope switch.

mod common;

use closeflow::config::{ConsistencyPolicy, EngineConfig};
use closeflow::domain::{NodeId, NodeRecord, Position, Scope, ScopeKind};
use closeflow::error::{Error, StoreError};
use closeflow::store::InMemoryStore;
use closeflow::store::in_memory::WriteRecord;
use closeflow::sync::{Controller, EditState, PositionWriteMode, SyncNotice};
use common::{ids, init_tracing, template_store};
use rstest::rstest;
use std::sync::Arc;

const CHAIN: &[(i64, &[i64])] = &[(1, &[]), (2, &[1]), (3, &[2]), (4, &[])];

fn config_with(consistency: ConsistencyPolicy) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.sync.consistency = consistency;
    config
}

async fn open(store: &Arc<InMemoryStore>, config: EngineConfig) -> Controller {
    init_tracing();
    Controller::load(store.clone(), Scope::all_templates(), config)
        .await
        .unwrap()
}

// ========== Edge edits ==========

#[tokio::test]
async fn test_commit_refetches_and_rebuilds() {
    let store = template_store(InMemoryStore::new(), CHAIN).await;
    let mut controller = open(&store, EngineConfig::default()).await;

    let edit = controller.add_edge(NodeId(3), NodeId(4)).unwrap();
    controller.settle().await;

    assert_eq!(controller.edit_state(edit), Some(EditState::Committed));
    assert!(controller.graph().node(NodeId(4)).unwrap().depends_on(NodeId(3)));
    assert_eq!(store.load_count().await, 2);
    assert!(controller.drain_notices().is_empty());
}

#[tokio::test]
async fn test_refetch_picks_up_external_changes() {
    let store = template_store(InMemoryStore::new(), CHAIN).await;
    let mut controller = open(&store, EngineConfig::default()).await;

    store
        .apply_external_edit(ScopeKind::Template, NodeId(4), ids(&[1]))
        .await
        .unwrap();
    assert!(!controller.graph().node(NodeId(4)).unwrap().depends_on(NodeId(1)));

    controller.refetch().await.unwrap();

    assert!(controller.graph().node(NodeId(4)).unwrap().depends_on(NodeId(1)));
}

#[tokio::test]
async fn test_backend_cycle_check_catches_unseen_edges() {
    let store = template_store(InMemoryStore::new(), CHAIN).await;
    let mut controller = open(&store, EngineConfig::default()).await;

    // Another client makes 4 depend on 3; this controller has not seen it
    store
        .apply_external_edit(ScopeKind::Template, NodeId(4), ids(&[3]))
        .await
        .unwrap();

    let edit = controller.add_edge(NodeId(4), NodeId(1)).unwrap();
    controller.settle().await;

    assert_eq!(controller.edit_state(edit), Some(EditState::Failed));
    assert!(!controller.graph().node(NodeId(1)).unwrap().depends_on(NodeId(4)));
    let notices = controller.drain_notices();
    assert_eq!(
        notices,
        vec![SyncNotice::WriteFailed {
            edit,
            node: NodeId(1),
            error: StoreError::CircularDependency { node: NodeId(1) },
            rolled_back: true,
        }]
    );
}

#[rstest]
#[case::rollback(ConsistencyPolicy::RollbackOnFailure, false, true)]
#[case::optimistic(ConsistencyPolicy::Optimistic, true, false)]
#[tokio::test]
async fn test_failure_policy(
    #[case] consistency: ConsistencyPolicy,
    #[case] keeps_local_edge: bool,
    #[case] rolled_back: bool,
) {
    let store = template_store(InMemoryStore::new(), CHAIN).await;
    let mut controller = open(&store, config_with(consistency)).await;
    store.reject_writes_for(NodeId(4), "locked for review").await;

    controller.add_edge(NodeId(1), NodeId(4)).unwrap();
    controller.settle().await;

    let node = controller.graph().node(NodeId(4)).unwrap();
    assert_eq!(node.depends_on(NodeId(1)), keeps_local_edge);
    assert_eq!(controller.divergent_nodes().contains(&NodeId(4)), !rolled_back);
    assert!(matches!(
        controller.drain_notices().as_slice(),
        [SyncNotice::WriteFailed { rolled_back: r, .. }] if *r == rolled_back
    ));
}

#[tokio::test]
async fn test_refetch_clears_divergence() {
    let store = template_store(InMemoryStore::new(), CHAIN).await;
    let mut controller = open(&store, config_with(ConsistencyPolicy::Optimistic)).await;
    store.set_offline(true).await;

    controller.remove_edge(NodeId(1), NodeId(2)).unwrap();
    controller.settle().await;
    assert_eq!(controller.divergent_nodes().len(), 1);

    store.set_offline(false).await;
    controller.refetch().await.unwrap();

    assert!(controller.divergent_nodes().is_empty());
    assert!(controller.graph().node(NodeId(2)).unwrap().depends_on(NodeId(1)));
}

#[tokio::test]
async fn test_failed_refetch_keeps_local_graph() {
    let store = template_store(InMemoryStore::new(), CHAIN).await;
    let mut controller = open(&store, EngineConfig::default()).await;
    store.set_offline(true).await;

    let result = controller.refetch().await;

    assert!(matches!(result, Err(Error::Store(StoreError::Unavailable(_)))));
    assert_eq!(controller.graph().len(), 4);
}

// ========== Overlapping writes ==========

#[tokio::test]
async fn test_several_writes_in_flight() {
    let store = template_store(InMemoryStore::new(), CHAIN).await;
    let mut controller = open(&store, EngineConfig::default()).await;
    store.pause_writes();

    let first = controller.add_edge(NodeId(1), NodeId(4)).unwrap();
    let second = controller.move_node(NodeId(2), Position::new(10.0, 20.0)).unwrap();
    let third = controller.add_edge(NodeId(1), NodeId(3)).unwrap();

    assert_eq!(controller.pending_edits(), vec![first, second, third]);
    assert_eq!(controller.in_flight(), 3);

    store.resume_writes();
    controller.settle().await;

    assert!(controller.pending_edits().is_empty());
    for edit in [first, second, third] {
        assert_eq!(controller.edit_state(edit), Some(EditState::Committed));
    }
    let record = store.record(ScopeKind::Template, NodeId(3)).await.unwrap();
    assert_eq!(record.dependency_ids, ids(&[1, 2]));
    assert!(controller.graph().node(NodeId(4)).unwrap().depends_on(NodeId(1)));
    assert_eq!(
        controller.graph().node(NodeId(2)).unwrap().position,
        Some(Position::new(10.0, 20.0))
    );
}

#[tokio::test]
async fn test_late_result_after_scope_switch_is_only_recorded() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_template(NodeRecord::new(1, "Accruals"), Some("GL")).await;
    store.insert_template(NodeRecord::new(2, "Reconcile"), Some("GL")).await;
    store.insert_template(NodeRecord::new(3, "Pay vendors"), Some("AP")).await;
    init_tracing();
    let mut controller =
        Controller::load(store.clone(), Scope::template_category("GL"), EngineConfig::default())
            .await
            .unwrap();

    store.pause_writes();
    let edit = controller.add_edge(NodeId(1), NodeId(2)).unwrap();
    controller.switch_scope(Scope::template_category("AP")).await.unwrap();
    store.resume_writes();
    controller.settle().await;

    assert_eq!(controller.edit_state(edit), Some(EditState::Committed));
    assert_eq!(controller.graph().node_ids(), ids(&[3]).as_slice());
    assert_eq!(
        controller.drain_notices(),
        vec![SyncNotice::StaleResult {
            edit,
            committed: true,
        }]
    );
    // No refetch for the stale commit: initial load plus the switch
    assert_eq!(store.load_count().await, 2);
}

// ========== Positions ==========

#[tokio::test]
async fn test_auto_layout_uses_batch_when_available() {
    let store = template_store(InMemoryStore::with_batch_positions(), CHAIN).await;
    let mut controller = open(&store, EngineConfig::default()).await;

    let edit = controller.auto_layout().unwrap();
    controller.settle().await;

    let report = controller.edit(edit).unwrap().position_report.clone().unwrap();
    assert_eq!(report.mode, PositionWriteMode::Batched);
    assert!(report.all_succeeded());
    assert_eq!(store.writes().await, vec![WriteRecord::Positions { count: 4 }]);
}

#[tokio::test]
async fn test_auto_layout_queue_reports_each_node() {
    let store = template_store(InMemoryStore::new(), CHAIN).await;
    let mut controller = open(&store, EngineConfig::default()).await;
    store.reject_writes_for(NodeId(3), "archived").await;

    let edit = controller.auto_layout().unwrap();
    let planned = controller.graph().node(NodeId(2)).unwrap().position;
    controller.settle().await;

    let report = controller.edit(edit).unwrap().position_report.clone().unwrap();
    assert_eq!(report.mode, PositionWriteMode::Queued);
    let order: Vec<NodeId> = report.outcomes.iter().map(|(node, _)| *node).collect();
    assert_eq!(order, ids(&[1, 2, 3, 4]));
    assert_eq!(report.failed_nodes(), ids(&[3]));
    assert_eq!(controller.edit_state(edit), Some(EditState::Failed));

    // Only the failed node is rolled back
    assert_eq!(controller.graph().node(NodeId(3)).unwrap().position, None);
    assert_eq!(controller.graph().node(NodeId(2)).unwrap().position, planned);
    assert_eq!(
        store.record(ScopeKind::Template, NodeId(2)).await.unwrap().position,
        planned
    );
}

#[tokio::test]
async fn test_move_unknown_node_is_declined() {
    let store = template_store(InMemoryStore::new(), CHAIN).await;
    let mut controller = open(&store, EngineConfig::default()).await;

    let result = controller.move_node(NodeId(99), Position::new(0.0, 0.0));

    assert!(matches!(result, Err(Error::NodeNotFound(NodeId(99)))));
    assert!(store.writes().await.is_empty());
}

// ========== Loading ==========

#[tokio::test]
async fn test_load_warnings_become_notices() {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_template(NodeRecord::new(1, "a").with_dependencies([1]), None)
        .await;
    init_tracing();

    let mut controller = Controller::load(store, Scope::all_templates(), EngineConfig::default())
        .await
        .unwrap();

    assert_eq!(controller.load_warnings().len(), 1);
    assert!(matches!(
        controller.drain_notices().as_slice(),
        [SyncNotice::Load(_)]
    ));
}

#[tokio::test]
async fn test_filtered_scope_keeps_external_prerequisites() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_template(NodeRecord::new(1, "Accruals"), Some("GL")).await;
    store.insert_template(NodeRecord::new(2, "Invoices"), Some("AP")).await;
    store
        .insert_template(NodeRecord::new(3, "Pay").with_dependencies([1]), Some("AP"))
        .await;
    init_tracing();
    let mut controller =
        Controller::load(store.clone(), Scope::template_category("AP"), EngineConfig::default())
            .await
            .unwrap();

    controller.add_edge(NodeId(2), NodeId(3)).unwrap();
    controller.settle().await;

    let record = store.record(ScopeKind::Template, NodeId(3)).await.unwrap();
    assert_eq!(record.dependency_ids, ids(&[1, 2]));
}
