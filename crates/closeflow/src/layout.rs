//! Deterministic layered layout for workflow graphs.
//!
//! Implements a simple Sugiyama-style drawing:
//!   1. Rank assignment: a node's rank is its `depth()`, so every node sits
//!      on a later rank than all of its prerequisites
//!   2. Ordering within ranks: load order
//!   3. Coordinate assignment: ranks are `between_ranks` apart along the
//!      rank axis; inside a rank, node boxes are laid side by side with a
//!      `within_rank` gap and each rank is centered against the widest one
//!   4. Translation so the top-left corner of the drawing sits at `margin`
//!
//! Positions are the top-left corner of each node's box. The box size is only
//! used for spacing and is not stored on the node. Identical input (graph,
//! direction, spacing) always yields identical coordinates.

use crate::analytics::depths;
use crate::domain::{NodeId, Position};
use crate::graph::Graph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Which way ranks advance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutDirection {
    /// Rank 0 at the top, later ranks below
    #[default]
    TopToBottom,

    /// Rank 0 on the left, later ranks to the right
    LeftToRight,
}

/// Distances used between nodes (canvas units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LayoutSpacing {
    /// Gap between neighbouring boxes of the same rank
    pub within_rank: f64,

    /// Distance between consecutive ranks along the rank axis
    pub between_ranks: f64,
}

impl Default for LayoutSpacing {
    fn default() -> Self {
        Self {
            within_rank: 50.0,
            between_ranks: 100.0,
        }
    }
}

/// Size of the box reserved for each node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NodeBox {
    /// Box width
    pub width: f64,

    /// Box height
    pub height: f64,
}

impl Default for NodeBox {
    fn default() -> Self {
        Self {
            width: 250.0,
            height: 80.0,
        }
    }
}

/// Everything the layout engine needs besides the graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LayoutConfig {
    /// Rank direction
    pub direction: LayoutDirection,

    /// Node and rank spacing
    pub spacing: LayoutSpacing,

    /// Box reserved per node
    pub node_box: NodeBox,

    /// Offset of the drawing's top-left corner
    pub margin: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            direction: LayoutDirection::default(),
            spacing: LayoutSpacing::default(),
            node_box: NodeBox::default(),
            margin: 50.0,
        }
    }
}

/// Result of a layout pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    /// Top-left corner of each node's box
    pub positions: BTreeMap<NodeId, Position>,

    /// Rank assigned to each node
    pub ranks: BTreeMap<NodeId, usize>,

    /// Width of the drawing, margins included on the leading side only
    pub width: f64,

    /// Height of the drawing, margins included on the leading side only
    pub height: f64,
}

impl Layout {
    /// Position assigned to `id`.
    pub fn position(&self, id: NodeId) -> Option<Position> {
        self.positions.get(&id).copied()
    }

    /// Number of ranks used.
    pub fn rank_count(&self) -> usize {
        self.ranks.values().max().map_or(0, |max| max + 1)
    }
}

/// Lay out a graph with the default node box and margin.
pub fn layout(
    graph: &Graph,
    direction: LayoutDirection,
    spacing: LayoutSpacing,
) -> BTreeMap<NodeId, Position> {
    let config = LayoutConfig {
        direction,
        spacing,
        ..LayoutConfig::default()
    };
    layout_with(graph, &config).positions
}

/// Lay out a graph with full control over box size and margin.
#[allow(clippy::cast_precision_loss)]
pub fn layout_with(graph: &Graph, config: &LayoutConfig) -> Layout {
    let depth_of = depths(graph);

    // Rank buckets, each in load order
    let mut buckets: Vec<Vec<NodeId>> = Vec::new();
    let mut ranks = BTreeMap::new();
    for id in graph.node_ids() {
        let rank = depth_of.get(id).copied().unwrap_or(0);
        if buckets.len() <= rank {
            buckets.resize_with(rank + 1, Vec::new);
        }
        buckets[rank].push(*id);
        ranks.insert(*id, rank);
    }

    let (cross_extent, rank_extent) = match config.direction {
        LayoutDirection::TopToBottom => (config.node_box.width, config.node_box.height),
        LayoutDirection::LeftToRight => (config.node_box.height, config.node_box.width),
    };
    let cross_pitch = cross_extent + config.spacing.within_rank;
    let rank_span = |count: usize| -> f64 {
        if count == 0 {
            0.0
        } else {
            count as f64 * cross_extent + (count - 1) as f64 * config.spacing.within_rank
        }
    };
    let widest = buckets.iter().map(|bucket| rank_span(bucket.len())).fold(0.0, f64::max);

    // Coordinates in (cross, rank) space before translation
    let mut raw: HashMap<NodeId, (f64, f64)> = HashMap::with_capacity(graph.len());
    for (rank, bucket) in buckets.iter().enumerate() {
        let offset = (widest - rank_span(bucket.len())) / 2.0;
        let along = rank as f64 * config.spacing.between_ranks;
        for (slot, id) in bucket.iter().enumerate() {
            raw.insert(*id, (offset + slot as f64 * cross_pitch, along));
        }
    }

    let min_cross = raw.values().map(|(cross, _)| *cross).fold(f64::INFINITY, f64::min);
    let min_rank = raw.values().map(|(_, along)| *along).fold(f64::INFINITY, f64::min);
    let (shift_cross, shift_rank) = if raw.is_empty() {
        (0.0, 0.0)
    } else {
        (config.margin - min_cross, config.margin - min_rank)
    };

    let positions: BTreeMap<NodeId, Position> = raw
        .into_iter()
        .map(|(id, (cross, along))| {
            let (cross, along) = (cross + shift_cross, along + shift_rank);
            let position = match config.direction {
                LayoutDirection::TopToBottom => Position::new(cross, along),
                LayoutDirection::LeftToRight => Position::new(along, cross),
            };
            (id, position)
        })
        .collect();

    let rank_total = buckets.len().saturating_sub(1) as f64 * config.spacing.between_ranks
        + if buckets.is_empty() { 0.0 } else { rank_extent };
    let (width, height) = match config.direction {
        LayoutDirection::TopToBottom => (widest, rank_total),
        LayoutDirection::LeftToRight => (rank_total, widest),
    };

    tracing::debug!(
        nodes = positions.len(),
        ranks = buckets.len(),
        direction = ?config.direction,
        "Computed layered layout"
    );

    Layout {
        positions,
        ranks,
        width: width + config.margin,
        height: height + config.margin,
    }
}
