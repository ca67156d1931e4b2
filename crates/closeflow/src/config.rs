//! Engine configuration.
//!
//! Configuration is stored as YAML with kebab-case keys. Every field has a
//! default, so an empty file (or no file) is a valid configuration:
//!
//! ```yaml
//! layout:
//!   direction: top-to-bottom
//!   spacing:
//!     within-rank: 50.0
//!     between-ranks: 100.0
//!   node-box:
//!     width: 250.0
//!     height: 80.0
//!   margin: 50.0
//! sync:
//!   consistency: rollback-on-failure
//!   max-in-flight-positions: 4
//!   refetch-after-commit: true
//! ```

use crate::error::{Error, Result};
use crate::layout::LayoutConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Default name of the configuration file
pub const CONFIG_FILE_NAME: &str = "closeflow.yaml";

/// Default bound on concurrent single-node position writes
pub const DEFAULT_MAX_IN_FLIGHT_POSITIONS: usize = 4;

/// What the controller does with local state when a write fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsistencyPolicy {
    /// Restore the node's pre-edit value, unless a later local edit has
    /// already replaced it
    #[default]
    RollbackOnFailure,

    /// Keep the optimistic value and mark the node divergent until the next
    /// refetch
    Optimistic,
}

/// Settings for the mutation and sync controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SyncConfig {
    /// Failure handling strategy
    pub consistency: ConsistencyPolicy,

    /// Bound on concurrent position writes when the store cannot batch them
    pub max_in_flight_positions: usize,

    /// Rebuild the graph from the store after every committed dependency write
    pub refetch_after_commit: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            consistency: ConsistencyPolicy::default(),
            max_in_flight_positions: DEFAULT_MAX_IN_FLIGHT_POSITIONS,
            refetch_after_commit: true,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Layout engine settings
    pub layout: LayoutConfig,

    /// Controller settings
    pub sync: SyncConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file and validate it.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded engine configuration");
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Check values serde cannot rule out.
    pub fn validate(&self) -> Result<()> {
        let layout = &self.layout;
        let finite_positive = |value: f64| value.is_finite() && value > 0.0;

        if !finite_positive(layout.spacing.between_ranks) {
            return Err(Error::Config(format!(
                "between-ranks spacing must be positive, got {}",
                layout.spacing.between_ranks
            )));
        }
        if !layout.spacing.within_rank.is_finite() || layout.spacing.within_rank < 0.0 {
            return Err(Error::Config(format!(
                "within-rank spacing must not be negative, got {}",
                layout.spacing.within_rank
            )));
        }
        if !finite_positive(layout.node_box.width) || !finite_positive(layout.node_box.height) {
            return Err(Error::Config(format!(
                "node box must have a positive size, got {}x{}",
                layout.node_box.width, layout.node_box.height
            )));
        }
        if !layout.margin.is_finite() {
            return Err(Error::Config("margin must be finite".to_string()));
        }
        if self.sync.max_in_flight_positions == 0 {
            return Err(Error::Config(
                "max-in-flight-positions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
