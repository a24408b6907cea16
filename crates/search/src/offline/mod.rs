//! Offline search gated on tile-region readiness.
//!
//! The [`OfflineIndexCoordinator`] drives each region through
//! `Unloaded -> Loading -> {Ready, Failed}`. A region becomes ready only when
//! the native index reports an add or update for it after a load request;
//! until then the [`OfflineSearchEngine`] answers every request with
//! [`crate::SearchError::NotReady`].

mod coordinator;
mod engine;
mod tile_store;

use serde::{Deserialize, Serialize};

pub use self::coordinator::OfflineIndexCoordinator;
pub use self::engine::OfflineSearchEngine;
pub use self::tile_store::{Cancelable, CompletionSink, LoadProgress, ProgressSink, RegionLoadOptions, TileStore, TileStoreError};

/// What changed in the offline index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexChangeKind {
	Add,
	Update,
	Remove,
}

/// Notification from the native index that a region's data changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexChangeEvent {
	pub kind: IndexChangeKind,
	pub region_id: String,
	pub dataset: String,
	pub version: String,
}

/// Notification that the native index failed to ingest a tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexErrorEvent {
	pub region_id: String,
	pub dataset: String,
	pub version: String,
	pub tile: Option<String>,
	pub message: String,
}

/// Readiness of one tile region.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RegionState {
	#[default]
	Unloaded,
	Loading {
		progress: LoadProgress,
	},
	Ready,
	Failed {
		reason: String,
	},
}

impl RegionState {
	pub fn is_ready(&self) -> bool {
		matches!(self, Self::Ready)
	}

	pub fn is_loading(&self) -> bool {
		matches!(self, Self::Loading { .. })
	}
}

#[cfg(test)]
mod tests;
