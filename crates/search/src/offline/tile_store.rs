use thiserror::Error;

/// Failure reported by the tile store while loading a region.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TileStoreError {
	#[error("network error: {0}")]
	Network(String),
	#[error("storage error: {0}")]
	Storage(String),
	#[error("unknown tileset: {0}")]
	UnknownTileset(String),
	#[error("load cancelled")]
	Cancelled,
}

/// Download progress of a region, in tile resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadProgress {
	pub completed: u64,
	pub required: u64,
}

impl LoadProgress {
	/// Completed share in `0.0..=1.0`. Zero while the total is unknown.
	pub fn fraction(&self) -> f64 {
		if self.required == 0 {
			0.0
		} else {
			(self.completed.min(self.required) as f64) / (self.required as f64)
		}
	}
}

/// Tileset a region load targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionLoadOptions {
	pub dataset: String,
	/// Latest when unset.
	pub version: Option<String>,
}

/// Receives progress updates for one load.
pub type ProgressSink = Box<dyn Fn(LoadProgress) + Send + Sync + 'static>;

/// Receives the final outcome of one load. Called at most once.
pub type CompletionSink = Box<dyn FnOnce(Result<(), TileStoreError>) + Send + 'static>;

/// Handle to an in-flight tile-store operation.
pub trait Cancelable: Send + Sync + 'static {
	fn cancel(&self);
}

/// Downloads tile regions for the native index.
///
/// Sinks may be invoked on any thread, including synchronously from within
/// `load_region`.
pub trait TileStore: Send + Sync + 'static {
	fn load_region(&self, region_id: &str, options: &RegionLoadOptions, progress: ProgressSink, done: CompletionSink) -> Box<dyn Cancelable>;
}
