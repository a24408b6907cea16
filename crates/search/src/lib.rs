//! Search orchestration core.
//!
//! This crate coordinates asynchronous search work around opaque backends:
//! * [`AsyncTask`]: cancellable handle with at-most-once callback delivery.
//! * [`IndexableDataProvider`]: record collection mirrored into [`EngineLayer`]s.
//! * [`SearchEngine`] / [`CategorySearchEngine`]: two-phase suggestion → result
//!   resolution, batch selection, category and reverse-geocoding requests.
//! * [`OfflineIndexCoordinator`] / [`OfflineSearchEngine`]: tile-region readiness
//!   gating for on-device search.
//! * [`DataProviderRegistry`]: brokers provider registration against engines.
//!
//! Every request takes an explicit [`Executor`] naming where its callback runs;
//! [`Executor::Inline`] is the default.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod layer;
pub mod offline;
pub mod provider;
pub mod record;
pub mod registry;
pub mod task;
pub mod types;

#[cfg(test)]
mod test_support;

pub use backend::{OfflineBackend, SearchBackend};
pub use config::{ApiType, EngineSettings, OfflineSettings, ProviderSettings, Settings};
pub use engine::{CategorySearchEngine, SearchEngine};
pub use error::{BackendError, ConfigError, Result, SearchError};
pub use layer::{EngineLayer, LayerHost, LayerSet, MemoryLayer, ProviderLayer};
pub use offline::{
	Cancelable, IndexChangeEvent, IndexChangeKind, IndexErrorEvent, LoadProgress, OfflineIndexCoordinator, OfflineSearchEngine,
	RegionLoadOptions, RegionState, TileStore, TileStoreError,
};
pub use provider::{DataProvider, IndexableDataProvider, ListenerId};
pub use record::{IndexRecord, IndexableRecord};
pub use registry::DataProviderRegistry;
pub use task::{AsyncTask, Callback, TaskState};
pub use types::{
	Address, CategoryOptions, Point, ResultType, ReverseGeoOptions, SearchOptions, SearchResponse, SearchResult, Suggestion,
	SuggestionKind,
};
pub use waymark_worker::{Executor, TaskClass};
