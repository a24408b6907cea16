use std::sync::Arc;

use parking_lot::RwLock;
use waymark_worker::{Executor, IdClock};

use super::coordinator::OfflineIndexCoordinator;
use super::tile_store::{RegionLoadOptions, TileStore};
use crate::backend::OfflineBackend;
use crate::config::OfflineSettings;
use crate::engine::run_request;
use crate::error::{Result, SearchError};
use crate::task::AsyncTask;
use crate::types::{CategoryOptions, ReverseGeoOptions, SearchOptions, SearchResponse};

/// Single-phase search over the on-device index.
///
/// Requests issued while the active region is not ready fail fast with
/// [`SearchError::NotReady`] and never reach the backend.
pub struct OfflineSearchEngine {
	settings: RwLock<OfflineSettings>,
	backend: Arc<dyn OfflineBackend>,
	coordinator: Arc<OfflineIndexCoordinator>,
	requests: IdClock,
}

impl std::fmt::Debug for OfflineSearchEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("OfflineSearchEngine")
			.field("settings", &*self.settings.read())
			.field("coordinator", &self.coordinator)
			.finish_non_exhaustive()
	}
}

impl OfflineSearchEngine {
	pub fn new(settings: OfflineSettings, backend: Arc<dyn OfflineBackend>, tile_store: Arc<dyn TileStore>) -> Self {
		let coordinator = Arc::new(OfflineIndexCoordinator::new(tile_store));
		coordinator.select_tileset(settings.dataset.clone(), settings.version.clone());
		Self {
			settings: RwLock::new(settings),
			backend,
			coordinator,
			requests: IdClock::new(),
		}
	}

	/// Coordinator receiving index events for this engine.
	pub fn coordinator(&self) -> &Arc<OfflineIndexCoordinator> {
		&self.coordinator
	}

	pub fn settings(&self) -> OfflineSettings {
		self.settings.read().clone()
	}

	/// Switches the tileset used for subsequent loads and index events.
	pub fn select_tileset(&self, dataset: impl Into<String>, version: Option<String>) {
		let dataset = dataset.into();
		{
			let mut settings = self.settings.write();
			settings.dataset = dataset.clone();
			settings.version = version.clone();
		}
		self.coordinator.select_tileset(dataset, version);
	}

	/// Loads `region` from the selected tileset and makes it the active region.
	pub fn load_region<F>(&self, region: impl Into<String>, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<()>) + Send + 'static,
	{
		let options = {
			let settings = self.settings.read();
			RegionLoadOptions {
				dataset: settings.dataset.clone(),
				version: settings.version.clone(),
			}
		};
		self.coordinator.load_region(region, options, executor, callback)
	}

	pub fn search<F>(&self, query: impl Into<String>, options: SearchOptions, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<SearchResponse>) + Send + 'static,
	{
		let limit = match self.gate(options.limit) {
			Ok(limit) => limit,
			Err(err) => return AsyncTask::completed_with(&executor, callback, Err(err)),
		};
		let query = query.into();
		let request = self.requests.next();
		let backend = Arc::clone(&self.backend);
		tracing::debug!(request, limit, "offline.engine.search");
		run_request("offline_search", request, executor, callback, async move {
			let mut results = backend.search(&query, &options).await?;
			results.truncate(limit);
			Ok(SearchResponse::Results(results))
		})
	}

	pub fn reverse_geocoding<F>(&self, options: ReverseGeoOptions, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<SearchResponse>) + Send + 'static,
	{
		let limit = match self.gate(options.limit) {
			Ok(limit) => limit,
			Err(err) => return AsyncTask::completed_with(&executor, callback, Err(err)),
		};
		let request = self.requests.next();
		let backend = Arc::clone(&self.backend);
		tracing::debug!(request, limit, "offline.engine.reverse");
		run_request("offline_reverse", request, executor, callback, async move {
			let mut results = backend.reverse(&options).await?;
			results.truncate(limit);
			Ok(SearchResponse::Results(results))
		})
	}

	pub fn category_search<F>(&self, category: impl Into<String>, options: CategoryOptions, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<SearchResponse>) + Send + 'static,
	{
		let limit = match self.gate(options.limit) {
			Ok(limit) => limit,
			Err(err) => return AsyncTask::completed_with(&executor, callback, Err(err)),
		};
		let category = category.into();
		let request = self.requests.next();
		let backend = Arc::clone(&self.backend);
		tracing::debug!(request, category = %category, limit, "offline.engine.category");
		run_request("offline_category", request, executor, callback, async move {
			let mut results = backend.category(&category, &options).await?;
			results.truncate(limit);
			Ok(SearchResponse::Results(results))
		})
	}

	/// Checks readiness and resolves the effective limit.
	fn gate(&self, requested: Option<usize>) -> Result<usize> {
		if let Err(region) = self.coordinator.ready_region() {
			tracing::debug!(region = ?region, "offline.engine.not_ready");
			return Err(SearchError::NotReady { region });
		}
		match requested {
			Some(0) => Err(SearchError::InvalidArgument("limit must be greater than zero".to_string())),
			Some(limit) => Ok(limit),
			None => Ok(self.settings.read().default_limit),
		}
	}
}
