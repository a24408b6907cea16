//! Online search engines.
//!
//! [`SearchEngine`] answers a query with suggestions drawn from its provider
//! layers and the backend, then resolves selected suggestions to results. Each
//! request runs as one worker task racing the returned [`AsyncTask`]'s
//! cancellation; cancelling drops the in-flight backend future.

mod category;
mod select;

use std::future::Future;
use std::sync::Arc;

use waymark_worker::{Executor, IdClock, TaskClass};

pub use self::category::CategorySearchEngine;
use self::select::Resolver;
use crate::backend::SearchBackend;
use crate::config::EngineSettings;
use crate::error::{Result, SearchError};
use crate::layer::{LayerHost, LayerSet};
use crate::record::IndexRecord;
use crate::task::AsyncTask;
use crate::types::{
	CategoryOptions, ReverseGeoOptions, SearchOptions, SearchResponse, SearchResult, Suggestion, SuggestionKind,
};

/// Two-phase search engine over a [`SearchBackend`] and registered provider layers.
pub struct SearchEngine {
	settings: EngineSettings,
	backend: Arc<dyn SearchBackend>,
	layers: Arc<LayerSet>,
	requests: IdClock,
}

impl std::fmt::Debug for SearchEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SearchEngine")
			.field("api_type", &self.settings.api_type)
			.field("layers", &self.layers.len())
			.finish_non_exhaustive()
	}
}

impl SearchEngine {
	pub fn new(settings: EngineSettings, backend: Arc<dyn SearchBackend>) -> Self {
		Self {
			settings,
			backend,
			layers: LayerSet::new(),
			requests: IdClock::new(),
		}
	}

	pub fn settings(&self) -> &EngineSettings {
		&self.settings
	}

	/// Layers of the providers registered with this engine.
	pub fn layers(&self) -> &Arc<LayerSet> {
		&self.layers
	}

	/// Phase one. Delivers [`SearchResponse::Suggestions`]: matching provider
	/// records first, by provider priority, then backend suggestions.
	pub fn search<F>(&self, query: impl Into<String>, options: SearchOptions, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<SearchResponse>) + Send + 'static,
	{
		let limit = match self.limit(options.limit) {
			Ok(limit) => limit,
			Err(err) => return AsyncTask::completed_with(&executor, callback, Err(err)),
		};
		let query = query.into();
		let request = self.requests.next();
		let backend = Arc::clone(&self.backend);
		let layers = self.layers.snapshot();
		tracing::debug!(request, layers = layers.len(), limit, "search.engine.search");

		run_request("search", request, executor, callback, async move {
			let mut suggestions: Vec<Suggestion> = layers
				.iter()
				.flat_map(|pl| pl.layer.lookup(&query, limit).into_iter().map(move |record| record_suggestion(&pl.provider, record)))
				.collect();
			suggestions.extend(backend.suggest(&query, &options).await?);
			suggestions.truncate(limit);
			Ok(SearchResponse::Suggestions(suggestions))
		})
	}

	/// Phase two for one suggestion. Delivers [`SearchResponse::Result`].
	///
	/// Suggestions carrying their result, and suggestions pointing at mirrored
	/// provider records, complete immediately without a backend call.
	pub fn select<F>(&self, suggestion: Suggestion, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<SearchResponse>) + Send + 'static,
	{
		let resolver = self.resolver();
		let request = self.requests.next();
		if let Some(resolved) = resolver.resolve_local(&suggestion) {
			tracing::debug!(request, id = %suggestion.id, "search.engine.select_local");
			let response = resolved.map(|result| SearchResponse::Result { suggestion, result });
			return AsyncTask::completed_with(&executor, callback, response);
		}

		tracing::debug!(request, id = %suggestion.id, "search.engine.select");
		run_request("select", request, executor, callback, async move {
			let result = resolver.resolve(&suggestion).await?;
			Ok(SearchResponse::Result { suggestion, result })
		})
	}

	/// Phase two for many suggestions. Delivers one [`SearchResponse::Batch`]
	/// paired in input order once every member resolved; the first failure
	/// fails the batch and aborts the remaining members.
	pub fn select_batch<F>(&self, suggestions: Vec<Suggestion>, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<SearchResponse>) + Send + 'static,
	{
		let resolver = self.resolver();
		let request = self.requests.next();
		if suggestions.iter().all(Suggestion::is_terminal) {
			tracing::debug!(request, count = suggestions.len(), "search.engine.select_batch_local");
			let batch = suggestions
				.into_iter()
				.map(|suggestion| match resolver.resolve_local(&suggestion) {
					Some(resolved) => resolved.map(|result| (suggestion, result)),
					None => Err(SearchError::InvalidArgument(format!("suggestion '{}' is not terminal", suggestion.id))),
				})
				.collect::<Result<Vec<_>>>()
				.map(SearchResponse::Batch);
			return AsyncTask::completed_with(&executor, callback, batch);
		}

		tracing::debug!(request, count = suggestions.len(), "search.engine.select_batch");
		run_request("select_batch", request, executor, callback, async move {
			resolver.resolve_batch(suggestions).await.map(SearchResponse::Batch)
		})
	}

	/// Single-phase category search. Delivers [`SearchResponse::Results`]:
	/// provider records tagged with `category` first, then backend results.
	pub fn category_search<F>(&self, category: impl Into<String>, options: CategoryOptions, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<SearchResponse>) + Send + 'static,
	{
		let limit = match self.limit(options.limit) {
			Ok(limit) => limit,
			Err(err) => return AsyncTask::completed_with(&executor, callback, Err(err)),
		};
		let category = category.into();
		let request = self.requests.next();
		let backend = Arc::clone(&self.backend);
		let layers = self.layers.snapshot();
		tracing::debug!(request, category = %category, limit, "search.engine.category");

		run_request("category", request, executor, callback, async move {
			let mut results: Vec<SearchResult> = layers
				.iter()
				.flat_map(|pl| pl.layer.by_category(&category, limit).into_iter().map(move |record| record.to_result(&pl.provider)))
				.collect();
			results.extend(backend.category(&category, &options).await?);
			results.truncate(limit);
			Ok(SearchResponse::Results(results))
		})
	}

	/// Single-phase reverse geocoding. Delivers [`SearchResponse::Results`].
	pub fn reverse_geocoding<F>(&self, options: ReverseGeoOptions, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<SearchResponse>) + Send + 'static,
	{
		let limit = match self.limit(options.limit) {
			Ok(limit) => limit,
			Err(err) => return AsyncTask::completed_with(&executor, callback, Err(err)),
		};
		let request = self.requests.next();
		let backend = Arc::clone(&self.backend);
		tracing::debug!(request, lon = options.center.lon, lat = options.center.lat, "search.engine.reverse");

		run_request("reverse", request, executor, callback, async move {
			let mut results = backend.reverse(&options).await?;
			results.truncate(limit);
			Ok(SearchResponse::Results(results))
		})
	}

	fn limit(&self, requested: Option<usize>) -> Result<usize> {
		match requested {
			Some(0) => Err(SearchError::InvalidArgument("limit must be greater than zero".to_string())),
			Some(limit) => Ok(limit),
			None => Ok(self.settings.default_limit),
		}
	}

	fn resolver(&self) -> Resolver {
		Resolver::new(Arc::clone(&self.backend), Arc::clone(&self.layers))
	}
}

impl LayerHost for SearchEngine {
	fn layer_set(&self) -> Arc<LayerSet> {
		Arc::clone(&self.layers)
	}
}

fn record_suggestion(provider: &str, record: IndexRecord) -> Suggestion {
	Suggestion {
		description: record.address.as_ref().and_then(|a| a.formatted()),
		kind: SuggestionKind::Record {
			provider: provider.to_string(),
			record_id: record.id.clone(),
		},
		id: record.id,
		name: record.name,
	}
}

/// Runs `fut` as a request task and delivers its outcome unless the returned
/// task is cancelled first.
pub(crate) fn run_request<T, C, Fut>(op: &'static str, request: u64, executor: Executor, callback: C, fut: Fut) -> AsyncTask
where
	T: Send + 'static,
	C: FnOnce(Result<T>) + Send + 'static,
	Fut: Future<Output = Result<T>> + Send + 'static,
{
	let task = AsyncTask::new();
	let job = task.clone();
	waymark_worker::spawn(TaskClass::Request, async move {
		let outcome = tokio::select! {
			biased;
			_ = job.cancelled() => {
				tracing::debug!(request, op, "search.engine.request_cancelled");
				return;
			}
			outcome = fut => outcome,
		};
		finish(op, request, &job, &executor, callback, outcome);
	});
	task
}

/// Delivers a request outcome. A backend-side cancellation is still reported
/// to the callback, and leaves the task cancelled.
pub(crate) fn finish<T, C>(op: &'static str, request: u64, task: &AsyncTask, executor: &Executor, callback: C, outcome: Result<T>)
where
	T: Send + 'static,
	C: FnOnce(Result<T>) + Send + 'static,
{
	match outcome {
		Err(err) if err.is_cancellation() => {
			tracing::debug!(request, op, "search.engine.backend_cancelled");
			task.deliver_cancelled(executor, callback, err);
		}
		Err(err) => {
			tracing::warn!(request, op, error = %err, "search.engine.request_failed");
			task.deliver(executor, callback, Err(err));
		}
		Ok(value) => {
			tracing::trace!(request, op, "search.engine.deliver");
			task.deliver(executor, callback, Ok(value));
		}
	}
}
