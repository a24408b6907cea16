#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use waymark_search::{
	BackendError, Cancelable, CategoryOptions, OfflineBackend, RegionLoadOptions, ResultType, ReverseGeoOptions, SearchBackend,
	SearchOptions, SearchResult, Suggestion, SuggestionKind, TileStore,
};
use waymark_search::offline::{CompletionSink, ProgressSink};

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn capture<T: Send + 'static>() -> (impl FnOnce(waymark_search::Result<T>) + Send + 'static, oneshot::Receiver<waymark_search::Result<T>>) {
	let (tx, rx) = oneshot::channel();
	(
		move |res| {
			let _ = tx.send(res);
		},
		rx,
	)
}

pub async fn recv<T>(rx: oneshot::Receiver<waymark_search::Result<T>>) -> waymark_search::Result<T> {
	tokio::time::timeout(Duration::from_secs(5), rx)
		.await
		.expect("callback timed out")
		.expect("callback dropped")
}

/// Geocoding backend with a fixed catalogue of places.
#[derive(Default)]
pub struct CatalogueBackend {
	pub calls: AtomicUsize,
}

impl CatalogueBackend {
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl SearchBackend for CatalogueBackend {
	async fn suggest(&self, query: &str, _options: &SearchOptions) -> Result<Vec<Suggestion>, BackendError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		let query = query.to_lowercase();
		Ok(["Cafe Central", "Cafe Sperl", "Museum Quarter"]
			.iter()
			.enumerate()
			.filter(|(_, name)| name.to_lowercase().contains(&query))
			.map(|(i, name)| Suggestion::remote(format!("remote.{i}"), *name, ResultType::Poi, format!("handle.{i}")))
			.collect())
	}

	async fn retrieve(&self, suggestion: &Suggestion) -> Result<SearchResult, BackendError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		match &suggestion.kind {
			SuggestionKind::Remote { handle, result_type } if handle != "handle.broken" => {
				Ok(SearchResult::new(suggestion.id.clone(), suggestion.name.clone(), *result_type))
			}
			_ => Err(BackendError::Http {
				status: 404,
				message: format!("no result for {}", suggestion.id),
			}),
		}
	}

	async fn category(&self, category: &str, _options: &CategoryOptions) -> Result<Vec<SearchResult>, BackendError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		Ok(vec![SearchResult::new("remote.cat", format!("Remote {category}"), ResultType::Poi)])
	}

	async fn reverse(&self, _options: &ReverseGeoOptions) -> Result<Vec<SearchResult>, BackendError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		Ok(Vec::new())
	}
}

/// Offline index echoing the query back as a single result.
#[derive(Default)]
pub struct EchoOfflineBackend {
	pub calls: AtomicUsize,
}

#[async_trait]
impl OfflineBackend for EchoOfflineBackend {
	async fn search(&self, query: &str, _options: &SearchOptions) -> Result<Vec<SearchResult>, BackendError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		Ok(vec![SearchResult::new("offline.1", query, ResultType::Poi)])
	}

	async fn reverse(&self, _options: &ReverseGeoOptions) -> Result<Vec<SearchResult>, BackendError> {
		Ok(Vec::new())
	}

	async fn category(&self, _category: &str, _options: &CategoryOptions) -> Result<Vec<SearchResult>, BackendError> {
		Ok(Vec::new())
	}
}

/// Tile store whose downloads succeed immediately.
#[derive(Default)]
pub struct InstantTileStore {
	pub cancelled: Arc<AtomicBool>,
}

struct CancelFlag(Arc<AtomicBool>);

impl Cancelable for CancelFlag {
	fn cancel(&self) {
		self.0.store(true, Ordering::SeqCst);
	}
}

impl TileStore for InstantTileStore {
	fn load_region(&self, _region_id: &str, _options: &RegionLoadOptions, progress: ProgressSink, done: CompletionSink) -> Box<dyn Cancelable> {
		progress(waymark_search::LoadProgress { completed: 1, required: 1 });
		done(Ok(()));
		Box::new(CancelFlag(Arc::clone(&self.cancelled)))
	}
}
