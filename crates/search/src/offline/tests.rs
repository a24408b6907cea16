use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use waymark_worker::Executor;

use super::*;
use crate::backend::OfflineBackend;
use crate::config::OfflineSettings;
use crate::error::{BackendError, SearchError};
use crate::test_support::{assert_suppressed, capture, recv};
use crate::types::{CategoryOptions, Point, ResultType, ReverseGeoOptions, SearchOptions, SearchResponse, SearchResult};

struct Flag(Arc<AtomicBool>);

impl Cancelable for Flag {
	fn cancel(&self) {
		self.0.store(true, Ordering::SeqCst);
	}
}

struct PendingLoad {
	region: String,
	progress: ProgressSink,
	done: Option<CompletionSink>,
	cancelled: Arc<AtomicBool>,
}

/// Tile store that parks every load until the test completes it.
#[derive(Default)]
struct MockTileStore {
	loads: Mutex<Vec<PendingLoad>>,
}

impl MockTileStore {
	fn progress(&self, index: usize, completed: u64, required: u64) {
		let loads = self.loads.lock();
		(loads[index].progress)(LoadProgress { completed, required });
	}

	fn finish(&self, index: usize, outcome: Result<(), TileStoreError>) {
		let done = self.loads.lock()[index].done.take();
		if let Some(done) = done {
			done(outcome);
		}
	}

	fn cancelled(&self, index: usize) -> bool {
		self.loads.lock()[index].cancelled.load(Ordering::SeqCst)
	}

	fn region(&self, index: usize) -> String {
		self.loads.lock()[index].region.clone()
	}
}

impl TileStore for MockTileStore {
	fn load_region(&self, region_id: &str, _options: &RegionLoadOptions, progress: ProgressSink, done: CompletionSink) -> Box<dyn Cancelable> {
		let cancelled = Arc::new(AtomicBool::new(false));
		self.loads.lock().push(PendingLoad {
			region: region_id.to_string(),
			progress,
			done: Some(done),
			cancelled: Arc::clone(&cancelled),
		});
		Box::new(Flag(cancelled))
	}
}

#[derive(Default)]
struct MockOfflineBackend {
	calls: AtomicUsize,
}

#[async_trait]
impl OfflineBackend for MockOfflineBackend {
	async fn search(&self, query: &str, _options: &SearchOptions) -> Result<Vec<SearchResult>, BackendError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		Ok(vec![SearchResult::new("off.1", query, ResultType::Poi)])
	}

	async fn reverse(&self, options: &ReverseGeoOptions) -> Result<Vec<SearchResult>, BackendError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		Ok(vec![SearchResult::new("off.addr", "Here", ResultType::Address).with_coordinate(options.center)])
	}

	async fn category(&self, category: &str, _options: &CategoryOptions) -> Result<Vec<SearchResult>, BackendError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		Ok(vec![SearchResult::new("off.cat", category, ResultType::Poi)])
	}
}

fn event(kind: IndexChangeKind, region: &str) -> IndexChangeEvent {
	IndexChangeEvent {
		kind,
		region_id: region.to_string(),
		dataset: "mbx-main".to_string(),
		version: "2024-01".to_string(),
	}
}

fn setup() -> (OfflineSearchEngine, Arc<MockTileStore>, Arc<MockOfflineBackend>) {
	let store = Arc::new(MockTileStore::default());
	let backend = Arc::new(MockOfflineBackend::default());
	let engine = OfflineSearchEngine::new(OfflineSettings::default(), backend.clone(), store.clone());
	(engine, store, backend)
}

#[tokio::test]
async fn search_before_readiness_fails_fast() {
	let (engine, _store, backend) = setup();

	let (cb, rx) = capture();
	let task = engine.search("Cafe", SearchOptions::default(), Executor::Inline, cb);
	assert!(task.is_done());
	assert_eq!(recv(rx).await, Err(SearchError::NotReady { region: None }));

	engine.load_region("berlin", Executor::Inline, |_| {});
	let (cb, rx) = capture();
	engine.search("Cafe", SearchOptions::default(), Executor::Inline, cb);
	assert_eq!(
		recv(rx).await,
		Err(SearchError::NotReady {
			region: Some("berlin".to_string())
		})
	);
	assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn matching_update_makes_search_reach_the_backend() {
	let (engine, _store, backend) = setup();
	let (load_cb, load_rx) = capture();
	engine.load_region("berlin", Executor::Inline, load_cb);

	engine.coordinator().handle_index_event(event(IndexChangeKind::Update, "berlin"));
	assert_eq!(recv(load_rx).await, Ok(()));

	let (cb, rx) = capture();
	engine.search("Cafe", SearchOptions::default(), Executor::Inline, cb);
	let SearchResponse::Results(results) = recv(rx).await.expect("search") else {
		panic!("expected results");
	};
	assert_eq!(results[0].name, "Cafe");
	assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn events_for_other_regions_are_ignored() {
	let (engine, _store, _backend) = setup();
	let coordinator = engine.coordinator();
	engine.load_region("berlin", Executor::Inline, |_| {});

	coordinator.handle_index_event(event(IndexChangeKind::Add, "paris"));
	assert!(coordinator.region_state("berlin").is_loading());
	assert_eq!(coordinator.region_state("paris"), RegionState::Unloaded);

	// Wrong dataset.
	let mut foreign = event(IndexChangeKind::Add, "berlin");
	foreign.dataset = "other".into();
	coordinator.handle_index_event(foreign);
	assert!(!coordinator.is_ready("berlin"));

	coordinator.handle_index_event(event(IndexChangeKind::Add, "berlin"));
	assert!(coordinator.is_ready("berlin"));
}

#[tokio::test]
async fn remove_returns_ready_region_to_unloaded() {
	let (engine, _store, _backend) = setup();
	let coordinator = engine.coordinator();
	engine.load_region("berlin", Executor::Inline, |_| {});

	// Remove while loading does nothing.
	coordinator.handle_index_event(event(IndexChangeKind::Remove, "berlin"));
	assert!(coordinator.region_state("berlin").is_loading());

	coordinator.handle_index_event(event(IndexChangeKind::Add, "berlin"));
	coordinator.handle_index_event(event(IndexChangeKind::Remove, "berlin"));
	assert_eq!(coordinator.region_state("berlin"), RegionState::Unloaded);

	let (cb, rx) = capture();
	engine.search("Cafe", SearchOptions::default(), Executor::Inline, cb);
	assert!(matches!(recv(rx).await, Err(SearchError::NotReady { .. })));
}

#[tokio::test]
async fn cancelling_a_load_cancels_download_and_fails_region() {
	let (engine, store, _backend) = setup();
	let (cb, rx) = capture::<()>();
	let task = engine.load_region("berlin", Executor::Inline, cb);

	task.cancel();
	assert!(store.cancelled(0));
	assert_eq!(
		engine.coordinator().region_state("berlin"),
		RegionState::Failed {
			reason: "cancelled".to_string()
		}
	);
	assert_suppressed(rx).await;

	// A late event for the cancelled load changes nothing.
	engine.coordinator().handle_index_event(event(IndexChangeKind::Add, "berlin"));
	assert!(!engine.coordinator().is_ready("berlin"));
}

#[tokio::test]
async fn download_failure_fails_the_load() {
	let (engine, store, _backend) = setup();
	let (cb, rx) = capture();
	engine.load_region("berlin", Executor::Inline, cb);

	store.finish(0, Err(TileStoreError::Network("offline".into())));
	let err = recv(rx).await.expect_err("load should fail");
	assert_eq!(
		err,
		SearchError::RegionLoad {
			region: "berlin".to_string(),
			reason: "network error: offline".to_string()
		}
	);
	assert!(matches!(engine.coordinator().region_state("berlin"), RegionState::Failed { .. }));
}

#[tokio::test]
async fn newer_load_supersedes_the_previous_one() {
	let (engine, store, _backend) = setup();
	let (first_cb, first_rx) = capture();
	engine.load_region("berlin", Executor::Inline, first_cb);
	let (second_cb, second_rx) = capture();
	engine.load_region("paris", Executor::Inline, second_cb);

	assert_eq!(store.region(1), "paris");
	assert_eq!(engine.coordinator().active_region().as_deref(), Some("paris"));

	// Completing the old download must not affect the new load.
	store.finish(0, Ok(()));
	engine.coordinator().handle_index_event(event(IndexChangeKind::Add, "paris"));
	assert_eq!(recv(second_rx).await, Ok(()));

	// "berlin" is still loading but is no longer the active region.
	engine.coordinator().handle_index_event(event(IndexChangeKind::Add, "berlin"));
	assert_eq!(recv(first_rx).await, Ok(()));
	assert_eq!(engine.coordinator().active_region().as_deref(), Some("paris"));

	// Reloading the same region supersedes its pending waiter.
	let (cb, rx) = capture();
	engine.load_region("rome", Executor::Inline, cb);
	engine.load_region("rome", Executor::Inline, |_| {});
	assert!(store.cancelled(2));
	assert!(matches!(recv(rx).await, Err(SearchError::RegionLoad { .. })));
}

#[tokio::test]
async fn progress_is_published_to_watchers() {
	let (engine, store, _backend) = setup();
	let coordinator = engine.coordinator();
	engine.load_region("berlin", Executor::Inline, |_| {});
	let mut watcher = coordinator.subscribe("berlin");
	assert!(matches!(*watcher.borrow_and_update(), RegionState::Loading { .. }));

	store.progress(0, 3, 4);
	assert!(watcher.has_changed().unwrap_or(false));
	let RegionState::Loading { progress } = watcher.borrow_and_update().clone() else {
		panic!("expected loading");
	};
	assert_eq!(progress.fraction(), 0.75);

	coordinator.handle_index_event(event(IndexChangeKind::Update, "berlin"));
	assert_eq!(*watcher.borrow_and_update(), RegionState::Ready);
}

#[tokio::test]
async fn watching_an_unknown_region_does_not_track_it() {
	let (engine, _store, _backend) = setup();
	let coordinator = engine.coordinator();
	for n in 0..64 {
		let watcher = coordinator.subscribe(&format!("nowhere-{n}"));
		assert_eq!(*watcher.borrow(), RegionState::Unloaded);
	}
	assert!(coordinator.regions().is_empty());
	assert_eq!(coordinator.region_state("nowhere-0"), RegionState::Unloaded);

	engine.load_region("berlin", Executor::Inline, |_| {});
	assert_eq!(coordinator.regions(), vec!["berlin"]);
}

#[tokio::test]
async fn late_ready_callbacks_are_replayed() {
	let (engine, _store, _backend) = setup();
	let coordinator = engine.coordinator();
	let fired = Arc::new(AtomicUsize::new(0));

	let early = Arc::clone(&fired);
	coordinator.add_engine_ready_callback(Executor::Inline, move || {
		early.fetch_add(1, Ordering::SeqCst);
	});
	engine.load_region("berlin", Executor::Inline, |_| {});
	assert_eq!(fired.load(Ordering::SeqCst), 0);

	coordinator.handle_index_event(event(IndexChangeKind::Add, "berlin"));
	assert_eq!(fired.load(Ordering::SeqCst), 1);

	let late = Arc::clone(&fired);
	coordinator.add_engine_ready_callback(Executor::Inline, move || {
		late.fetch_add(1, Ordering::SeqCst);
	});
	assert_eq!(fired.load(Ordering::SeqCst), 2);

	// Late watch subscribers start at the current state.
	assert_eq!(*coordinator.subscribe("berlin").borrow(), RegionState::Ready);
}

#[tokio::test]
async fn index_events_and_errors_are_broadcast() {
	let (engine, _store, _backend) = setup();
	let coordinator = engine.coordinator();
	let mut changes = coordinator.subscribe_changes();
	let mut errors = coordinator.subscribe_errors();

	coordinator.handle_index_event(event(IndexChangeKind::Add, "nowhere"));
	assert_eq!(changes.recv().await.map(|e| e.region_id).ok().as_deref(), Some("nowhere"));

	coordinator.handle_index_error(IndexErrorEvent {
		region_id: "berlin".into(),
		dataset: "mbx-main".into(),
		version: "2024-01".into(),
		tile: Some("14/8800/5373".into()),
		message: "corrupt tile".into(),
	});
	assert_eq!(errors.recv().await.map(|e| e.message).ok().as_deref(), Some("corrupt tile"));
}

#[tokio::test]
async fn selected_tileset_filters_versions() {
	let (engine, _store, _backend) = setup();
	engine.select_tileset("mbx-main", Some("2025-06".to_string()));
	assert_eq!(engine.settings().version.as_deref(), Some("2025-06"));

	engine.load_region("berlin", Executor::Inline, |_| {});
	engine.coordinator().handle_index_event(event(IndexChangeKind::Add, "berlin"));
	assert!(!engine.coordinator().is_ready("berlin"));

	let mut current = event(IndexChangeKind::Add, "berlin");
	current.version = "2025-06".into();
	engine.coordinator().handle_index_event(current);
	assert!(engine.coordinator().is_ready("berlin"));
}

#[tokio::test]
async fn reverse_and_category_are_gated_too() {
	let (engine, _store, backend) = setup();
	let (cb, rx) = capture();
	engine.reverse_geocoding(ReverseGeoOptions::new(Point::new(2.35, 48.85)), Executor::Inline, cb);
	assert!(matches!(recv(rx).await, Err(SearchError::NotReady { .. })));

	engine.load_region("paris", Executor::Inline, |_| {});
	engine.coordinator().handle_index_event(event(IndexChangeKind::Add, "paris"));

	let (cb, rx) = capture();
	engine.category_search("cafe", CategoryOptions::default(), Executor::Inline, cb);
	assert!(matches!(recv(rx).await, Ok(SearchResponse::Results(r)) if r[0].id == "off.cat"));
	let (cb, rx) = capture();
	engine.reverse_geocoding(ReverseGeoOptions::new(Point::new(2.35, 48.85)), Executor::Inline, cb);
	assert!(matches!(recv(rx).await, Ok(SearchResponse::Results(r)) if r[0].id == "off.addr"));
	assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
}
