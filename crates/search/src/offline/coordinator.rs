use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use waymark_worker::{Executor, IdClock};

use super::tile_store::{Cancelable, LoadProgress, RegionLoadOptions, TileStore, TileStoreError};
use super::{IndexChangeEvent, IndexChangeKind, IndexErrorEvent, RegionState};
use crate::error::{Result, SearchError};
use crate::task::{AsyncTask, Callback};

const EVENT_CAPACITY: usize = 64;

struct Waiter {
	task: AsyncTask,
	executor: Executor,
	callback: Callback<()>,
}

impl Waiter {
	fn deliver(self, outcome: Result<()>) {
		self.task.deliver(&self.executor, self.callback, outcome);
	}
}

type ReadyCallback = (Executor, Box<dyn FnOnce() + Send + 'static>);

struct RegionEntry {
	state: watch::Sender<RegionState>,
	/// Generation of the load that currently owns this region.
	generation: u64,
	load: Option<Box<dyn Cancelable>>,
	waiters: Vec<Waiter>,
}

impl RegionEntry {
	fn new() -> Self {
		let (state, _) = watch::channel(RegionState::Unloaded);
		Self {
			state,
			generation: 0,
			load: None,
			waiters: Vec::new(),
		}
	}

	fn current(&self) -> RegionState {
		self.state.borrow().clone()
	}
}

#[derive(Default)]
struct State {
	regions: HashMap<String, RegionEntry>,
	/// Region of the most recent load request.
	active: Option<String>,
	/// Tileset index events must match, once one is selected.
	tileset: Option<(String, Option<String>)>,
	ready_callbacks: Vec<ReadyCallback>,
}

struct Shared {
	state: Mutex<State>,
	changes: broadcast::Sender<IndexChangeEvent>,
	errors: broadcast::Sender<IndexErrorEvent>,
}

/// Side effects collected under the state lock and run after releasing it.
#[derive(Default)]
struct Effects {
	waiters: Vec<(Waiter, Result<()>)>,
	ready: Vec<ReadyCallback>,
	cancel: Option<Box<dyn Cancelable>>,
}

impl Effects {
	fn run(self) {
		if let Some(load) = self.cancel {
			load.cancel();
		}
		for (waiter, outcome) in self.waiters {
			waiter.deliver(outcome);
		}
		for (executor, callback) in self.ready {
			executor.execute(callback);
		}
	}
}

/// Tracks tile-region loads and the index events that make regions searchable.
///
/// Region state lives in one [`watch`] cell per region, so readers always see
/// the latest state and late subscribers start from it.
pub struct OfflineIndexCoordinator {
	tile_store: Arc<dyn TileStore>,
	shared: Arc<Shared>,
	generations: IdClock,
}

impl std::fmt::Debug for OfflineIndexCoordinator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.shared.state.lock();
		f.debug_struct("OfflineIndexCoordinator")
			.field("active", &state.active)
			.field("regions", &state.regions.len())
			.finish_non_exhaustive()
	}
}

impl OfflineIndexCoordinator {
	pub fn new(tile_store: Arc<dyn TileStore>) -> Self {
		let (changes, _) = broadcast::channel(EVENT_CAPACITY);
		let (errors, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			tile_store,
			shared: Arc::new(Shared {
				state: Mutex::new(State::default()),
				changes,
				errors,
			}),
			generations: IdClock::new(),
		}
	}

	/// Requests a tile download for `region` and makes it the active region.
	///
	/// `callback` receives `Ok(())` once the index reports the region ready,
	/// or [`SearchError::RegionLoad`] if the download fails or is superseded.
	/// Cancelling the returned task cancels the download and fails the region.
	pub fn load_region<F>(&self, region: impl Into<String>, options: RegionLoadOptions, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<()>) + Send + 'static,
	{
		let region = region.into();
		let generation = self.generations.next();
		let task = AsyncTask::new();

		let mut effects = Effects::default();
		{
			let mut state = self.shared.state.lock();
			state.active = Some(region.clone());
			let entry = state.regions.entry(region.clone()).or_insert_with(RegionEntry::new);
			if let Some(previous) = entry.load.take() {
				effects.cancel = Some(previous);
			}
			for waiter in entry.waiters.drain(..) {
				effects.waiters.push((waiter, Err(load_error(&region, "superseded by a newer load"))));
			}
			entry.generation = generation;
			entry.state.send_replace(RegionState::Loading {
				progress: LoadProgress::default(),
			});
			entry.waiters.push(Waiter {
				task: task.clone(),
				executor,
				callback: Box::new(callback),
			});
		}
		effects.run();
		tracing::debug!(region = %region, generation, dataset = %options.dataset, "offline.region.load");

		let progress = {
			let shared = Arc::downgrade(&self.shared);
			let region = region.clone();
			Box::new(move |progress: LoadProgress| on_progress(&shared, &region, generation, progress))
		};
		let done = {
			let shared = Arc::downgrade(&self.shared);
			let region = region.clone();
			Box::new(move |outcome: std::result::Result<(), TileStoreError>| on_download_done(&shared, &region, generation, outcome))
		};
		let handle = self.tile_store.load_region(&region, &options, progress, done);

		{
			let mut state = self.shared.state.lock();
			if let Some(entry) = state.regions.get_mut(&region)
				&& entry.generation == generation
				&& entry.current().is_loading()
			{
				entry.load = Some(handle);
			}
		}

		let shared = Arc::downgrade(&self.shared);
		task.on_cancel(move || {
			if let Some(shared) = shared.upgrade() {
				fail_region(&shared, &region, generation, "cancelled".to_string(), true);
			}
		});
		task
	}

	/// Applies an index change event, then broadcasts it.
	///
	/// `Add` and `Update` make a loading region ready; `Remove` returns a ready
	/// region to unloaded. Events for unknown regions, regions that are not in
	/// a matching state, or a tileset other than the selected one are ignored.
	pub fn handle_index_event(&self, event: IndexChangeEvent) {
		let mut effects = Effects::default();
		{
			let mut guard = self.shared.state.lock();
			let state = &mut *guard;
			let tileset_matches = match &state.tileset {
				Some((dataset, version)) => {
					event.dataset == *dataset && version.as_ref().is_none_or(|version| event.version == *version)
				}
				None => true,
			};
			let is_active = state.active.as_deref() == Some(event.region_id.as_str());
			match state.regions.get_mut(&event.region_id).filter(|_| tileset_matches) {
				None => {
					tracing::warn!(region = %event.region_id, kind = ?event.kind, "offline.event.ignored");
				}
				Some(entry) => match (event.kind, entry.current()) {
					(IndexChangeKind::Add | IndexChangeKind::Update, RegionState::Loading { .. }) => {
						entry.state.send_replace(RegionState::Ready);
						entry.load = None;
						for waiter in entry.waiters.drain(..) {
							effects.waiters.push((waiter, Ok(())));
						}
						tracing::debug!(region = %event.region_id, kind = ?event.kind, "offline.region.ready");
						if is_active {
							effects.ready = std::mem::take(&mut state.ready_callbacks);
						}
					}
					(IndexChangeKind::Remove, RegionState::Ready) => {
						entry.state.send_replace(RegionState::Unloaded);
						tracing::debug!(region = %event.region_id, "offline.region.unloaded");
					}
					(kind, current) => {
						tracing::trace!(region = %event.region_id, ?kind, ?current, "offline.event.no_transition");
					}
				},
			}
		}
		effects.run();
		let _ = self.shared.changes.send(event);
	}

	/// Broadcasts an index error. Region state is unaffected.
	pub fn handle_index_error(&self, event: IndexErrorEvent) {
		tracing::warn!(region = %event.region_id, tile = ?event.tile, message = %event.message, "offline.index.error");
		let _ = self.shared.errors.send(event);
	}

	/// Restricts index events to `dataset` (and `version`, when given).
	pub fn select_tileset(&self, dataset: impl Into<String>, version: Option<String>) {
		let dataset = dataset.into();
		tracing::debug!(dataset = %dataset, version = ?version, "offline.tileset.selected");
		self.shared.state.lock().tileset = Some((dataset, version));
	}

	pub fn region_state(&self, region: &str) -> RegionState {
		self.shared.state.lock().regions.get(region).map(RegionEntry::current).unwrap_or_default()
	}

	pub fn is_ready(&self, region: &str) -> bool {
		self.region_state(region).is_ready()
	}

	/// Region of the most recent load request.
	pub fn active_region(&self) -> Option<String> {
		self.shared.state.lock().active.clone()
	}

	/// The active region, if it is ready.
	pub fn ready_region(&self) -> std::result::Result<String, Option<String>> {
		let state = self.shared.state.lock();
		match &state.active {
			Some(region) if state.regions.get(region).is_some_and(|e| e.current().is_ready()) => Ok(region.clone()),
			other => Err(other.clone()),
		}
	}

	/// State cell for `region`. The receiver starts at the current state.
	///
	/// Only [`Self::load_region`] creates region entries. For a region that was
	/// never loaded the receiver is detached: it reads `Unloaded` and never
	/// observes a change, so subscribe after requesting the load.
	pub fn subscribe(&self, region: &str) -> watch::Receiver<RegionState> {
		match self.shared.state.lock().regions.get(region) {
			Some(entry) => entry.state.subscribe(),
			None => watch::channel(RegionState::default()).1,
		}
	}

	/// Regions that have been requested, sorted.
	pub fn regions(&self) -> Vec<String> {
		let mut regions: Vec<String> = self.shared.state.lock().regions.keys().cloned().collect();
		regions.sort();
		regions
	}

	/// Runs `callback` once the active region becomes ready, or right away if
	/// it already is.
	pub fn add_engine_ready_callback<F>(&self, executor: Executor, callback: F)
	where
		F: FnOnce() + Send + 'static,
	{
		let mut state = self.shared.state.lock();
		let ready = state
			.active
			.as_ref()
			.and_then(|region| state.regions.get(region))
			.is_some_and(|entry| entry.current().is_ready());
		if ready {
			drop(state);
			tracing::trace!("offline.ready_callback.replay");
			executor.execute(callback);
		} else {
			state.ready_callbacks.push((executor, Box::new(callback)));
		}
	}

	pub fn subscribe_changes(&self) -> broadcast::Receiver<IndexChangeEvent> {
		self.shared.changes.subscribe()
	}

	pub fn subscribe_errors(&self) -> broadcast::Receiver<IndexErrorEvent> {
		self.shared.errors.subscribe()
	}
}

fn load_error(region: &str, reason: impl Into<String>) -> SearchError {
	SearchError::RegionLoad {
		region: region.to_string(),
		reason: reason.into(),
	}
}

fn on_progress(shared: &Weak<Shared>, region: &str, generation: u64, progress: LoadProgress) {
	let Some(shared) = shared.upgrade() else {
		return;
	};
	let mut state = shared.state.lock();
	if let Some(entry) = state.regions.get_mut(region)
		&& entry.generation == generation
		&& entry.current().is_loading()
	{
		tracing::trace!(region, completed = progress.completed, required = progress.required, "offline.region.progress");
		entry.state.send_replace(RegionState::Loading { progress });
	}
}

fn on_download_done(shared: &Weak<Shared>, region: &str, generation: u64, outcome: std::result::Result<(), TileStoreError>) {
	let Some(shared) = shared.upgrade() else {
		return;
	};
	match outcome {
		Ok(()) => tracing::debug!(region, generation, "offline.region.downloaded"),
		Err(err) => {
			tracing::warn!(region, generation, error = %err, "offline.region.download_failed");
			fail_region(&shared, region, generation, err.to_string(), false);
		}
	}
}

/// Moves a loading region of `generation` to failed and fails its waiters.
fn fail_region(shared: &Shared, region: &str, generation: u64, reason: String, cancel_download: bool) {
	let mut effects = Effects::default();
	{
		let mut state = shared.state.lock();
		let Some(entry) = state.regions.get_mut(region) else {
			return;
		};
		if entry.generation != generation || !entry.current().is_loading() {
			return;
		}
		let load = entry.load.take();
		if cancel_download {
			effects.cancel = load;
		}
		for waiter in entry.waiters.drain(..) {
			effects.waiters.push((waiter, Err(load_error(region, reason.clone()))));
		}
		entry.state.send_replace(RegionState::Failed { reason });
	}
	tracing::debug!(region, generation, "offline.region.failed");
	effects.run();
}
