//! Data providers: owned record collections mirrored into engine layers.
//!
//! Each [`IndexableDataProvider`] serializes its state through one
//! [`SerialExecutor`]. A mutation is applied to every registered layer in
//! registration order, then committed to the provider's own map, then
//! acknowledged through the caller's callback. Because every operation goes
//! through the same FIFO queue, each layer sees mutations in exactly the order
//! the provider committed them.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use waymark_worker::{Executor, IdClock, JobStatus, SerialExecutor, TaskClass};

use crate::config::ProviderSettings;
use crate::error::{Result, SearchError};
use crate::layer::EngineLayer;
use crate::record::{IndexRecord, IndexableRecord};
use crate::task::{AsyncTask, Callback};

/// Handle returned by [`IndexableDataProvider::add_data_changed_listener`]
/// and [`IndexableDataProvider::add_engine_register_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ChangeListener<R> = dyn Fn(Vec<R>) + Send + Sync + 'static;

/// Receives each layer once it is registered, or the error that failed a
/// registration.
type RegisterListener = dyn Fn(Result<Arc<dyn EngineLayer>>) + Send + Sync + 'static;

struct ListenerEntry<L: ?Sized> {
	id: ListenerId,
	executor: Executor,
	listener: Arc<L>,
}

type Listeners<L> = Mutex<Vec<ListenerEntry<L>>>;

struct ProviderState<R> {
	/// Insertion-ordered so capacity eviction drops the oldest records first.
	records: IndexMap<String, R>,
	layers: Vec<Arc<dyn EngineLayer>>,
}

/// Result of one job: the value for the callback, plus what listeners hear
/// about afterwards.
struct Outcome<T, R> {
	value: Result<T>,
	/// Committed record snapshot, when the job changed provider state.
	changed: Option<Vec<R>>,
	/// Layer the job newly registered.
	registered: Option<Arc<dyn EngineLayer>>,
}

impl<T, R> Outcome<T, R> {
	fn read(value: T) -> Self {
		Self {
			value: Ok(value),
			changed: None,
			registered: None,
		}
	}

	fn changed(value: T, snapshot: Vec<R>) -> Self {
		Self {
			changed: Some(snapshot),
			..Self::read(value)
		}
	}

	fn failed(err: SearchError) -> Self {
		Self {
			value: Err(err),
			changed: None,
			registered: None,
		}
	}
}

/// Record collection exposed to zero or more [`EngineLayer`]s.
pub struct IndexableDataProvider<R: IndexableRecord> {
	name: Arc<str>,
	settings: ProviderSettings,
	executor: SerialExecutor,
	state: Arc<Mutex<ProviderState<R>>>,
	listeners: Arc<Listeners<ChangeListener<R>>>,
	register_listeners: Arc<Listeners<RegisterListener>>,
	listener_ids: IdClock,
}

impl<R: IndexableRecord> std::fmt::Debug for IndexableDataProvider<R> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("IndexableDataProvider")
			.field("name", &self.name)
			.field("settings", &self.settings)
			.finish_non_exhaustive()
	}
}

impl<R: IndexableRecord> IndexableDataProvider<R> {
	pub fn new(name: impl Into<Arc<str>>, settings: ProviderSettings) -> Self {
		let name = name.into();
		let executor = SerialExecutor::new(format!("provider:{name}"), TaskClass::Propagation);
		tracing::debug!(provider = %name, priority = settings.priority, max_records = ?settings.max_records, "search.provider.new");
		Self {
			name,
			settings,
			executor,
			state: Arc::new(Mutex::new(ProviderState {
				records: IndexMap::new(),
				layers: Vec::new(),
			})),
			listeners: Arc::default(),
			register_listeners: Arc::default(),
			listener_ids: IdClock::new(),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Merge priority; higher values are listed first.
	pub fn priority(&self) -> i32 {
		self.settings.priority
	}

	pub fn settings(&self) -> &ProviderSettings {
		&self.settings
	}

	pub fn get<F>(&self, id: impl Into<String>, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<Option<R>>) + Send + 'static,
	{
		let id = id.into();
		self.run("get", executor, callback, move |state, _| Outcome::read(state.records.get(&id).cloned()))
	}

	/// All records, in insertion order.
	pub fn get_all<F>(&self, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<Vec<R>>) + Send + 'static,
	{
		self.run("get_all", executor, callback, |state, _| Outcome::read(state.records.values().cloned().collect()))
	}

	pub fn contains<F>(&self, id: impl Into<String>, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<bool>) + Send + 'static,
	{
		let id = id.into();
		self.run("contains", executor, callback, move |state, _| Outcome::read(state.records.contains_key(&id)))
	}

	/// Inserts or replaces one record.
	pub fn upsert<F>(&self, record: R, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<()>) + Send + 'static,
	{
		self.upsert_all(vec![record], executor, callback)
	}

	/// Inserts or replaces records. A later record wins over an earlier one
	/// with the same id.
	pub fn upsert_all<F>(&self, records: Vec<R>, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<()>) + Send + 'static,
	{
		self.run("upsert", executor, callback, move |state, ctx| {
			let mut next = state.records.clone();
			let mut touched = IndexSet::with_capacity(records.len());
			for record in records {
				let id = record.id().to_string();
				touched.insert(id.clone());
				next.insert(id, record);
			}
			let evicted = evict_overflow(&mut next, ctx.settings.max_records);
			let upserts: Vec<IndexRecord> = touched
				.iter()
				.filter_map(|id| next.get(id))
				.map(IndexableRecord::to_index_record)
				.collect();

			for layer in &state.layers {
				layer.upsert_all(upserts.clone());
				layer.remove_all(&evicted);
			}
			tracing::debug!(
				provider = %ctx.name,
				upserted = upserts.len(),
				evicted = evicted.len(),
				layers = state.layers.len(),
				"search.provider.upsert"
			);
			state.records = next;
			Outcome::changed((), state.records.values().cloned().collect())
		})
	}

	/// Removes one record. Delivers `false` when the id is unknown.
	pub fn remove<F>(&self, id: impl Into<String>, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<bool>) + Send + 'static,
	{
		let id = id.into();
		self.run("remove", executor, callback, move |state, ctx| {
			if !state.records.contains_key(&id) {
				return Outcome::read(false);
			}
			let ids = [id];
			for layer in &state.layers {
				layer.remove_all(&ids);
			}
			tracing::debug!(provider = %ctx.name, id = %ids[0], layers = state.layers.len(), "search.provider.remove");
			state.records.shift_remove(&ids[0]);
			Outcome::changed(true, state.records.values().cloned().collect())
		})
	}

	/// Removes every record.
	pub fn clear<F>(&self, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<()>) + Send + 'static,
	{
		self.run("clear", executor, callback, |state, ctx| {
			if state.records.is_empty() {
				return Outcome::read(());
			}
			let ids: Vec<String> = state.records.keys().cloned().collect();
			for layer in &state.layers {
				layer.remove_all(&ids);
			}
			tracing::debug!(provider = %ctx.name, removed = ids.len(), "search.provider.clear");
			state.records.clear();
			Outcome::changed((), Vec::new())
		})
	}

	/// Bulk-loads the current records into `layer`, then starts propagating
	/// mutations to it. Registering the same layer twice is a no-op.
	///
	/// Engine register listeners hear about the new layer after `callback`
	/// fires, and about the error if registration fails.
	pub fn register_engine_layer<F>(&self, layer: Arc<dyn EngineLayer>, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<()>) + Send + 'static,
	{
		let register_listeners = Arc::clone(&self.register_listeners);
		let callback = move |res: Result<()>| {
			if let Err(err) = &res {
				notify(&*register_listeners, Err(err.clone()));
			}
			callback(res);
		};
		self.run("register_layer", executor, callback, move |state, ctx| {
			if state.layers.iter().any(|l| std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(&layer))) {
				tracing::trace!(provider = %ctx.name, layer = layer.name(), "search.provider.layer_already_registered");
				return Outcome::read(());
			}
			layer.upsert_all(state.records.values().map(IndexableRecord::to_index_record).collect());
			tracing::debug!(provider = %ctx.name, layer = layer.name(), records = state.records.len(), "search.provider.layer_registered");
			state.layers.push(Arc::clone(&layer));
			Outcome {
				registered: Some(layer),
				..Outcome::read(())
			}
		})
	}

	/// Stops propagating to `layer` and clears it. Delivers `false` when the
	/// layer was not registered.
	pub fn unregister_engine_layer<F>(&self, layer: Arc<dyn EngineLayer>, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<bool>) + Send + 'static,
	{
		self.run("unregister_layer", executor, callback, move |state, ctx| {
			let Some(at) = state.layers.iter().position(|l| std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(&layer))) else {
				return Outcome::read(false);
			};
			let layer = state.layers.remove(at);
			layer.clear();
			tracing::debug!(provider = %ctx.name, layer = layer.name(), "search.provider.layer_unregistered");
			Outcome::read(true)
		})
	}

	/// Subscribes to committed mutations. `listener` receives the full record
	/// snapshot on `executor` after each mutation is acknowledged.
	pub fn add_data_changed_listener<F>(&self, executor: Executor, listener: F) -> ListenerId
	where
		F: Fn(Vec<R>) + Send + Sync + 'static,
	{
		let id = ListenerId(self.listener_ids.next());
		self.listeners.lock().push(ListenerEntry {
			id,
			executor,
			listener: Arc::new(listener),
		});
		id
	}

	/// Returns false when `id` was not subscribed.
	pub fn remove_data_changed_listener(&self, id: ListenerId) -> bool {
		remove_listener(&*self.listeners, id)
	}

	/// Subscribes to engine layer registrations. `listener` is immediately
	/// replayed every layer registered so far, then hears about each later
	/// registration on `executor`.
	pub fn add_engine_register_listener<F>(&self, executor: Executor, listener: F) -> ListenerId
	where
		F: Fn(Result<Arc<dyn EngineLayer>>) + Send + Sync + 'static,
	{
		let id = ListenerId(self.listener_ids.next());
		let listener: Arc<RegisterListener> = Arc::new(listener);
		// Lock order matches a running job: state, then listeners.
		let registered = {
			let state = self.state.lock();
			self.register_listeners.lock().push(ListenerEntry {
				id,
				executor: executor.clone(),
				listener: Arc::clone(&listener),
			});
			state.layers.clone()
		};
		tracing::trace!(provider = %self.name, replayed = registered.len(), "search.provider.register_listener_added");
		for layer in registered {
			let listener = Arc::clone(&listener);
			executor.execute(move || listener(Ok(layer)));
		}
		id
	}

	/// Returns false when `id` was not subscribed.
	pub fn remove_engine_register_listener(&self, id: ListenerId) -> bool {
		remove_listener(&*self.register_listeners, id)
	}

	/// Stops the provider's executor. Operations issued afterwards fail with
	/// [`SearchError::Worker`].
	pub async fn shutdown(&self) {
		self.executor.shutdown().await;
	}

	fn run<T, C, W>(&self, op: &'static str, executor: Executor, callback: C, work: W) -> AsyncTask
	where
		T: Send + 'static,
		C: FnOnce(Result<T>) + Send + 'static,
		W: FnOnce(&mut ProviderState<R>, &JobContext) -> Outcome<T, R> + Send + 'static,
	{
		let task = AsyncTask::new();
		let job_task = task.clone();
		let state = Arc::clone(&self.state);
		let listeners = Arc::clone(&self.listeners);
		let register_listeners = Arc::clone(&self.register_listeners);
		let ctx = JobContext {
			name: Arc::clone(&self.name),
			settings: self.settings.clone(),
		};

		self.executor.submit(move |status| {
			if status == JobStatus::Rejected {
				tracing::warn!(provider = %ctx.name, op, "search.provider.rejected");
				let err = SearchError::Worker(format!("data provider '{}' is shut down", ctx.name));
				job_task.deliver(&executor, callback, Err(err));
				return;
			}
			if job_task.is_done() {
				tracing::trace!(provider = %ctx.name, op, "search.provider.skipped");
				return;
			}
			// Layer panics surface as a worker error, see `EngineLayer`.
			let outcome = catch_unwind(AssertUnwindSafe(|| work(&mut state.lock(), &ctx))).unwrap_or_else(|_| {
				tracing::error!(provider = %ctx.name, op, "search.provider.job_panicked");
				Outcome::failed(SearchError::Worker(format!("data provider '{}' {op} panicked", ctx.name)))
			});
			job_task.deliver(&executor, callback, outcome.value);
			if let Some(snapshot) = outcome.changed {
				notify(&*listeners, snapshot);
			}
			if let Some(layer) = outcome.registered {
				notify(&*register_listeners, Ok(layer));
			}
		});
		task
	}
}

struct JobContext {
	name: Arc<str>,
	settings: ProviderSettings,
}

fn evict_overflow<R>(records: &mut IndexMap<String, R>, max: Option<usize>) -> Vec<String> {
	let Some(max) = max else {
		return Vec::new();
	};
	let overflow = records.len().saturating_sub(max);
	records.drain(..overflow).map(|(id, _)| id).collect()
}

/// Hands `event` to every listener on its own executor. The list is
/// snapshotted first so listeners may subscribe or unsubscribe reentrantly.
fn notify<E, L>(listeners: &Listeners<L>, event: E)
where
	E: Clone + Send + 'static,
	L: Fn(E) + Send + Sync + ?Sized + 'static,
{
	let targets: Vec<(Executor, Arc<L>)> = listeners
		.lock()
		.iter()
		.map(|entry| (entry.executor.clone(), Arc::clone(&entry.listener)))
		.collect();
	for (executor, listener) in targets {
		let event = event.clone();
		executor.execute(move || (*listener)(event));
	}
}

fn remove_listener<L: ?Sized>(listeners: &Listeners<L>, id: ListenerId) -> bool {
	let mut listeners = listeners.lock();
	let before = listeners.len();
	listeners.retain(|entry| entry.id != id);
	listeners.len() != before
}

/// Object-safe view of a provider used by [`crate::DataProviderRegistry`].
pub trait DataProvider: Send + Sync + 'static {
	fn name(&self) -> &str;

	fn priority(&self) -> i32;

	fn attach_layer(&self, layer: Arc<dyn EngineLayer>, executor: Executor, callback: Callback<()>) -> AsyncTask;

	fn detach_layer(&self, layer: Arc<dyn EngineLayer>, executor: Executor, callback: Callback<bool>) -> AsyncTask;
}

impl<R: IndexableRecord> DataProvider for IndexableDataProvider<R> {
	fn name(&self) -> &str {
		IndexableDataProvider::name(self)
	}

	fn priority(&self) -> i32 {
		IndexableDataProvider::priority(self)
	}

	fn attach_layer(&self, layer: Arc<dyn EngineLayer>, executor: Executor, callback: Callback<()>) -> AsyncTask {
		self.register_engine_layer(layer, executor, callback)
	}

	fn detach_layer(&self, layer: Arc<dyn EngineLayer>, executor: Executor, callback: Callback<bool>) -> AsyncTask {
		self.unregister_engine_layer(layer, executor, callback)
	}
}
