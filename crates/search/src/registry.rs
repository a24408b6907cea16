//! Brokers data provider registration against engines.
//!
//! Each provider gets one mirror layer, shared by every engine it is
//! registered with. The layer is attached to the provider on the first
//! registration and detached (which clears it) when the last engine leaves.
//! Registry operations run one at a time on a single worker, in the order
//! they were issued, so an unregister issued after a register always
//! observes it.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{Mutex, mpsc, oneshot};
use waymark_worker::{Executor, TaskClass};

use crate::error::{Result, SearchError};
use crate::layer::{EngineLayer, LayerHost, LayerSet, MemoryLayer, ProviderLayer};
use crate::provider::DataProvider;
use crate::task::AsyncTask;

struct ProviderContext {
	provider: Arc<dyn DataProvider>,
	layer: Arc<MemoryLayer>,
	engines: Vec<Arc<LayerSet>>,
}

type Op = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Registry of data providers by name.
pub struct DataProviderRegistry {
	contexts: Arc<Mutex<HashMap<String, ProviderContext>>>,
	index: Arc<RwLock<BTreeMap<String, Arc<dyn DataProvider>>>>,
	ops: mpsc::UnboundedSender<Op>,
}

impl Default for DataProviderRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for DataProviderRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DataProviderRegistry").field("providers", &self.providers()).finish()
	}
}

impl DataProviderRegistry {
	/// Creates an empty registry and starts its worker. The worker exits once
	/// the registry is dropped and every queued operation has finished.
	pub fn new() -> Self {
		let (ops, mut rx) = mpsc::unbounded_channel::<Op>();
		waymark_worker::spawn(TaskClass::Request, async move {
			while let Some(op) = rx.recv().await {
				op.await;
			}
			tracing::trace!("search.registry.worker_stopped");
		});
		Self {
			contexts: Arc::default(),
			index: Arc::default(),
			ops,
		}
	}

	/// Registers `provider` with `host`'s engine.
	///
	/// Fails with [`SearchError::AlreadyRegistered`] if the provider is already
	/// registered with that engine, or if a different provider holds the name.
	pub fn register<H, F>(&self, provider: Arc<dyn DataProvider>, host: &H, executor: Executor, callback: F) -> AsyncTask
	where
		H: LayerHost + ?Sized,
		F: FnOnce(Result<()>) + Send + 'static,
	{
		let engine = host.layer_set();
		let contexts = Arc::clone(&self.contexts);
		let index = Arc::clone(&self.index);
		self.run("register", executor, callback, async move { register_on(&contexts, &index, provider, engine).await })
	}

	/// Unregisters the provider named `name` from `host`'s engine.
	///
	/// Delivers `false` when it was not registered there. When this was the
	/// provider's last engine, its layer is detached and cleared before the
	/// callback fires.
	pub fn unregister<H, F>(&self, name: impl Into<String>, host: &H, executor: Executor, callback: F) -> AsyncTask
	where
		H: LayerHost + ?Sized,
		F: FnOnce(Result<bool>) + Send + 'static,
	{
		let name = name.into();
		let engine = host.layer_set();
		let contexts = Arc::clone(&self.contexts);
		let index = Arc::clone(&self.index);
		self.run("unregister", executor, callback, async move { unregister_on(&contexts, &index, &name, engine).await })
	}

	pub fn provider(&self, name: &str) -> Option<Arc<dyn DataProvider>> {
		self.index.read().get(name).cloned()
	}

	/// Registered provider names, sorted.
	pub fn providers(&self) -> Vec<String> {
		self.index.read().keys().cloned().collect()
	}

	/// Queues a registry operation behind every earlier one. Cancelling the
	/// returned task only suppresses the callback.
	fn run<T, C, Fut>(&self, op: &'static str, executor: Executor, callback: C, fut: Fut) -> AsyncTask
	where
		T: Send + 'static,
		C: FnOnce(Result<T>) + Send + 'static,
		Fut: Future<Output = Result<T>> + Send + 'static,
	{
		let task = AsyncTask::new();
		let job = task.clone();
		let sink = Arc::new(parking_lot::Mutex::new(Some(callback)));
		let queued_sink = Arc::clone(&sink);
		let queued_executor = executor.clone();
		let queued: Op = Box::pin(async move {
			let outcome = fut.await;
			if let Err(err) = &outcome {
				tracing::warn!(op, error = %err, "search.registry.failed");
			}
			if let Some(callback) = queued_sink.lock().take() {
				job.deliver(&queued_executor, callback, outcome);
			}
		});
		if self.ops.send(queued).is_err()
			&& let Some(callback) = sink.lock().take()
		{
			tracing::error!(op, "search.registry.worker_gone");
			task.deliver(&executor, callback, Err(SearchError::Worker(format!("data provider registry stopped before {op}"))));
		}
		task
	}
}

async fn register_on(
	contexts: &Mutex<HashMap<String, ProviderContext>>,
	index: &RwLock<BTreeMap<String, Arc<dyn DataProvider>>>,
	provider: Arc<dyn DataProvider>,
	engine: Arc<LayerSet>,
) -> Result<()> {
	let name = provider.name().to_string();
	let mut contexts = contexts.lock().await;

	if let Some(ctx) = contexts.get_mut(&name) {
		let same_provider = std::ptr::addr_eq(Arc::as_ptr(&ctx.provider), Arc::as_ptr(&provider));
		if !same_provider || ctx.engines.iter().any(|e| Arc::ptr_eq(e, &engine)) {
			return Err(SearchError::AlreadyRegistered(name));
		}
		engine.insert(ProviderLayer {
			provider: name.clone(),
			priority: provider.priority(),
			layer: Arc::clone(&ctx.layer),
		});
		ctx.engines.push(engine);
		tracing::debug!(provider = %name, engines = ctx.engines.len(), "search.registry.joined");
		return Ok(());
	}

	let layer = MemoryLayer::new(format!("{name}.mirror"));
	let (tx, rx) = oneshot::channel();
	provider.attach_layer(
		Arc::clone(&layer) as Arc<dyn EngineLayer>,
		Executor::Inline,
		Box::new(move |res| {
			let _ = tx.send(res);
		}),
	);
	rx.await.map_err(|_| SearchError::Worker(format!("data provider '{name}' dropped the registration")))??;

	engine.insert(ProviderLayer {
		provider: name.clone(),
		priority: provider.priority(),
		layer: Arc::clone(&layer),
	});
	index.write().insert(name.clone(), Arc::clone(&provider));
	tracing::debug!(provider = %name, records = layer.len(), "search.registry.registered");
	contexts.insert(
		name,
		ProviderContext {
			provider,
			layer,
			engines: vec![engine],
		},
	);
	Ok(())
}

async fn unregister_on(
	contexts: &Mutex<HashMap<String, ProviderContext>>,
	index: &RwLock<BTreeMap<String, Arc<dyn DataProvider>>>,
	name: &str,
	engine: Arc<LayerSet>,
) -> Result<bool> {
	let mut contexts = contexts.lock().await;
	let Some(ctx) = contexts.get_mut(name) else {
		return Ok(false);
	};
	let Some(at) = ctx.engines.iter().position(|e| Arc::ptr_eq(e, &engine)) else {
		return Ok(false);
	};
	ctx.engines.remove(at);
	engine.remove(name);
	if !ctx.engines.is_empty() {
		tracing::debug!(provider = name, engines = ctx.engines.len(), "search.registry.left");
		return Ok(true);
	}

	let Some(ctx) = contexts.remove(name) else {
		return Ok(true);
	};
	index.write().remove(name);
	let (tx, rx) = oneshot::channel();
	ctx.provider.detach_layer(
		ctx.layer as Arc<dyn EngineLayer>,
		Executor::Inline,
		Box::new(move |res| {
			let _ = tx.send(res);
		}),
	);
	let detached = rx.await.map_err(|_| SearchError::Worker(format!("data provider '{name}' dropped the detach")))??;
	tracing::debug!(provider = name, detached, "search.registry.unregistered");
	Ok(true)
}
