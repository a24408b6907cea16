//! Engine-side mirrors of provider records.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::record::IndexRecord;

/// Index mirror a data provider pushes its mutations into.
///
/// Layers are not owned by providers: a provider only notifies the layers
/// registered with it, in registration order, from its serial executor.
///
/// A panic inside a layer fails the provider operation with
/// [`crate::SearchError::Worker`]. Layers notified before the panicking one
/// keep the mutation, while the provider's own records stay as they were.
pub trait EngineLayer: Send + Sync + 'static {
	/// Diagnostic name.
	fn name(&self) -> &str;

	/// Inserts or replaces each record by id.
	fn upsert_all(&self, records: Vec<IndexRecord>);

	/// Removes records by id. Unknown ids are ignored.
	fn remove_all(&self, ids: &[String]);

	/// Drops every mirrored record.
	fn clear(&self);
}

/// In-memory [`EngineLayer`] queried by the search engines.
pub struct MemoryLayer {
	name: String,
	records: RwLock<HashMap<String, IndexRecord>>,
}

impl std::fmt::Debug for MemoryLayer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemoryLayer").field("name", &self.name).field("len", &self.len()).finish()
	}
}

impl MemoryLayer {
	pub fn new(name: impl Into<String>) -> Arc<Self> {
		Arc::new(Self {
			name: name.into(),
			records: RwLock::new(HashMap::new()),
		})
	}

	pub fn get(&self, id: &str) -> Option<IndexRecord> {
		self.records.read().get(id).cloned()
	}

	pub fn len(&self) -> usize {
		self.records.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.read().is_empty()
	}

	/// Mirrored ids, sorted.
	pub fn ids(&self) -> Vec<String> {
		let mut ids: Vec<String> = self.records.read().keys().cloned().collect();
		ids.sort();
		ids
	}

	/// Records whose name or index tokens contain `query`, case-insensitively.
	///
	/// Sorted by name then id so results are stable across calls.
	pub fn lookup(&self, query: &str, limit: usize) -> Vec<IndexRecord> {
		let needle = query.trim().to_lowercase();
		if needle.is_empty() || limit == 0 {
			return Vec::new();
		}
		let mut hits: Vec<IndexRecord> = self.records.read().values().filter(|r| r.matches_text(&needle)).cloned().collect();
		sort_and_truncate(&mut hits, limit);
		hits
	}

	/// Records tagged with `category`.
	pub fn by_category(&self, category: &str, limit: usize) -> Vec<IndexRecord> {
		let mut hits: Vec<IndexRecord> = self.records.read().values().filter(|r| r.has_category(category)).cloned().collect();
		sort_and_truncate(&mut hits, limit);
		hits
	}
}

fn sort_and_truncate(records: &mut Vec<IndexRecord>, limit: usize) {
	records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
	records.truncate(limit);
}

impl EngineLayer for MemoryLayer {
	fn name(&self) -> &str {
		&self.name
	}

	fn upsert_all(&self, records: Vec<IndexRecord>) {
		if records.is_empty() {
			return;
		}
		let mut map = self.records.write();
		for record in records {
			map.insert(record.id.clone(), record);
		}
	}

	fn remove_all(&self, ids: &[String]) {
		if ids.is_empty() {
			return;
		}
		let mut map = self.records.write();
		for id in ids {
			map.remove(id);
		}
	}

	fn clear(&self) {
		self.records.write().clear();
	}
}

/// A provider's mirror layer as seen by one engine.
#[derive(Debug, Clone)]
pub struct ProviderLayer {
	pub provider: String,
	pub priority: i32,
	pub layer: Arc<MemoryLayer>,
}

/// Provider layers attached to one engine, highest priority first.
#[derive(Debug, Default)]
pub struct LayerSet {
	layers: RwLock<Vec<ProviderLayer>>,
}

impl LayerSet {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Adds `entry`, replacing any layer with the same provider name.
	///
	/// Equal priorities keep attachment order.
	pub fn insert(&self, entry: ProviderLayer) {
		let mut layers = self.layers.write();
		layers.retain(|l| l.provider != entry.provider);
		let at = layers.iter().position(|l| l.priority < entry.priority).unwrap_or(layers.len());
		layers.insert(at, entry);
	}

	/// Removes the layer for `provider`, returning it if present.
	pub fn remove(&self, provider: &str) -> Option<ProviderLayer> {
		let mut layers = self.layers.write();
		let at = layers.iter().position(|l| l.provider == provider)?;
		Some(layers.remove(at))
	}

	pub fn contains(&self, provider: &str) -> bool {
		self.layers.read().iter().any(|l| l.provider == provider)
	}

	pub fn get(&self, provider: &str) -> Option<ProviderLayer> {
		self.layers.read().iter().find(|l| l.provider == provider).cloned()
	}

	pub fn len(&self) -> usize {
		self.layers.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.layers.read().is_empty()
	}

	/// Copy of the current layers in query order.
	pub fn snapshot(&self) -> Vec<ProviderLayer> {
		self.layers.read().clone()
	}
}

/// Anything that exposes a [`LayerSet`] providers can be registered against.
pub trait LayerHost {
	fn layer_set(&self) -> Arc<LayerSet>;
}

impl LayerHost for Arc<LayerSet> {
	fn layer_set(&self) -> Arc<LayerSet> {
		Arc::clone(self)
	}
}
