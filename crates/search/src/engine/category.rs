use std::sync::Arc;

use waymark_worker::Executor;

use super::SearchEngine;
use crate::backend::SearchBackend;
use crate::config::EngineSettings;
use crate::error::Result;
use crate::layer::{LayerHost, LayerSet};
use crate::task::AsyncTask;
use crate::types::{CategoryOptions, SearchResponse};

/// Category-only engine. Its `search` is single phase and delivers
/// [`SearchResponse::Results`].
#[derive(Debug)]
pub struct CategorySearchEngine {
	engine: SearchEngine,
}

impl CategorySearchEngine {
	pub fn new(settings: EngineSettings, backend: Arc<dyn SearchBackend>) -> Self {
		Self {
			engine: SearchEngine::new(settings, backend),
		}
	}

	pub fn search<F>(&self, category: impl Into<String>, options: CategoryOptions, executor: Executor, callback: F) -> AsyncTask
	where
		F: FnOnce(Result<SearchResponse>) + Send + 'static,
	{
		self.engine.category_search(category, options, executor, callback)
	}

	/// The wrapped two-phase engine.
	pub fn engine(&self) -> &SearchEngine {
		&self.engine
	}
}

impl LayerHost for CategorySearchEngine {
	fn layer_set(&self) -> Arc<LayerSet> {
		self.engine.layer_set()
	}
}
