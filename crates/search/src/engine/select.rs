use std::sync::Arc;

use waymark_worker::{TaskClass, WorkerJoinSet};

use crate::backend::SearchBackend;
use crate::error::{Result, SearchError};
use crate::layer::LayerSet;
use crate::types::{SearchResult, Suggestion, SuggestionKind};

/// Resolves suggestions to results for one engine.
#[derive(Clone)]
pub(crate) struct Resolver {
	backend: Arc<dyn SearchBackend>,
	layers: Arc<LayerSet>,
}

impl Resolver {
	pub(crate) fn new(backend: Arc<dyn SearchBackend>, layers: Arc<LayerSet>) -> Self {
		Self { backend, layers }
	}

	/// Resolves terminal suggestions without suspending. `None` for remote ones.
	pub(crate) fn resolve_local(&self, suggestion: &Suggestion) -> Option<Result<SearchResult>> {
		match &suggestion.kind {
			SuggestionKind::Resolved(result) => Some(Ok((**result).clone())),
			SuggestionKind::Record { provider, record_id } => Some(self.lookup_record(provider, record_id)),
			SuggestionKind::Remote { .. } => None,
		}
	}

	pub(crate) async fn resolve(&self, suggestion: &Suggestion) -> Result<SearchResult> {
		if let Some(resolved) = self.resolve_local(suggestion) {
			return resolved;
		}
		Ok(self.backend.retrieve(suggestion).await?)
	}

	/// Resolves every suggestion concurrently, pairing results in input order.
	///
	/// Returns on the first failure after aborting the remaining members.
	pub(crate) async fn resolve_batch(&self, suggestions: Vec<Suggestion>) -> Result<Vec<(Suggestion, SearchResult)>> {
		let mut set = WorkerJoinSet::new(TaskClass::Request);
		for (index, suggestion) in suggestions.iter().cloned().enumerate() {
			let resolver = self.clone();
			set.spawn(async move { (index, resolver.resolve(&suggestion).await) });
		}

		let mut slots: Vec<Option<SearchResult>> = vec![None; suggestions.len()];
		while let Some(joined) = set.join_next().await {
			let failure = match joined {
				Ok((index, Ok(result))) => {
					if let Some(slot) = slots.get_mut(index) {
						*slot = Some(result);
					}
					continue;
				}
				Ok((index, Err(err))) => {
					tracing::debug!(index, pending = set.len(), "search.engine.batch_member_failed");
					err
				}
				Err(join_err) => SearchError::Worker(join_err.to_string()),
			};
			set.shutdown().await;
			return Err(failure);
		}

		suggestions
			.into_iter()
			.zip(slots)
			.map(|(suggestion, slot)| {
				slot.map(|result| (suggestion, result))
					.ok_or_else(|| SearchError::Worker("batch member finished without a result".to_string()))
			})
			.collect()
	}

	fn lookup_record(&self, provider: &str, record_id: &str) -> Result<SearchResult> {
		let layer = self.layers.get(provider).ok_or_else(|| SearchError::ProviderNotFound(provider.to_string()))?;
		let record = layer.layer.get(record_id).ok_or_else(|| SearchError::RecordNotFound {
			provider: provider.to_string(),
			id: record_id.to_string(),
		})?;
		Ok(record.to_result(provider))
	}
}
