//! Backend capabilities the engines call through.
//!
//! Geocoding itself (tokenization, ranking, fuzzy matching) lives behind these
//! traits. Implementations may be remote services or native indexes; the core
//! only sequences calls, forwards failures verbatim and never retries.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::types::{CategoryOptions, ReverseGeoOptions, SearchOptions, SearchResult, Suggestion};

/// Online two-phase search service.
#[async_trait]
pub trait SearchBackend: Send + Sync + 'static {
	/// Phase one: query to suggestions.
	async fn suggest(&self, query: &str, options: &SearchOptions) -> Result<Vec<Suggestion>, BackendError>;

	/// Phase two: one remote suggestion to its final result.
	async fn retrieve(&self, suggestion: &Suggestion) -> Result<SearchResult, BackendError>;

	/// Single-phase category search.
	async fn category(&self, category: &str, options: &CategoryOptions) -> Result<Vec<SearchResult>, BackendError>;

	/// Single-phase reverse geocoding.
	async fn reverse(&self, options: &ReverseGeoOptions) -> Result<Vec<SearchResult>, BackendError>;
}

/// On-device index answering from loaded tile regions.
///
/// All requests are single phase.
#[async_trait]
pub trait OfflineBackend: Send + Sync + 'static {
	async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>, BackendError>;

	async fn reverse(&self, options: &ReverseGeoOptions) -> Result<Vec<SearchResult>, BackendError>;

	async fn category(&self, category: &str, options: &CategoryOptions) -> Result<Vec<SearchResult>, BackendError>;
}
