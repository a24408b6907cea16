//! Records exposed by data providers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Address, Point, ResultType, SearchResult};

/// A record a data provider can mirror into engine layers.
///
/// Records are immutable values: an update replaces the stored record with
/// the same id wholesale.
pub trait IndexableRecord: Clone + Send + Sync + 'static {
	/// Stable unique id within the owning provider.
	fn id(&self) -> &str;

	/// Index representation stored in engine layers.
	fn to_index_record(&self) -> IndexRecord;
}

/// Layer-side representation of a provider record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
	pub id: String,
	pub name: String,
	pub address: Option<Address>,
	pub coordinate: Option<Point>,
	pub result_type: ResultType,
	pub categories: Vec<String>,
	/// Extra terms the record should be found by.
	pub index_tokens: Vec<String>,
	pub metadata: BTreeMap<String, String>,
}

impl IndexRecord {
	pub fn new(id: impl Into<String>, name: impl Into<String>, result_type: ResultType) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
			address: None,
			coordinate: None,
			result_type,
			categories: Vec::new(),
			index_tokens: Vec::new(),
			metadata: BTreeMap::new(),
		}
	}

	#[must_use]
	pub fn with_coordinate(mut self, coordinate: Point) -> Self {
		self.coordinate = Some(coordinate);
		self
	}

	#[must_use]
	pub fn with_address(mut self, address: Address) -> Self {
		self.address = Some(address);
		self
	}

	#[must_use]
	pub fn with_categories<I, S>(mut self, categories: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.categories = categories.into_iter().map(Into::into).collect();
		self
	}

	#[must_use]
	pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.metadata.insert(key.into(), value.into());
		self
	}

	/// Case-insensitive containment match against the name and index tokens.
	pub fn matches_text(&self, needle_lower: &str) -> bool {
		self.name.to_lowercase().contains(needle_lower)
			|| self.index_tokens.iter().any(|token| token.to_lowercase().contains(needle_lower))
	}

	/// Case-insensitive exact match against the category tags.
	pub fn has_category(&self, category: &str) -> bool {
		self.categories.iter().any(|c| c.eq_ignore_ascii_case(category))
	}

	/// Converts to a result attributed to `provider`.
	pub fn to_result(&self, provider: &str) -> SearchResult {
		SearchResult {
			id: self.id.clone(),
			name: self.name.clone(),
			address: self.address.clone(),
			coordinate: self.coordinate,
			result_type: self.result_type,
			categories: self.categories.clone(),
			metadata: self.metadata.clone(),
			provider: Some(provider.to_string()),
		}
	}
}

impl IndexableRecord for IndexRecord {
	fn id(&self) -> &str {
		&self.id
	}

	fn to_index_record(&self) -> IndexRecord {
		self.clone()
	}
}
