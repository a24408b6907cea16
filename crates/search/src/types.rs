//! Request options, suggestions, results and the tagged response delivered to
//! callbacks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
	pub lon: f64,
	pub lat: f64,
}

impl Point {
	pub const fn new(lon: f64, lat: f64) -> Self {
		Self { lon, lat }
	}
}

/// Structured address. Every component is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
	pub house_number: Option<String>,
	pub street: Option<String>,
	pub neighborhood: Option<String>,
	pub locality: Option<String>,
	pub postcode: Option<String>,
	pub place: Option<String>,
	pub district: Option<String>,
	pub region: Option<String>,
	pub country: Option<String>,
}

impl Address {
	/// Joins the present components, most specific first.
	///
	/// Returns `None` when the address is empty.
	pub fn formatted(&self) -> Option<String> {
		let street = match (&self.house_number, &self.street) {
			(Some(number), Some(street)) => Some(format!("{number} {street}")),
			(None, Some(street)) => Some(street.clone()),
			(Some(number), None) => Some(number.clone()),
			(None, None) => None,
		};
		let parts: Vec<String> = [
			street,
			self.neighborhood.clone(),
			self.locality.clone(),
			self.place.clone(),
			self.district.clone(),
			self.region.clone(),
			self.postcode.clone(),
			self.country.clone(),
		]
		.into_iter()
		.flatten()
		.filter(|part| !part.is_empty())
		.collect();
		if parts.is_empty() { None } else { Some(parts.join(", ")) }
	}
}

/// Kind of place a result or record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
	Country,
	Region,
	Postcode,
	District,
	Place,
	Locality,
	Neighborhood,
	Street,
	Address,
	Poi,
}

/// Fully resolved search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
	pub id: String,
	pub name: String,
	pub address: Option<Address>,
	pub coordinate: Option<Point>,
	pub result_type: ResultType,
	pub categories: Vec<String>,
	pub metadata: BTreeMap<String, String>,
	/// Name of the data provider the result came from, for record-backed results.
	pub provider: Option<String>,
}

impl SearchResult {
	pub fn new(id: impl Into<String>, name: impl Into<String>, result_type: ResultType) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
			address: None,
			coordinate: None,
			result_type,
			categories: Vec::new(),
			metadata: BTreeMap::new(),
			provider: None,
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
}

/// What selecting a suggestion requires.
#[derive(Debug, Clone, PartialEq)]
pub enum SuggestionKind {
	/// Needs a retrieve round-trip. `handle` is opaque backend state.
	Remote { result_type: ResultType, handle: String },
	/// Already carries its final result; selecting it never touches the backend.
	Resolved(Box<SearchResult>),
	/// Points at a record mirrored from a data provider layer.
	Record { provider: String, record_id: String },
}

/// Phase-one answer to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
	pub id: String,
	pub name: String,
	pub description: Option<String>,
	pub kind: SuggestionKind,
}

impl Suggestion {
	/// Suggestion that must be retrieved from the backend.
	pub fn remote(id: impl Into<String>, name: impl Into<String>, result_type: ResultType, handle: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
			description: None,
			kind: SuggestionKind::Remote {
				result_type,
				handle: handle.into(),
			},
		}
	}

	/// Suggestion wrapping an already resolved result.
	pub fn resolved(result: SearchResult) -> Self {
		Self {
			id: result.id.clone(),
			name: result.name.clone(),
			description: result.address.as_ref().and_then(Address::formatted),
			kind: SuggestionKind::Resolved(Box::new(result)),
		}
	}

	/// Returns true when selecting this suggestion needs no backend call.
	pub fn is_terminal(&self) -> bool {
		!matches!(self.kind, SuggestionKind::Remote { .. })
	}
}

/// Options for two-phase forward search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
	/// Maximum number of suggestions; the engine default applies when unset.
	pub limit: Option<usize>,
	pub proximity: Option<Point>,
	/// ISO 3166 alpha-2 country filter.
	pub countries: Vec<String>,
	pub languages: Vec<String>,
	pub types: Vec<ResultType>,
}

/// Options for category search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryOptions {
	pub limit: Option<usize>,
	pub proximity: Option<Point>,
	pub countries: Vec<String>,
	pub languages: Vec<String>,
}

/// Options for reverse geocoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ReverseGeoOptions {
	pub center: Point,
	pub limit: Option<usize>,
	pub types: Vec<ResultType>,
}

impl ReverseGeoOptions {
	pub fn new(center: Point) -> Self {
		Self {
			center,
			limit: None,
			types: Vec::new(),
		}
	}
}

/// Tagged response delivered to every request callback.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResponse {
	/// Phase-one answer of a two-phase search.
	Suggestions(Vec<Suggestion>),
	/// Single-phase answer: category, reverse and offline requests.
	Results(Vec<SearchResult>),
	/// Resolution of one selected suggestion.
	Result { suggestion: Suggestion, result: SearchResult },
	/// Batch resolution, paired in the caller's input order.
	Batch(Vec<(Suggestion, SearchResult)>),
}

impl SearchResponse {
	/// Number of suggestions or results carried.
	pub fn len(&self) -> usize {
		match self {
			Self::Suggestions(items) => items.len(),
			Self::Results(items) => items.len(),
			Self::Result { .. } => 1,
			Self::Batch(items) => items.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
