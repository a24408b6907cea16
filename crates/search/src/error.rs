//! Error types for the search core.

use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by a backend (remote service or native index).
///
/// These are surfaced to callers verbatim through [`SearchError::Backend`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
	/// The backend could not be reached.
	#[error("connection error: {0}")]
	Connection(String),

	/// The backend answered with a non-success HTTP status.
	#[error("http error {status}: {message}")]
	Http {
		/// HTTP status code.
		status: u16,
		/// Response body or reason phrase.
		message: String,
	},

	/// The response could not be decoded.
	#[error("malformed response: {0}")]
	Parse(String),

	/// Any other backend-side failure.
	#[error("internal error: {0}")]
	Internal(String),

	/// The backend dropped the request on its own. Delivered to the callback,
	/// and the owning task ends up cancelled.
	#[error("request cancelled by backend")]
	Cancelled,
}

/// Errors delivered through request callbacks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
	/// Backend failure, passed through untouched.
	#[error(transparent)]
	Backend(#[from] BackendError),

	/// The offline engine was queried before its index became ready.
	#[error("offline index is not ready{}", region.as_ref().map(|r| format!(" for region '{r}'")).unwrap_or_default())]
	NotReady {
		/// Region the request was gated on, if one was selected.
		region: Option<String>,
	},

	/// No provider with this name is known.
	#[error("data provider '{0}' is not registered")]
	ProviderNotFound(String),

	/// The provider is already registered with the target engine.
	#[error("data provider '{0}' is already registered with this engine")]
	AlreadyRegistered(String),

	/// A record suggestion points at a record that is no longer mirrored.
	#[error("no record with id '{id}' in data provider '{provider}'")]
	RecordNotFound {
		/// Provider name.
		provider: String,
		/// Record id.
		id: String,
	},

	/// An offline region load terminated without the index becoming ready.
	#[error("region '{region}' failed to load: {reason}")]
	RegionLoad {
		/// Region id.
		region: String,
		/// Tile store or cancellation reason.
		reason: String,
	},

	/// The caller passed an unusable argument.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	/// The worker backing the operation is gone.
	#[error("worker unavailable: {0}")]
	Worker(String),
}

impl SearchError {
	/// Returns true for the backend's own cancellation signal.
	pub fn is_cancellation(&self) -> bool {
		matches!(self, Self::Backend(BackendError::Cancelled))
	}
}

/// Result type for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors raised while loading [`crate::Settings`].
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The settings file could not be read.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// The settings file is not valid TOML for the settings schema.
	#[error("settings parse error: {0}")]
	Parse(#[from] toml::de::Error),

	/// A value parsed but is out of range.
	#[error("invalid setting '{key}': {reason}")]
	Invalid {
		/// Dotted key of the offending value.
		key: String,
		/// Why it was rejected.
		reason: &'static str,
	},
}
