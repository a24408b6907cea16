//! Engine, offline and provider settings.
//!
//! Settings are plain serde structs loaded from TOML. Every field has a
//! default, so an empty document is a valid configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable that overrides [`EngineSettings::access_token`].
pub const ACCESS_TOKEN_ENV: &str = "WAYMARK_ACCESS_TOKEN";

/// Remote API family an engine talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
	Geocoding,
	#[default]
	SearchBox,
	Sbs,
}

/// Settings for online engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
	/// Token forwarded to the backend. Never interpreted by the core.
	pub access_token: Option<String>,
	/// BCP 47 language tag requested from the backend.
	pub locale: String,
	pub api_type: ApiType,
	/// Endpoint override for self-hosted or test backends.
	pub base_url: Option<String>,
	/// Result limit used when a request does not set one.
	pub default_limit: usize,
}

impl Default for EngineSettings {
	fn default() -> Self {
		Self {
			access_token: None,
			locale: "en".to_string(),
			api_type: ApiType::default(),
			base_url: None,
			default_limit: 10,
		}
	}
}

/// Settings for the offline engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OfflineSettings {
	/// Tileset dataset name loaded for new regions.
	pub dataset: String,
	/// Dataset version; `None` selects the latest.
	pub version: Option<String>,
	pub default_limit: usize,
}

impl Default for OfflineSettings {
	fn default() -> Self {
		Self {
			dataset: "mbx-main".to_string(),
			version: None,
			default_limit: 10,
		}
	}
}

/// Per-provider settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSettings {
	/// Higher priorities are listed first when provider records are merged.
	pub priority: i32,
	/// Cap on stored records; the oldest-inserted records are evicted first.
	pub max_records: Option<usize>,
}

/// Top-level settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
	pub engine: EngineSettings,
	pub offline: OfflineSettings,
	/// Provider settings keyed by provider name.
	pub providers: BTreeMap<String, ProviderSettings>,
}

impl Settings {
	/// Parses and validates a TOML settings document.
	pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
		let settings: Self = toml::from_str(content)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Reads and parses a settings file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		let settings = Self::from_toml_str(&content)?;
		tracing::debug!(path = %path.display(), providers = settings.providers.len(), "search.config.loaded");
		Ok(settings)
	}

	/// Applies environment overrides on top of the parsed document.
	#[must_use]
	pub fn with_env_overrides(mut self) -> Self {
		if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV)
			&& !token.is_empty()
		{
			self.engine.access_token = Some(token);
		}
		self
	}

	/// Settings for `provider`, or defaults when it is not configured.
	pub fn provider(&self, provider: &str) -> ProviderSettings {
		self.providers.get(provider).cloned().unwrap_or_default()
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.engine.default_limit == 0 {
			return Err(ConfigError::Invalid {
				key: "engine.default_limit".to_string(),
				reason: "must be greater than zero",
			});
		}
		if self.offline.default_limit == 0 {
			return Err(ConfigError::Invalid {
				key: "offline.default_limit".to_string(),
				reason: "must be greater than zero",
			});
		}
		for (name, provider) in &self.providers {
			if provider.max_records == Some(0) {
				return Err(ConfigError::Invalid {
					key: format!("providers.{name}.max_records"),
					reason: "must be greater than zero",
				});
			}
		}
		Ok(())
	}
}
