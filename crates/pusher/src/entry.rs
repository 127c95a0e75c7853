use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DOMAIN: &str = "reitti";
pub const SERVICE_PUSH_NOW: &str = "push_now";

/// Version written by the current config flow. Older entries must go through
/// [`crate::migrate_entry`] before they can be set up.
pub const CURRENT_VERSION: u32 = 2;

pub const CONF_URL: &str = "url";
pub const CONF_PORT: &str = "port";
pub const CONF_API_KEY: &str = "api_key";
pub const CONF_DEVICE: &str = "device";
pub const CONF_INTERVAL_SECONDS: &str = "interval_seconds";
pub const CONF_ENABLE_PUSH: &str = "enable_push";
pub const CONF_ENABLE_DEBUG_LOGGING: &str = "enable_debug_logging";
pub const CONF_FRIENDLY_NAME: &str = "friendly_name";

pub const DEFAULT_URL: &str = "http://reitti";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_INTERVAL_SECONDS: u64 = 30;
/// One week.
pub const MAX_INTERVAL_SECONDS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_FRIENDLY_NAME: &str = "Reitti Integration";

/// A persisted, named set of settings for one configured instance.
///
/// `data` holds the connection settings from the initial setup step and
/// `options` the settings that can be edited later. Both are kept as raw JSON
/// objects so entries written by older versions survive a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
	pub entry_id: String,

	#[serde(default = "first_version")]
	pub version: u32,

	#[serde(default = "default_domain")]
	pub domain: String,

	pub title: String,

	#[serde(default)]
	pub data: Map<String, Value>,

	#[serde(default)]
	pub options: Map<String, Value>,
}

fn first_version() -> u32 {
	1
}

fn default_domain() -> String {
	DOMAIN.into()
}

impl ConfigEntry {
	pub fn new(
		entry_id: impl Into<String>,
		title: impl Into<String>,
		data: Map<String, Value>,
		options: Map<String, Value>,
	) -> Self {
		ConfigEntry {
			entry_id: entry_id.into(),
			version: CURRENT_VERSION,
			domain: DOMAIN.into(),
			title: title.into(),
			data,
			options,
		}
	}

	/// Replaces the options, keeping the title in sync with the friendly name.
	pub fn update_options(&mut self, options: Map<String, Value>) {
		if let Some(Value::String(name)) = options.get(CONF_FRIENDLY_NAME) {
			self.title = name.clone();
		}

		self.options = options;
	}
}
