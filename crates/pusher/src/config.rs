use crate::entry::{
	CONF_API_KEY, CONF_DEVICE, CONF_ENABLE_DEBUG_LOGGING, CONF_ENABLE_PUSH, CONF_FRIENDLY_NAME,
	CONF_INTERVAL_SECONDS, CONF_PORT, CONF_URL, ConfigEntry, DEFAULT_INTERVAL_SECONDS, DEFAULT_PORT,
	MAX_INTERVAL_SECONDS,
};
use hass_entity_state::{EntityId, EntityIdError};
use reitti_ingest_provider::{DEFAULT_TIMEOUT, IngestOptions};
use semval::{context::Context, Validate, ValidationResult};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const INGEST_PATH: [&str; 4] = ["api", "v1", "ingest", "owntracks"];

/// Settings of one running instance, resolved from a [`ConfigEntry`].
#[derive(Debug, Clone, PartialEq)]
pub struct PushConfig {
	/// Base URL of the Reitti server, always with a scheme and without a
	/// trailing slash.
	pub url: String,
	pub port: u16,
	pub api_key: String,
	pub device: EntityId,
	pub interval: Duration,
	pub push_enabled: bool,
	pub debug_logging: bool,
	pub name: String,
	pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("missing required setting '{key}'")]
	Missing { key: &'static str },

	#[error("setting '{key}' must be {expected}")]
	InvalidType {
		key: &'static str,
		expected: &'static str,
	},

	#[error("setting '{key}' is not a valid entity id")]
	Device {
		key: &'static str,
		#[source]
		source: EntityIdError,
	},

	#[error("invalid settings: {0:?}")]
	Invalid(Vec<PushConfigInvalidity>),

	#[error("failed to build ingest URL from '{url}'")]
	Endpoint {
		url: String,
		#[source]
		source: url::ParseError,
	},
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PushConfigInvalidity {
	Url,
	Port,
	ApiKey,
	Interval,
}

/// Trims trailing slashes and assumes `http://` when no scheme is given.
pub fn normalize_base_url(url: &str) -> String {
	let url = url.trim().trim_end_matches('/');
	let has_scheme = ["http://", "https://"].iter().any(|scheme| {
		url
			.get(..scheme.len())
			.is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
	});

	if has_scheme {
		url.into()
	} else {
		format!("http://{url}")
	}
}

impl PushConfig {
	pub fn from_entry(entry: &ConfigEntry) -> Result<Self, ConfigError> {
		let data = &entry.data;
		let options = &entry.options;

		let url = string(data, CONF_URL)?.ok_or(ConfigError::Missing { key: CONF_URL })?;
		let port = match integer(data, CONF_PORT)? {
			None => DEFAULT_PORT,
			Some(port) => u16::try_from(port).map_err(|_| ConfigError::InvalidType {
				key: CONF_PORT,
				expected: "a port number",
			})?,
		};

		let api_key = string(data, CONF_API_KEY)?.unwrap_or_default();

		// The options step may point the entry at a different device.
		let device = match string(options, CONF_DEVICE)? {
			Some(device) => device,
			None => string(data, CONF_DEVICE)?.ok_or(ConfigError::Missing { key: CONF_DEVICE })?,
		};
		let device = EntityId::parse(device).map_err(|source| ConfigError::Device {
			key: CONF_DEVICE,
			source,
		})?;

		let interval = integer(options, CONF_INTERVAL_SECONDS)?.unwrap_or(DEFAULT_INTERVAL_SECONDS);
		let push_enabled = boolean(options, CONF_ENABLE_PUSH)?.unwrap_or(true);
		let debug_logging = boolean(options, CONF_ENABLE_DEBUG_LOGGING)?.unwrap_or(false);
		let name = string(options, CONF_FRIENDLY_NAME)?.unwrap_or_else(|| entry.title.clone());

		let config = PushConfig {
			url: normalize_base_url(&url),
			port,
			api_key,
			device,
			interval: Duration::from_secs(interval),
			push_enabled,
			debug_logging,
			name,
			timeout: DEFAULT_TIMEOUT,
		};

		config
			.validate()
			.map_err(|invalidities| ConfigError::Invalid(invalidities.into_iter().collect()))?;

		Ok(config)
	}

	/// `<url>:<port>/api/v1/ingest/owntracks?token=<api_key>`. A path already
	/// present on the base URL (reverse proxy prefix) is kept.
	pub fn endpoint(&self) -> Result<Url, ConfigError> {
		let endpoint_error = |source| ConfigError::Endpoint {
			url: self.url.clone(),
			source,
		};

		let mut url = Url::parse(&self.url).map_err(endpoint_error)?;
		url
			.set_port(Some(self.port))
			.map_err(|()| endpoint_error(url::ParseError::InvalidPort))?;
		url
			.path_segments_mut()
			.map_err(|()| endpoint_error(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
			.pop_if_empty()
			.extend(INGEST_PATH);
		url.query_pairs_mut().clear().append_pair("token", &self.api_key);

		Ok(url)
	}
}

/// The URL with the token replaced, for logging.
pub fn redacted(url: &Url) -> Url {
	let mut redacted = url.clone();
	let pairs: Vec<(String, String)> = url
		.query_pairs()
		.map(|(k, v)| {
			let v = if k == "token" { String::from("REDACTED") } else { v.into_owned() };
			(k.into_owned(), v)
		})
		.collect();

	redacted.query_pairs_mut().clear().extend_pairs(pairs);
	redacted
}

impl Validate for PushConfig {
	type Invalidity = PushConfigInvalidity;

	fn validate(&self) -> ValidationResult<Self::Invalidity> {
		let url_ok = Url::parse(&self.url)
			.is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host());

		Context::new()
			.invalidate_if(!url_ok, PushConfigInvalidity::Url)
			.invalidate_if(self.port == 0, PushConfigInvalidity::Port)
			.invalidate_if(self.api_key.is_empty(), PushConfigInvalidity::ApiKey)
			.invalidate_if(
				self.interval.is_zero() || self.interval.as_secs() > MAX_INTERVAL_SECONDS,
				PushConfigInvalidity::Interval,
			)
			.into()
	}
}

impl TryFrom<PushConfig> for IngestOptions {
	type Error = ConfigError;

	fn try_from(config: PushConfig) -> Result<Self, Self::Error> {
		let mut options = IngestOptions::new(config.endpoint()?);
		options.timeout(config.timeout);
		Ok(options)
	}
}

pub(crate) fn string(map: &Map<String, Value>, key: &'static str) -> Result<Option<String>, ConfigError> {
	match map.get(key) {
		None | Some(Value::Null) => Ok(None),
		Some(Value::String(s)) => Ok(Some(s.clone())),
		Some(_) => Err(ConfigError::InvalidType {
			key,
			expected: "a string",
		}),
	}
}

pub(crate) fn integer(map: &Map<String, Value>, key: &'static str) -> Result<Option<u64>, ConfigError> {
	match map.get(key) {
		None | Some(Value::Null) => Ok(None),
		Some(Value::Number(n)) => n.as_u64().map(Some).ok_or(ConfigError::InvalidType {
			key,
			expected: "a positive integer",
		}),
		Some(_) => Err(ConfigError::InvalidType {
			key,
			expected: "a positive integer",
		}),
	}
}

pub(crate) fn boolean(map: &Map<String, Value>, key: &'static str) -> Result<Option<bool>, ConfigError> {
	match map.get(key) {
		None | Some(Value::Null) => Ok(None),
		Some(Value::Bool(b)) => Ok(Some(*b)),
		Some(_) => Err(ConfigError::InvalidType {
			key,
			expected: "a boolean",
		}),
	}
}
