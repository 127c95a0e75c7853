//! Setup and options forms.
//!
//! The forms are rendered by whatever front end drives the flow. A step called
//! without input returns [`FlowResult::ShowForm`]; a step called with input
//! either returns the same form with per-field errors or
//! [`FlowResult::CreateEntry`].

use crate::{
	config::normalize_base_url,
	entry::{
		CONF_API_KEY, CONF_DEVICE, CONF_ENABLE_DEBUG_LOGGING, CONF_ENABLE_PUSH, CONF_FRIENDLY_NAME,
		CONF_INTERVAL_SECONDS, CONF_PORT, CONF_URL, ConfigEntry, DEFAULT_FRIENDLY_NAME,
		DEFAULT_INTERVAL_SECONDS, DEFAULT_PORT, DEFAULT_URL, MAX_INTERVAL_SECONDS,
	},
};
use hass_entity_state::EntityId;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

pub const STEP_USER: &str = "user";
pub const STEP_INIT: &str = "init";

/// Entity domain the device selector is restricted to.
pub const DEVICE_TRACKER_DOMAIN: &str = "device_tracker";

pub const ERROR_REQUIRED: &str = "required";
pub const ERROR_INVALID_TYPE: &str = "invalid_type";
pub const ERROR_INVALID_URL: &str = "invalid_url";
pub const ERROR_INVALID_PORT: &str = "invalid_port";
pub const ERROR_INVALID_INTERVAL: &str = "invalid_interval";
pub const ERROR_INVALID_ENTITY_ID: &str = "invalid_entity_id";
pub const ERROR_WRONG_DOMAIN: &str = "wrong_domain";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
	String,
	Integer,
	Boolean,
	Entity { domain: &'static str },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FormField {
	pub key: &'static str,
	pub required: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub default: Option<Value>,
	pub kind: FieldKind,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<&'static str>,
}

impl FormField {
	fn required(key: &'static str, kind: FieldKind) -> Self {
		FormField {
			key,
			required: true,
			default: None,
			kind,
			description: None,
		}
	}

	fn optional(key: &'static str, kind: FieldKind) -> Self {
		FormField {
			required: false,
			..Self::required(key, kind)
		}
	}

	fn default(mut self, value: impl Into<Value>) -> Self {
		self.default = Some(value.into());
		self
	}

	fn describe(mut self, description: &'static str) -> Self {
		self.description = Some(description);
		self
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum FlowResult {
	ShowForm {
		step_id: &'static str,
		schema: Vec<FormField>,
		/// Field key to error code.
		errors: BTreeMap<String, String>,
	},
	CreateEntry {
		title: String,
		data: Map<String, Value>,
		options: Map<String, Value>,
	},
}

impl FlowResult {
	pub fn errors(&self) -> Option<&BTreeMap<String, String>> {
		match self {
			FlowResult::ShowForm { errors, .. } => Some(errors),
			FlowResult::CreateEntry { .. } => None,
		}
	}
}

fn device_kind() -> FieldKind {
	FieldKind::Entity {
		domain: DEVICE_TRACKER_DOMAIN,
	}
}

/// Initial setup of a new entry.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigFlow;

impl ConfigFlow {
	pub fn schema() -> Vec<FormField> {
		vec![
			FormField::required(CONF_URL, FieldKind::String).default(DEFAULT_URL),
			FormField::optional(CONF_PORT, FieldKind::Integer).default(DEFAULT_PORT),
			FormField::required(CONF_API_KEY, FieldKind::String),
			FormField::required(CONF_DEVICE, device_kind()),
			FormField::optional(CONF_INTERVAL_SECONDS, FieldKind::Integer)
				.default(DEFAULT_INTERVAL_SECONDS),
			FormField::optional(CONF_ENABLE_DEBUG_LOGGING, FieldKind::Boolean).default(false),
			FormField::optional(CONF_ENABLE_PUSH, FieldKind::Boolean).default(true),
			FormField::optional(CONF_FRIENDLY_NAME, FieldKind::String).default(DEFAULT_FRIENDLY_NAME),
		]
	}

	pub fn step_user(&self, input: Option<&Map<String, Value>>) -> FlowResult {
		let schema = Self::schema();
		let Some(input) = input else {
			return show_form(STEP_USER, schema, BTreeMap::new());
		};

		let mut values = match resolve(&schema, input) {
			Ok(values) => values,
			Err(errors) => return show_form(STEP_USER, schema, errors),
		};

		let mut take = |key: &str| values.remove(key).unwrap_or(Value::Null);
		let title = match take(CONF_FRIENDLY_NAME) {
			Value::String(name) => name,
			_ => DEFAULT_FRIENDLY_NAME.into(),
		};

		let data = Map::from_iter([
			(CONF_URL.to_owned(), take(CONF_URL)),
			(CONF_API_KEY.to_owned(), take(CONF_API_KEY)),
			(CONF_DEVICE.to_owned(), take(CONF_DEVICE)),
			(CONF_PORT.to_owned(), take(CONF_PORT)),
		]);

		let options = Map::from_iter([
			(CONF_INTERVAL_SECONDS.to_owned(), take(CONF_INTERVAL_SECONDS)),
			(CONF_ENABLE_DEBUG_LOGGING.to_owned(), take(CONF_ENABLE_DEBUG_LOGGING)),
			(CONF_ENABLE_PUSH.to_owned(), take(CONF_ENABLE_PUSH)),
			(CONF_FRIENDLY_NAME.to_owned(), Value::String(title.clone())),
		]);

		FlowResult::CreateEntry {
			title,
			data,
			options,
		}
	}
}

/// Edits the options of an existing entry. Every field is prefilled from the
/// entry's current settings.
#[derive(Clone, Debug)]
pub struct OptionsFlow {
	schema: Vec<FormField>,
}

impl OptionsFlow {
	pub fn new(entry: &ConfigEntry) -> Self {
		let current = |key: &str| {
			entry
				.options
				.get(key)
				.filter(|v| !v.is_null())
				.cloned()
		};

		let device = current(CONF_DEVICE).or_else(|| entry.data.get(CONF_DEVICE).cloned());
		let mut device_field = FormField::required(CONF_DEVICE, device_kind()).describe("Device to track");
		device_field.default = device;

		let schema = vec![
			device_field,
			FormField::required(CONF_ENABLE_PUSH, FieldKind::Boolean)
				.default(current(CONF_ENABLE_PUSH).unwrap_or(Value::Bool(true)))
				.describe("Enable automatic push updates"),
			FormField::required(CONF_INTERVAL_SECONDS, FieldKind::Integer)
				.default(current(CONF_INTERVAL_SECONDS).unwrap_or(Value::from(DEFAULT_INTERVAL_SECONDS)))
				.describe("Push interval in seconds"),
			FormField::required(CONF_ENABLE_DEBUG_LOGGING, FieldKind::Boolean)
				.default(current(CONF_ENABLE_DEBUG_LOGGING).unwrap_or(Value::Bool(false)))
				.describe("Enable debug logging"),
			FormField::required(CONF_FRIENDLY_NAME, FieldKind::String)
				.default(current(CONF_FRIENDLY_NAME).unwrap_or_else(|| Value::String(entry.title.clone())))
				.describe("Custom name for this Reitti instance"),
		];

		OptionsFlow { schema }
	}

	pub fn schema(&self) -> &[FormField] {
		&self.schema
	}

	/// On success the returned options replace the entry's options; the caller
	/// stores them and reloads the entry.
	pub fn step_init(&self, input: Option<&Map<String, Value>>) -> FlowResult {
		let Some(input) = input else {
			return show_form(STEP_INIT, self.schema.clone(), BTreeMap::new());
		};

		match resolve(&self.schema, input) {
			Err(errors) => show_form(STEP_INIT, self.schema.clone(), errors),
			Ok(options) => FlowResult::CreateEntry {
				title: match options.get(CONF_FRIENDLY_NAME) {
					Some(Value::String(name)) => name.clone(),
					_ => String::new(),
				},
				data: Map::new(),
				options,
			},
		}
	}
}

fn show_form(
	step_id: &'static str,
	schema: Vec<FormField>,
	errors: BTreeMap<String, String>,
) -> FlowResult {
	FlowResult::ShowForm {
		step_id,
		schema,
		errors,
	}
}

/// Applies defaults and checks every field of `schema`, collecting one error
/// code per failing field.
fn resolve(
	schema: &[FormField],
	input: &Map<String, Value>,
) -> Result<Map<String, Value>, BTreeMap<String, String>> {
	let mut values = Map::new();
	let mut errors = BTreeMap::new();

	for field in schema {
		let value = match input.get(field.key) {
			None | Some(Value::Null) => field.default.clone(),
			Some(value) => Some(value.clone()),
		};

		let Some(value) = value else {
			if field.required {
				errors.insert(field.key.to_owned(), ERROR_REQUIRED.to_owned());
			}
			continue;
		};

		match check(field, value) {
			Ok(value) => {
				values.insert(field.key.to_owned(), value);
			}
			Err(code) => {
				errors.insert(field.key.to_owned(), code.to_owned());
			}
		}
	}

	if errors.is_empty() {
		Ok(values)
	} else {
		Err(errors)
	}
}

fn check(field: &FormField, value: Value) -> Result<Value, &'static str> {
	match (&field.kind, value) {
		(FieldKind::String, Value::String(s)) => {
			let s = s.trim();
			if s.is_empty() {
				return Err(ERROR_REQUIRED);
			}

			if field.key == CONF_URL && !is_valid_base_url(s) {
				return Err(ERROR_INVALID_URL);
			}

			Ok(Value::String(s.to_owned()))
		}

		(FieldKind::Integer, Value::Number(n)) => {
			let Some(n) = n.as_u64() else {
				return Err(ERROR_INVALID_TYPE);
			};

			match field.key {
				CONF_PORT if n == 0 || n > u64::from(u16::MAX) => Err(ERROR_INVALID_PORT),
				CONF_INTERVAL_SECONDS if n == 0 || n > MAX_INTERVAL_SECONDS => Err(ERROR_INVALID_INTERVAL),
				_ => Ok(Value::from(n)),
			}
		}

		(FieldKind::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),

		(FieldKind::Entity { domain }, Value::String(s)) => {
			let id = EntityId::parse(s.trim()).map_err(|_| ERROR_INVALID_ENTITY_ID)?;
			if id.domain() != *domain {
				return Err(ERROR_WRONG_DOMAIN);
			}

			Ok(Value::String(id.into()))
		}

		_ => Err(ERROR_INVALID_TYPE),
	}
}

fn is_valid_base_url(url: &str) -> bool {
	Url::parse(&normalize_base_url(url)).is_ok_and(|url| url.has_host())
}
