use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// State attributes of an entity, as the JSON object Home Assistant reports.
#[derive(Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Map<String, Value>);

impl Attributes {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}

	/// The attribute as a JSON number. Anything else (missing, `null`,
	/// strings) is `None`.
	pub fn number(&self, key: &str) -> Option<&Number> {
		match self.0.get(key) {
			Some(Value::Number(n)) => Some(n),
			_ => None,
		}
	}

	pub fn f64(&self, key: &str) -> Option<f64> {
		self.number(key).and_then(Number::as_f64)
	}

	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
		self.0.insert(key.into(), value.into())
	}

	pub fn remove(&mut self, key: &str) -> Option<Value> {
		self.0.remove(key)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v))
	}
}

impl fmt::Debug for Attributes {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.0.iter()).finish()
	}
}

impl From<Map<String, Value>> for Attributes {
	fn from(map: Map<String, Value>) -> Self {
		Attributes(map)
	}
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Attributes {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		Attributes(
			iter
				.into_iter()
				.map(|(k, v)| (k.into(), v.into()))
				.collect(),
		)
	}
}
