use crate::{Attributes, EntityId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A snapshot of one entity in the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
	pub entity_id: EntityId,

	/// The state string, e.g. `home` or `not_home` for a device tracker.
	pub state: String,

	#[serde(default)]
	pub attributes: Attributes,

	/// ISO 8601 time the state string last changed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_changed: Option<String>,

	/// ISO 8601 time the state or any attribute last changed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_updated: Option<String>,
}

impl EntityState {
	pub fn new(entity_id: EntityId, state: impl Into<String>) -> Self {
		EntityState {
			entity_id,
			state: state.into(),
			attributes: Attributes::new(),
			last_changed: None,
			last_updated: None,
		}
	}

	pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.attributes.insert(key, value);
		self
	}

	pub fn attributes(mut self, attributes: Attributes) -> Self {
		self.attributes = attributes;
		self
	}

	#[inline]
	pub fn object_id(&self) -> &str {
		self.entity_id.object_id()
	}
}

/// Emitted whenever the state or attributes of an entity change.
///
/// `old_state` is `None` for a newly added entity and `new_state` is `None`
/// for a removed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChanged {
	pub entity_id: EntityId,
	pub old_state: Option<EntityState>,
	pub new_state: Option<EntityState>,
}
