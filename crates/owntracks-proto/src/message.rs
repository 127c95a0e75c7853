use crate::location::Location;
use serde::{Deserialize, Serialize};

/// Top level OwnTracks message, discriminated by the `_type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type", rename_all = "lowercase")]
#[non_exhaustive]
pub enum Message {
	Location(Location),
}

impl From<Location> for Message {
	fn from(location: Location) -> Self {
		Message::Location(location)
	}
}

impl Message {
	pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
		serde_json::to_vec(self)
	}
}
