use semval::{context::Context, Validate, ValidationResult};
use serde::{Deserialize, Serialize};
use std::{fmt, ops::Deref};

/// Two character code OwnTracks uses to tell devices apart on a map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackerId(String);

impl TrackerId {
	pub const MAX_CHARS: usize = 2;

	/// Takes the first two characters of an object id and upper-cases them,
	/// so `johns_phone` becomes `JO`.
	pub fn from_object_id(object_id: &str) -> Self {
		let prefix: String = object_id.chars().take(Self::MAX_CHARS).collect();
		TrackerId(prefix.to_uppercase())
	}

	#[inline]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Deref for TrackerId {
	type Target = str;

	#[inline]
	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl AsRef<str> for TrackerId {
	#[inline]
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl From<&str> for TrackerId {
	fn from(value: &str) -> Self {
		TrackerId(value.into())
	}
}

impl fmt::Display for TrackerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TrackerIdInvalidity {
	Empty,
	TooLong,
}

impl Validate for TrackerId {
	type Invalidity = TrackerIdInvalidity;

	fn validate(&self) -> ValidationResult<Self::Invalidity> {
		Context::new()
			.invalidate_if(self.0.is_empty(), TrackerIdInvalidity::Empty)
			.invalidate_if(
				self.0.chars().count() > Self::MAX_CHARS,
				TrackerIdInvalidity::TooLong,
			)
			.into()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_test::{assert_tokens, Token};

	#[test]
	fn takes_first_two_characters_upper_cased() {
		assert_eq!(TrackerId::from_object_id("johns_phone").as_str(), "JO");
		assert_eq!(TrackerId::from_object_id("pixel_7").as_str(), "PI");
	}

	#[test]
	fn short_object_id_keeps_what_is_there() {
		let tid = TrackerId::from_object_id("x");
		assert_eq!(tid.as_str(), "X");
		assert!(tid.validate().is_ok());
	}

	#[test]
	fn empty_tracker_id_is_invalid() {
		let err: Vec<_> = TrackerId::from_object_id("")
			.validate()
			.expect_err("should be invalid")
			.into_iter()
			.collect();

		assert_eq!(&*err, &[TrackerIdInvalidity::Empty])
	}

	#[test]
	fn long_tracker_id_is_invalid() {
		let err: Vec<_> = TrackerId::from("ABC")
			.validate()
			.expect_err("should be invalid")
			.into_iter()
			.collect();

		assert_eq!(&*err, &[TrackerIdInvalidity::TooLong])
	}

	#[test]
	fn serde_as_string() {
		assert_tokens(&TrackerId::from("JO"), &[Token::Str("JO")])
	}
}
