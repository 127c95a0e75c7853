use semval::{context::Context, Validate, ValidationResult};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};
use thiserror::Error;

/// An entity id in `<domain>.<object_id>` form, e.g. `device_tracker.johns_phone`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(Arc<str>);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntityIdInvalidity {
	Empty,
	MissingDomain,
	EmptyDomain,
	EmptyObjectId,
	IllegalCharacter,
}

#[derive(Debug, Clone, Error)]
#[error("invalid entity id '{value}': {invalidities:?}")]
pub struct EntityIdError {
	value: String,
	invalidities: Vec<EntityIdInvalidity>,
}

impl EntityIdError {
	pub fn invalidities(&self) -> &[EntityIdInvalidity] {
		&self.invalidities
	}
}

impl EntityId {
	pub fn parse(value: impl Into<String>) -> Result<Self, EntityIdError> {
		let value = value.into();
		let id = EntityId(Arc::from(&*value));
		match id.validate() {
			Ok(()) => Ok(id),
			Err(invalidities) => Err(EntityIdError {
				value,
				invalidities: invalidities.into_iter().collect(),
			}),
		}
	}

	#[inline]
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// The part before the first `.`, e.g. `device_tracker`.
	pub fn domain(&self) -> &str {
		self.split().0
	}

	/// The part after the first `.`, e.g. `johns_phone`.
	pub fn object_id(&self) -> &str {
		self.split().1
	}

	fn split(&self) -> (&str, &str) {
		self.0.split_once('.').unwrap_or(("", &self.0))
	}
}

impl Validate for EntityId {
	type Invalidity = EntityIdInvalidity;

	fn validate(&self) -> ValidationResult<Self::Invalidity> {
		let legal = |c: char| matches!(c, 'a'..='z' | '0'..='9' | '_');
		let context = Context::new().invalidate_if(self.0.is_empty(), EntityIdInvalidity::Empty);

		let context = match self.0.split_once('.') {
			None => context.invalidate_if(!self.0.is_empty(), EntityIdInvalidity::MissingDomain),
			Some((domain, object_id)) => context
				.invalidate_if(domain.is_empty(), EntityIdInvalidity::EmptyDomain)
				.invalidate_if(object_id.is_empty(), EntityIdInvalidity::EmptyObjectId)
				.invalidate_if(
					!domain.chars().all(legal) || !object_id.chars().all(legal),
					EntityIdInvalidity::IllegalCharacter,
				),
		};

		context.into()
	}
}

impl FromStr for EntityId {
	type Err = EntityIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		EntityId::parse(s)
	}
}

impl TryFrom<String> for EntityId {
	type Error = EntityIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		EntityId::parse(value)
	}
}

impl From<EntityId> for String {
	fn from(value: EntityId) -> Self {
		value.0.as_ref().into()
	}
}

impl AsRef<str> for EntityId {
	#[inline]
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for EntityId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&*self.0, f)
	}
}

impl fmt::Display for EntityId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_test::{assert_de_tokens_error, assert_tokens, Token};

	#[test]
	fn splits_domain_and_object_id() {
		let id = EntityId::parse("device_tracker.johns_phone").expect("should parse");
		assert_eq!(id.domain(), "device_tracker");
		assert_eq!(id.object_id(), "johns_phone");
	}

	#[test]
	fn object_id_may_not_contain_dots() {
		let id = EntityId::parse("sensor.a.b");
		assert!(id.is_err());
	}

	#[test]
	fn missing_domain_is_invalid() {
		let err = EntityId::parse("johns_phone").expect_err("should be invalid");
		assert_eq!(err.invalidities(), &[EntityIdInvalidity::MissingDomain]);
	}

	#[test]
	fn empty_is_invalid() {
		let err = EntityId::parse("").expect_err("should be invalid");
		assert_eq!(err.invalidities(), &[EntityIdInvalidity::Empty]);
	}

	#[test]
	fn empty_parts_are_invalid() {
		let err = EntityId::parse(".").expect_err("should be invalid");
		assert_eq!(
			err.invalidities(),
			&[EntityIdInvalidity::EmptyDomain, EntityIdInvalidity::EmptyObjectId]
		);
	}

	#[test]
	fn upper_case_is_invalid() {
		let err = EntityId::parse("device_tracker.Johns_Phone").expect_err("should be invalid");
		assert_eq!(err.invalidities(), &[EntityIdInvalidity::IllegalCharacter]);
	}

	#[test]
	fn serde_as_string() {
		assert_tokens(
			&EntityId::parse("device_tracker.johns_phone").unwrap(),
			&[Token::Str("device_tracker.johns_phone")],
		)
	}

	#[test]
	fn deserialize_rejects_invalid_ids() {
		assert_de_tokens_error::<EntityId>(
			&[Token::Str("nope")],
			"invalid entity id 'nope': [MissingDomain]",
		)
	}
}
