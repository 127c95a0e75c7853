use crate::tracker_id::{TrackerId, TrackerIdInvalidity};
use semval::{context::Context, Validate, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_json::Number;

/// A `location` report.
///
/// Optional numeric fields keep the JSON number they were read from, so an
/// integer accuracy goes back out as an integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
	/// Tracker ID shown next to the device.
	pub tid: TrackerId,

	/// Latitude in degrees (WGS-84).
	pub lat: f64,

	/// Longitude in degrees (WGS-84).
	pub lon: f64,

	/// Altitude above sea level in meters. Defaults to `0`.
	#[serde(default = "zero")]
	pub alt: Number,

	/// Accuracy radius in meters. Defaults to `0`.
	#[serde(default = "zero")]
	pub acc: Number,

	/// Velocity in km/h.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vel: Option<Number>,

	/// Course over ground in degrees.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cog: Option<Number>,

	/// Unix timestamp (seconds) of the fix.
	pub tst: i64,
}

fn zero() -> Number {
	Number::from(0u8)
}

impl Location {
	pub fn new(tid: TrackerId, lat: f64, lon: f64, tst: i64) -> Self {
		Location {
			tid,
			lat,
			lon,
			alt: zero(),
			acc: zero(),
			vel: None,
			cog: None,
			tst,
		}
	}

	pub fn altitude(mut self, alt: Number) -> Self {
		self.alt = alt;
		self
	}

	pub fn accuracy(mut self, acc: Number) -> Self {
		self.acc = acc;
		self
	}

	pub fn velocity(mut self, vel: Number) -> Self {
		self.vel = Some(vel);
		self
	}

	pub fn course(mut self, cog: Number) -> Self {
		self.cog = Some(cog);
		self
	}
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LocationInvalidity {
	TrackerId(TrackerIdInvalidity),
	Latitude,
	Longitude,
}

impl Validate for Location {
	type Invalidity = LocationInvalidity;

	fn validate(&self) -> ValidationResult<Self::Invalidity> {
		Context::new()
			.validate_with(&self.tid, LocationInvalidity::TrackerId)
			.invalidate_if(
				!self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat),
				LocationInvalidity::Latitude,
			)
			.invalidate_if(
				!self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon),
				LocationInvalidity::Longitude,
			)
			.into()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_matches::assert_matches;

	fn johns_phone() -> Location {
		Location::new(TrackerId::from_object_id("johns_phone"), 52.1, 4.3, 1_700_000_000)
	}

	#[test]
	fn defaults_altitude_and_accuracy_to_zero() {
		let location = johns_phone();
		assert_eq!(location.alt, Number::from(0));
		assert_eq!(location.acc, Number::from(0));
		assert_matches!(location.vel, None);
		assert_matches!(location.cog, None);
	}

	#[test]
	fn missing_optional_fields_deserialize_to_defaults() {
		let json = r#"{"tid":"JO","lat":52.1,"lon":4.3,"tst":1700000000}"#;
		let location: Location = serde_json::from_str(json).expect("should parse");
		assert_eq!(location, johns_phone());
	}

	#[test]
	fn valid_location() {
		assert!(johns_phone().validate().is_ok());
	}

	#[test]
	fn out_of_range_coordinates_are_invalid() {
		let mut location = johns_phone();
		location.lat = 91.0;
		location.lon = f64::NAN;

		let err: Vec<_> = location
			.validate()
			.expect_err("should be invalid")
			.into_iter()
			.collect();

		assert_eq!(
			&*err,
			&[LocationInvalidity::Latitude, LocationInvalidity::Longitude]
		)
	}

	#[test]
	fn invalid_tracker_id_is_reported() {
		let mut location = johns_phone();
		location.tid = TrackerId::from("");

		let err: Vec<_> = location
			.validate()
			.expect_err("should be invalid")
			.into_iter()
			.collect();

		assert_eq!(
			&*err,
			&[LocationInvalidity::TrackerId(TrackerIdInvalidity::Empty)]
		)
	}
}
