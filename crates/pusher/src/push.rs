use crate::{config::redacted, host::Host, PushConfig};
use hass_entity_state::EntityState;
use reitti_ingest_provider::{DynError, IngestClient};
use reitti_owntracks_proto::{Location, Message, TrackerId};
use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::{SystemTime, UNIX_EPOCH},
};
use tracing::{Level, debug, error, info, instrument, warn};

pub const ATTR_LATITUDE: &str = "latitude";
pub const ATTR_LONGITUDE: &str = "longitude";
pub const ATTR_ALTITUDE: &str = "altitude";
pub const ATTR_GPS_ACCURACY: &str = "gps_accuracy";
pub const ATTR_SPEED: &str = "speed";
pub const ATTR_COURSE: &str = "course";

/// What happened to one push attempt. No outcome is an error for the caller;
/// each one has already been logged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
	Disabled,
	EntityUnavailable,
	MissingCoordinates,
	Delivered { status: u16 },
	Rejected { status: u16 },
	Failed,
}

impl PushOutcome {
	#[inline]
	pub fn is_delivered(&self) -> bool {
		matches!(self, PushOutcome::Delivered { .. })
	}
}

/// Builds the OwnTracks location for `state`, or `None` if the entity has no
/// numeric latitude and longitude.
pub fn location_from_state(state: &EntityState, tst: i64) -> Option<Location> {
	let attributes = &state.attributes;
	let lat = attributes.f64(ATTR_LATITUDE)?;
	let lon = attributes.f64(ATTR_LONGITUDE)?;

	let mut location = Location::new(TrackerId::from_object_id(state.object_id()), lat, lon, tst);
	if let Some(alt) = attributes.number(ATTR_ALTITUDE) {
		location = location.altitude(alt.clone());
	}
	if let Some(acc) = attributes.number(ATTR_GPS_ACCURACY) {
		location = location.accuracy(acc.clone());
	}
	if let Some(vel) = attributes.number(ATTR_SPEED) {
		location = location.velocity(vel.clone());
	}
	if let Some(cog) = attributes.number(ATTR_COURSE) {
		location = location.course(cog.clone());
	}

	Some(location)
}

fn unix_now() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|since| i64::try_from(since.as_secs()).unwrap_or(i64::MAX))
		.unwrap_or_default()
}

/// The push action of one loaded entry.
///
/// Every trigger funnels into [`Pusher::push`]. The pusher owns the entry's
/// ingest client and closes it at most once.
pub struct Pusher<H, C> {
	entry_id: String,
	config: Arc<PushConfig>,
	host: Arc<H>,
	client: C,
	closed: AtomicBool,
}

impl<H: Host, C: IngestClient> Pusher<H, C> {
	pub fn new(entry_id: impl Into<String>, config: Arc<PushConfig>, host: Arc<H>, client: C) -> Self {
		Pusher {
			entry_id: entry_id.into(),
			config,
			host,
			client,
			closed: AtomicBool::new(false),
		}
	}

	#[inline]
	pub fn entry_id(&self) -> &str {
		&self.entry_id
	}

	#[inline]
	pub fn config(&self) -> &Arc<PushConfig> {
		&self.config
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	#[instrument(
		level = Level::DEBUG,
		name = "Pusher::push",
		skip_all,
		fields(entry_id = %self.entry_id, entity_id = %self.config.device),
	)]
	pub async fn push(&self) -> PushOutcome {
		let config = &*self.config;
		if !config.push_enabled {
			debug!("push disabled, skipping");
			return PushOutcome::Disabled;
		}

		let state = match self.host.state(&config.device).await {
			Ok(Some(state)) => state,
			Ok(None) => {
				warn!("device state not found");
				return PushOutcome::EntityUnavailable;
			}
			Err(e) => {
				warn!(error = %DynError::new(e).chain(), "failed to read device state");
				return PushOutcome::EntityUnavailable;
			}
		};

		let Some(location) = location_from_state(&state, unix_now()) else {
			warn!("device has no latitude/longitude");
			return PushOutcome::MissingCoordinates;
		};

		let payload = match Message::from(location).to_vec() {
			Ok(payload) => payload,
			Err(e) => {
				error!(error = %e, "failed to serialize location");
				return PushOutcome::Failed;
			}
		};

		if config.debug_logging {
			debug!(
				url = %redacted(self.client.endpoint()),
				payload = %String::from_utf8_lossy(&payload),
				"pushing location",
			);
		}

		match tokio::time::timeout(config.timeout, self.client.post(payload)).await {
			Ok(Ok(response)) if response.is_accepted() => {
				info!(status = response.status, "pushed location");
				if config.debug_logging {
					debug!(body = %response.body, "response body");
				}

				PushOutcome::Delivered {
					status: response.status,
				}
			}
			Ok(Ok(response)) => {
				warn!(status = response.status, body = %response.body, "push rejected");
				PushOutcome::Rejected {
					status: response.status,
				}
			}
			Ok(Err(e)) => {
				error!(error = %DynError::new(e).chain(), "error pushing location");
				PushOutcome::Failed
			}
			Err(_) => {
				error!(timeout = ?config.timeout, "timed out pushing location");
				PushOutcome::Failed
			}
		}
	}

	/// Closes the ingest client. Returns `false` if it was already closed.
	#[instrument(level = Level::DEBUG, name = "Pusher::close", skip_all, fields(entry_id = %self.entry_id))]
	pub async fn close(&self) -> bool {
		if self.closed.swap(true, Ordering::AcqRel) {
			return false;
		}

		if let Err(e) = self.client.close().await {
			warn!(error = %DynError::new(e).chain(), "failed to close ingest client");
		}

		debug!("closed ingest client");
		true
	}
}
