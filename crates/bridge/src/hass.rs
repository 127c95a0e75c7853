use async_trait::async_trait;
use futures::{
	FutureExt, StreamExt,
	future::BoxFuture,
	stream::BoxStream,
};
use hass_entity_state::{EntityId, EntityState, StateChanged};
use reitti_pusher::Host;
use reqwest::StatusCode;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
	select,
	sync::watch,
	time::{self, MissedTickBehavior},
};
use tracing::{Instrument, Level, debug, debug_span, instrument, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum HassError {
	#[error("home-assistant URL '{url}' cannot have a path")]
	BaseUrl { url: Url },

	#[error("failed to create HTTP client")]
	Client {
		#[source]
		source: reqwest::Error,
	},

	#[error("failed to fetch state of {entity_id}")]
	Request {
		entity_id: EntityId,
		#[source]
		source: reqwest::Error,
	},

	#[error("fetching state of {entity_id} returned status {status}")]
	Status {
		entity_id: EntityId,
		status: StatusCode,
	},

	#[error("failed to parse state of {entity_id}")]
	Body {
		entity_id: EntityId,
		#[source]
		source: reqwest::Error,
	},
}

/// A [`Host`] backed by the home-assistant REST API.
///
/// State changes are detected by polling `/api/states/<entity_id>` and
/// comparing `last_updated`.
#[derive(Clone)]
pub struct HassRestHost {
	inner: Arc<Inner>,
}

struct Inner {
	http: reqwest::Client,
	base: Url,
	token: String,
	poll_interval: Duration,
	stopped: watch::Sender<bool>,
}

impl HassRestHost {
	pub fn new(base: Url, token: impl Into<String>, poll_interval: Duration) -> Result<Self, HassError> {
		if base.cannot_be_a_base() {
			return Err(HassError::BaseUrl { url: base });
		}

		let http = reqwest::Client::builder()
			.timeout(Duration::from_secs(10))
			.build()
			.map_err(|source| HassError::Client { source })?;

		let (stopped, _) = watch::channel(false);
		Ok(HassRestHost {
			inner: Arc::new(Inner {
				http,
				base,
				token: token.into(),
				poll_interval,
				stopped,
			}),
		})
	}

	/// Fires the shutdown event and ends every polling task.
	pub fn stop(&self) {
		self.inner.stopped.send_replace(true);
	}

	fn state_url(&self, entity_id: &EntityId) -> Url {
		let mut url = self.inner.base.clone();
		if let Ok(mut segments) = url.path_segments_mut() {
			segments
				.pop_if_empty()
				.extend(["api", "states", entity_id.as_str()]);
		}

		url
	}

	async fn fetch(&self, entity_id: &EntityId) -> Result<Option<EntityState>, HassError> {
		let response = self
			.inner
			.http
			.get(self.state_url(entity_id))
			.bearer_auth(&self.inner.token)
			.send()
			.await
			.map_err(|source| HassError::Request {
				entity_id: entity_id.clone(),
				source,
			})?;

		match response.status() {
			StatusCode::NOT_FOUND => Ok(None),
			status if status.is_success() => {
				let state = response.json().await.map_err(|source| HassError::Body {
					entity_id: entity_id.clone(),
					source,
				})?;
				Ok(Some(state))
			}
			status => Err(HassError::Status {
				entity_id: entity_id.clone(),
				status,
			}),
		}
	}

	async fn poll(self, entity_id: EntityId, changes: flume::Sender<StateChanged>) {
		let mut stopped = self.inner.stopped.subscribe();
		let mut ticks = time::interval(self.inner.poll_interval);
		ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

		// The first poll only records where we start from.
		let mut last = match self.fetch(&entity_id).await {
			Ok(state) => state,
			Err(e) => {
				warn!(error = %e, "initial state poll failed");
				None
			}
		};

		loop {
			select! {
				biased;
				_ = stopped.wait_for(|stopped| *stopped) => break,
				_ = ticks.tick() => {}
			}

			if changes.is_disconnected() {
				break;
			}

			let current = match self.fetch(&entity_id).await {
				Ok(state) => state,
				Err(e) => {
					debug!(error = %e, "state poll failed");
					continue;
				}
			};

			if !has_changed(last.as_ref(), current.as_ref()) {
				continue;
			}

			let event = StateChanged {
				entity_id: entity_id.clone(),
				old_state: last.take(),
				new_state: current.clone(),
			};
			last = current;

			if changes.send(event).is_err() {
				break;
			}
		}

		debug!("stopped polling");
	}
}

fn has_changed(old: Option<&EntityState>, new: Option<&EntityState>) -> bool {
	match (old, new) {
		(None, None) => false,
		(Some(old), Some(new)) => match (&old.last_updated, &new.last_updated) {
			(Some(old), Some(new)) => old != new,
			_ => old != new,
		},
		_ => true,
	}
}

#[async_trait]
impl Host for HassRestHost {
	type StateError = HassError;
	type StateChanges = BoxStream<'static, StateChanged>;
	type Shutdown = BoxFuture<'static, ()>;

	#[instrument(level = Level::TRACE, name = "HassRestHost::state", skip(self))]
	async fn state(&self, entity_id: &EntityId) -> Result<Option<EntityState>, Self::StateError> {
		self.fetch(entity_id).await
	}

	fn state_changes(&self, entity_id: &EntityId) -> Self::StateChanges {
		let (sender, receiver) = flume::unbounded();
		if !*self.inner.stopped.borrow() {
			let span = debug_span!("poll", %entity_id);
			tokio::spawn(self.clone().poll(entity_id.clone(), sender).instrument(span));
		}

		receiver.into_stream().boxed()
	}

	fn shutdown(&self) -> Self::Shutdown {
		let mut stopped = self.inner.stopped.subscribe();
		async move {
			let _ = stopped.wait_for(|stopped| *stopped).await;
		}
		.boxed()
	}
}
