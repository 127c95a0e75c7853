use crate::host::Host;
use async_trait::async_trait;
use futures::{
	FutureExt, StreamExt,
	future::BoxFuture,
	stream::BoxStream,
};
use hass_entity_state::{EntityId, EntityState, StateChanged};
use std::{
	collections::BTreeMap,
	convert::Infallible,
	sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::watch;
use tracing::trace;

/// An in-process [`Host`] holding entity states in a map.
///
/// Cloning is cheap and every clone shares the same state machine.
#[derive(Clone)]
pub struct MemoryHost {
	inner: Arc<Inner>,
}

struct Inner {
	states: Mutex<BTreeMap<EntityId, EntityState>>,
	listeners: Mutex<Vec<(EntityId, flume::Sender<StateChanged>)>>,
	stopped: watch::Sender<bool>,
}

impl Default for MemoryHost {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryHost {
	pub fn new() -> Self {
		let (stopped, _) = watch::channel(false);
		MemoryHost {
			inner: Arc::new(Inner {
				states: Mutex::new(BTreeMap::new()),
				listeners: Mutex::new(Vec::new()),
				stopped,
			}),
		}
	}

	/// Stores `state` and notifies listeners of its entity.
	pub fn set_state(&self, state: EntityState) {
		let entity_id = state.entity_id.clone();
		let old_state = self
			.inner
			.states
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(entity_id.clone(), state.clone());

		self.notify(StateChanged {
			entity_id,
			old_state,
			new_state: Some(state),
		});
	}

	pub fn remove_state(&self, entity_id: &EntityId) -> Option<EntityState> {
		let old_state = self
			.inner
			.states
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(entity_id);

		if old_state.is_some() {
			self.notify(StateChanged {
				entity_id: entity_id.clone(),
				old_state: old_state.clone(),
				new_state: None,
			});
		}

		old_state
	}

	/// Fires the shutdown event and ends every state change stream.
	pub fn stop(&self) {
		self
			.inner
			.listeners
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clear();

		self.inner.stopped.send_replace(true);
	}

	pub fn is_stopped(&self) -> bool {
		*self.inner.stopped.borrow()
	}

	/// Number of open state change streams.
	pub fn listener_count(&self) -> usize {
		let mut listeners = self
			.inner
			.listeners
			.lock()
			.unwrap_or_else(PoisonError::into_inner);

		listeners.retain(|(_, sender)| !sender.is_disconnected());
		listeners.len()
	}

	fn notify(&self, event: StateChanged) {
		let mut listeners = self
			.inner
			.listeners
			.lock()
			.unwrap_or_else(PoisonError::into_inner);

		listeners.retain(|(entity_id, sender)| {
			if *entity_id != event.entity_id {
				return !sender.is_disconnected();
			}

			sender.send(event.clone()).is_ok()
		});

		trace!(entity_id = %event.entity_id, listeners = listeners.len(), "state changed");
	}
}

#[async_trait]
impl Host for MemoryHost {
	type StateError = Infallible;
	type StateChanges = BoxStream<'static, StateChanged>;
	type Shutdown = BoxFuture<'static, ()>;

	async fn state(&self, entity_id: &EntityId) -> Result<Option<EntityState>, Self::StateError> {
		Ok(
			self
				.inner
				.states
				.lock()
				.unwrap_or_else(PoisonError::into_inner)
				.get(entity_id)
				.cloned(),
		)
	}

	fn state_changes(&self, entity_id: &EntityId) -> Self::StateChanges {
		let (sender, receiver) = flume::unbounded();
		if !self.is_stopped() {
			self
				.inner
				.listeners
				.lock()
				.unwrap_or_else(PoisonError::into_inner)
				.push((entity_id.clone(), sender));
		}

		receiver.into_stream().boxed()
	}

	fn shutdown(&self) -> Self::Shutdown {
		let mut stopped = self.inner.stopped.subscribe();
		async move {
			// An error means the host was dropped, which counts as stopped.
			let _ = stopped.wait_for(|stopped| *stopped).await;
		}
		.boxed()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn phone() -> EntityId {
		EntityId::parse("device_tracker.johns_phone").unwrap()
	}

	#[tokio::test]
	async fn stores_and_removes_states() {
		let host = MemoryHost::new();
		assert_eq!(host.state(&phone()).await.unwrap(), None);

		host.set_state(EntityState::new(phone(), "home").attribute("latitude", 52.1));
		let state = host.state(&phone()).await.unwrap().expect("state should exist");
		assert_eq!(state.attributes.f64("latitude"), Some(52.1));

		assert!(host.remove_state(&phone()).is_some());
		assert_eq!(host.state(&phone()).await.unwrap(), None);
	}

	#[tokio::test]
	async fn notifies_listeners_of_the_entity_only() {
		let host = MemoryHost::new();
		let mut changes = host.state_changes(&phone());
		let other = EntityId::parse("device_tracker.janes_phone").unwrap();

		host.set_state(EntityState::new(other, "home"));
		host.set_state(EntityState::new(phone(), "home"));
		host.set_state(EntityState::new(phone(), "not_home"));

		let first = changes.next().await.expect("should receive event");
		assert_eq!(first.entity_id, phone());
		assert_eq!(first.old_state, None);

		let second = changes.next().await.expect("should receive event");
		assert_eq!(second.old_state.map(|s| s.state), Some("home".to_owned()));
		assert_eq!(second.new_state.map(|s| s.state), Some("not_home".to_owned()));
	}

	#[tokio::test]
	async fn stop_ends_streams_and_fires_shutdown() {
		let host = MemoryHost::new();
		let mut changes = host.state_changes(&phone());
		let shutdown = host.shutdown();

		host.stop();
		assert!(host.is_stopped());
		assert_eq!(changes.next().await, None);
		shutdown.await;

		// Late subscribers see a stopped host immediately.
		assert_eq!(host.state_changes(&phone()).next().await, None);
		host.shutdown().await;
		assert_eq!(host.listener_count(), 0);
	}

	#[tokio::test]
	async fn dropped_streams_are_pruned() {
		let host = MemoryHost::new();
		let changes = host.state_changes(&phone());
		assert_eq!(host.listener_count(), 1);

		drop(changes);
		assert_eq!(host.listener_count(), 0);
	}
}
