use async_trait::async_trait;
use futures::Stream;
use hass_entity_state::{EntityId, EntityState, StateChanged};
use std::{error::Error, future::Future};

/// The home automation runtime a pusher runs inside of.
///
/// The host owns the entity state machine. Pushers only ever read from it.
#[async_trait]
pub trait Host: Send + Sync + 'static {
	type StateError: Error + Send + Sync + 'static;
	type StateChanges: Stream<Item = StateChanged> + Send + Unpin + 'static;
	type Shutdown: Future<Output = ()> + Send + 'static;

	/// Current state of `entity_id`, or `None` if the entity does not exist
	/// (yet).
	async fn state(&self, entity_id: &EntityId) -> Result<Option<EntityState>, Self::StateError>;

	/// Every change of `entity_id` from now on. The stream ends when the host
	/// stops.
	fn state_changes(&self, entity_id: &EntityId) -> Self::StateChanges;

	/// Resolves once, when the host stops.
	fn shutdown(&self) -> Self::Shutdown;
}
