mod attributes;
mod entity_id;
mod state;

pub use attributes::Attributes;
pub use entity_id::{EntityId, EntityIdError, EntityIdInvalidity};
pub use state::{EntityState, StateChanged};
