//! Forwards the location of a Home Assistant device tracker to a Reitti server.
//!
//! An [`Integration`] loads [`ConfigEntry`]s. Every loaded entry pushes the
//! tracked entity's location on a fixed interval, on every state change of the
//! entity, and when the `reitti.push_now` service is called.

pub mod config;
pub mod entry;
pub mod flow;
pub mod host;
pub mod memory;
pub mod push;
pub mod services;
pub mod trigger;

mod integration;
mod migrate;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, PushConfig, PushConfigInvalidity};
pub use entry::ConfigEntry;
pub use flow::{ConfigFlow, FlowResult, OptionsFlow};
pub use host::Host;
pub use integration::{ATTR_ENTRY_ID, Integration, SetupError};
pub use memory::MemoryHost;
pub use migrate::migrate_entry;
pub use push::{PushOutcome, Pusher};
pub use services::{ServiceCall, ServiceError, Services};

static_assertions::assert_impl_all!(PushConfig: Send, Sync);
static_assertions::assert_impl_all!(MemoryHost: Host, Clone);
static_assertions::assert_impl_all!(Services: Send, Sync, Clone);
