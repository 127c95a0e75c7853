use crate::{
	config::{ConfigError, PushConfig},
	entry::{CURRENT_VERSION, ConfigEntry, DOMAIN, SERVICE_PUSH_NOW},
	host::Host,
	push::{PushOutcome, Pusher},
	services::{ServiceCall, ServiceError, Services},
	trigger::{self, TriggerHandle, TriggerKind},
};
use futures::future::join_all;
use reitti_ingest_provider::{DynError, IngestClient, IngestProvider};
use serde_json::Value;
use std::{
	collections::{BTreeMap, btree_map},
	sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{Instrument, Level, debug, debug_span, error, info, instrument};

/// Service data field selecting a single entry for `push_now`.
pub const ATTR_ENTRY_ID: &str = "entry_id";

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SetupError {
	#[error("config entry has version {found}, expected {expected}")]
	Version { found: u32, expected: u32 },

	#[error("config entry '{entry_id}' is already loaded")]
	AlreadyLoaded { entry_id: String },

	#[error("invalid config entry")]
	Config {
		#[source]
		source: ConfigError,
	},

	#[error("failed to create ingest client using provider '{provider}'")]
	Client {
		provider: &'static str,
		#[source]
		source: DynError,
	},
}

impl SetupError {
	fn config(source: ConfigError) -> Self {
		Self::Config { source }
	}

	fn client<P: IngestProvider>(source: P::Error) -> Self {
		Self::Client {
			provider: P::NAME,
			source: DynError::new(source),
		}
	}
}

struct RunningInstance<H, C> {
	pusher: Arc<Pusher<H, C>>,
	interval: TriggerHandle,
	state_listener: TriggerHandle,
	shutdown_hook: TriggerHandle,
}

impl<H: Host, C: IngestClient> RunningInstance<H, C> {
	/// Stops every trigger, then closes the client if the shutdown hook has
	/// not already done so.
	async fn teardown(self) {
		let RunningInstance {
			pusher,
			interval,
			state_listener,
			shutdown_hook,
		} = self;

		interval.stop().await;
		state_listener.stop().await;
		shutdown_hook.stop().await;
		pusher.close().await;
	}
}

type Entries<H, C> = Mutex<BTreeMap<String, RunningInstance<H, C>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn spawn_push<H: Host, C: IngestClient>(
	pusher: &Arc<Pusher<H, C>>,
	trigger: TriggerKind,
) -> JoinHandle<PushOutcome> {
	let pusher = pusher.clone();
	let span = debug_span!("push", entry_id = %pusher.entry_id(), %trigger);
	tokio::spawn(async move { pusher.push().await }.instrument(span))
}

async fn push_entries<H: Host, C: IngestClient>(
	entries: &Entries<H, C>,
	entry_id: Option<&str>,
) -> Result<Vec<PushOutcome>, ServiceError> {
	let pushers: Vec<_> = {
		let entries = lock(entries);
		match entry_id {
			Some(entry_id) => {
				let instance = entries.get(entry_id).ok_or_else(|| ServiceError::UnknownEntry {
					entry_id: entry_id.to_owned(),
				})?;
				vec![instance.pusher.clone()]
			}
			None => entries.values().map(|instance| instance.pusher.clone()).collect(),
		}
	};

	let tasks = pushers
		.iter()
		.map(|pusher| spawn_push(pusher, TriggerKind::Manual));

	let outcomes = join_all(tasks)
		.await
		.into_iter()
		.map(|result| {
			result.unwrap_or_else(|e| {
				error!(error = %e, "push task failed");
				PushOutcome::Failed
			})
		})
		.collect();

	Ok(outcomes)
}

/// Registry of loaded config entries.
///
/// Each loaded entry owns one [`Pusher`] plus its triggers. The `push_now`
/// service is registered with the first loaded entry and removed with the
/// last.
pub struct Integration<H: Host, P: IngestProvider> {
	host: Arc<H>,
	provider: P,
	services: Services,
	entries: Arc<Entries<H, P::Client>>,
}

impl<H: Host, P: IngestProvider> Integration<H, P> {
	pub fn new(host: H, provider: P, services: Services) -> Self {
		Integration {
			host: Arc::new(host),
			provider,
			services,
			entries: Arc::new(Mutex::new(BTreeMap::new())),
		}
	}

	#[inline]
	pub fn host(&self) -> &H {
		&self.host
	}

	#[inline]
	pub fn services(&self) -> &Services {
		&self.services
	}

	pub fn is_loaded(&self, entry_id: &str) -> bool {
		lock(&self.entries).contains_key(entry_id)
	}

	pub fn loaded_entries(&self) -> Vec<String> {
		lock(&self.entries).keys().cloned().collect()
	}

	/// Current settings of a loaded entry.
	pub fn config(&self, entry_id: &str) -> Option<Arc<PushConfig>> {
		lock(&self.entries)
			.get(entry_id)
			.map(|instance| instance.pusher.config().clone())
	}

	#[instrument(
		level = Level::DEBUG,
		name = "Integration::setup_entry",
		skip_all,
		fields(entry_id = %entry.entry_id, provider = P::NAME),
	)]
	pub async fn setup_entry(&self, entry: &ConfigEntry) -> Result<(), SetupError> {
		if entry.version != CURRENT_VERSION {
			return Err(SetupError::Version {
				found: entry.version,
				expected: CURRENT_VERSION,
			});
		}

		if self.is_loaded(&entry.entry_id) {
			return Err(SetupError::AlreadyLoaded {
				entry_id: entry.entry_id.clone(),
			});
		}

		let config = Arc::new(PushConfig::from_entry(entry).map_err(SetupError::config)?);
		let client = self
			.provider
			.create(&*config)
			.await
			.map_err(SetupError::client::<P>)?;

		let pusher = Arc::new(Pusher::new(
			entry.entry_id.clone(),
			config.clone(),
			self.host.clone(),
			client,
		));

		let interval = trigger::spawn_interval(config.interval, {
			let pusher = pusher.clone();
			move || {
				let _ = spawn_push(&pusher, TriggerKind::Interval);
			}
		});

		let state_listener = trigger::spawn_state_listener(self.host.state_changes(&config.device), {
			let pusher = pusher.clone();
			move |_| {
				let _ = spawn_push(&pusher, TriggerKind::StateChange);
			}
		});

		let shutdown_hook = trigger::spawn_shutdown_hook(self.host.shutdown(), {
			let pusher = pusher.clone();
			move || async move {
				pusher.close().await;
			}
		});

		let instance = RunningInstance {
			pusher,
			interval,
			state_listener,
			shutdown_hook,
		};

		// Another setup of the same entry may have finished while the client
		// was being created.
		let rejected = match lock(&self.entries).entry(entry.entry_id.clone()) {
			btree_map::Entry::Occupied(_) => Some(instance),
			btree_map::Entry::Vacant(vacant) => {
				vacant.insert(instance);
				None
			}
		};

		if let Some(instance) = rejected {
			instance.teardown().await;
			return Err(SetupError::AlreadyLoaded {
				entry_id: entry.entry_id.clone(),
			});
		}

		self.register_push_now();

		info!(
			name = %config.name,
			entity_id = %config.device,
			interval = config.interval.as_secs(),
			debug = config.debug_logging,
			"set up location pusher",
		);

		Ok(())
	}

	/// Unloads `entry_id`. Unloading an entry that is not loaded succeeds
	/// without doing anything; the return value tells whether anything was
	/// torn down.
	#[instrument(level = Level::DEBUG, name = "Integration::unload_entry", skip(self))]
	pub async fn unload_entry(&self, entry_id: &str) -> bool {
		let Some(instance) = lock(&self.entries).remove(entry_id) else {
			debug!("config entry not loaded");
			return false;
		};

		instance.teardown().await;

		let last = lock(&self.entries).is_empty();
		if last {
			self.services.remove(DOMAIN, SERVICE_PUSH_NOW);
		}

		info!("unloaded location pusher");
		true
	}

	/// Unloads the entry, then sets it up again with `entry`'s current settings.
	pub async fn reload_entry(&self, entry: &ConfigEntry) -> Result<(), SetupError> {
		self.unload_entry(&entry.entry_id).await;
		self.setup_entry(entry).await
	}

	/// Unloads every loaded entry and returns how many there were.
	#[instrument(level = Level::DEBUG, name = "Integration::unload_all", skip_all)]
	pub async fn unload_all(&self) -> usize {
		let mut unloaded = 0;
		for entry_id in self.loaded_entries() {
			if self.unload_entry(&entry_id).await {
				unloaded += 1;
			}
		}

		unloaded
	}

	/// Pushes `entry_id` once, or every loaded entry when `None`.
	pub async fn push_now(&self, entry_id: Option<&str>) -> Result<Vec<PushOutcome>, ServiceError> {
		push_entries(&self.entries, entry_id).await
	}

	fn register_push_now(&self) {
		if self.services.has_service(DOMAIN, SERVICE_PUSH_NOW) {
			return;
		}

		let entries: Weak<Entries<H, P::Client>> = Arc::downgrade(&self.entries);
		self
			.services
			.register(DOMAIN, SERVICE_PUSH_NOW, move |call: ServiceCall| {
				let entries = entries.clone();
				async move {
					let entry_id = match call.data.get(ATTR_ENTRY_ID) {
						None | Some(Value::Null) => None,
						Some(Value::String(entry_id)) => Some(entry_id.clone()),
						Some(_) => {
							return Err(ServiceError::InvalidData {
								key: ATTR_ENTRY_ID,
								expected: "a string",
							});
						}
					};

					let Some(entries) = entries.upgrade() else {
						return Ok(());
					};

					let outcomes = push_entries(&entries, entry_id.as_deref()).await?;
					debug!(?outcomes, "push_now finished");
					Ok(())
				}
			});
	}
}
