mod cli;
mod hass;
mod store;

use crate::{
	cli::{AddArgs, Cli, Command, OptionsArgs, RunArgs},
	hass::HassRestHost,
	store::EntryStore,
};
use clap::Parser;
use color_eyre::eyre::{Result, bail, eyre};
use reitti_ingest_provider::DynError;
use reitti_ingest_provider_reqwest::ReqwestIngest;
use reitti_pusher::{
	ConfigEntry, ConfigFlow, FlowResult, Integration, OptionsFlow, PushConfig, Services,
	config::redacted,
	entry::{DOMAIN, SERVICE_PUSH_NOW},
};
use serde_json::Map;
use std::{
	collections::BTreeMap,
	io,
	path::{Path, PathBuf},
};
use tracing::{error, info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, Registry, prelude::*};
use tracing_tree::HierarchicalLayer;
use uuid::Uuid;

type Bridge = Integration<HassRestHost, ReqwestIngest>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
	Registry::default()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with(
			HierarchicalLayer::new(2)
				.with_targets(true)
				.with_bracketed_fields(true),
		)
		.with(ErrorLayer::default())
		.init();
	color_eyre::install()?;

	let cli = Cli::parse();
	let store_path = match cli.store {
		Some(path) => path,
		None => EntryStore::default_path()
			.ok_or_else(|| eyre!("no config directory found, pass --store"))?,
	};

	match cli.command {
		Command::Run(args) => run(store_path, args).await,
		Command::Add(args) => add(&store_path, args),
		Command::Options(args) => options(&store_path, args),
		Command::List => list(&store_path),
		Command::Remove { entry_id } => remove(&store_path, &entry_id),
	}
}

async fn run(store_path: PathBuf, args: RunArgs) -> Result<()> {
	let store = EntryStore::load(&store_path)?;
	let host = HassRestHost::new(args.hass_url.clone(), &args.hass_token, args.poll_interval())?;
	let bridge = Integration::new(host.clone(), ReqwestIngest, Services::new());

	for entry in store.entries() {
		setup(&bridge, entry).await;
	}

	if bridge.loaded_entries().is_empty() {
		warn!(store = %store_path.display(), "no entries loaded, add one or send SIGHUP after editing the store");
	}

	let mut signals = Signals::new()?;
	loop {
		match signals.recv().await {
			Event::Stop => break,
			Event::Reload => reload(&bridge, &store_path).await,
			Event::PushNow => {
				if let Err(e) = bridge.services().call(DOMAIN, SERVICE_PUSH_NOW, Map::new()).await {
					warn!(error = %e, "push_now failed");
				}
			}
		}
	}

	info!("shutting down");
	host.stop();
	let unloaded = bridge.unload_all().await;
	info!(unloaded, "stopped");
	Ok(())
}

async fn setup(bridge: &Bridge, entry: &ConfigEntry) {
	if let Err(e) = bridge.setup_entry(entry).await {
		error!(entry_id = %entry.entry_id, error = %DynError::new(e).chain(), "failed to set up entry");
	}
}

/// Brings the loaded entries in line with the store on disk. Entries whose
/// settings did not change keep running untouched.
async fn reload(bridge: &Bridge, store_path: &Path) {
	let store = match EntryStore::load(store_path) {
		Ok(store) => store,
		Err(e) => {
			error!(error = %DynError::new(e).chain(), "failed to reload store");
			return;
		}
	};

	for entry_id in bridge.loaded_entries() {
		if store.get(&entry_id).is_none() {
			bridge.unload_entry(&entry_id).await;
		}
	}

	for entry in store.entries() {
		let Some(running) = bridge.config(&entry.entry_id) else {
			setup(bridge, entry).await;
			continue;
		};

		let unchanged = PushConfig::from_entry(entry).is_ok_and(|config| config == *running);
		if unchanged {
			continue;
		}

		if let Err(e) = bridge.reload_entry(entry).await {
			error!(entry_id = %entry.entry_id, error = %DynError::new(e).chain(), "failed to reload entry");
		}
	}

	info!(loaded = bridge.loaded_entries().len(), "reloaded store");
}

fn add(store_path: &Path, args: AddArgs) -> Result<()> {
	let mut store = EntryStore::load(store_path)?;

	let entry = match ConfigFlow.step_user(Some(&args.input())) {
		FlowResult::CreateEntry {
			title,
			data,
			options,
		} => ConfigEntry::new(Uuid::new_v4().simple().to_string(), title, data, options),
		FlowResult::ShowForm { errors, .. } => return Err(form_errors(&errors)),
	};

	println!("{}", entry.entry_id);
	store.insert(entry);
	store.save()?;
	Ok(())
}

fn options(store_path: &Path, args: OptionsArgs) -> Result<()> {
	let mut store = EntryStore::load(store_path)?;
	let Some(entry) = store.get_mut(&args.entry_id) else {
		bail!("no entry '{}'", args.entry_id);
	};

	match OptionsFlow::new(entry).step_init(Some(&args.input())) {
		FlowResult::CreateEntry { options, .. } => entry.update_options(options),
		FlowResult::ShowForm { errors, .. } => return Err(form_errors(&errors)),
	}

	store.save()?;
	Ok(())
}

fn list(store_path: &Path) -> Result<()> {
	let store = EntryStore::load(store_path)?;
	for entry in store.entries() {
		let config = match PushConfig::from_entry(entry) {
			Ok(config) => config,
			Err(e) => {
				println!("{}\t{}\tinvalid: {e}", entry.entry_id, entry.title);
				continue;
			}
		};

		let endpoint = config
			.endpoint()
			.map(|url| redacted(&url).to_string())
			.unwrap_or_else(|e| format!("invalid: {e}"));

		println!(
			"{}\t{}\t{}\t{}\tevery {}s{}",
			entry.entry_id,
			config.name,
			config.device,
			endpoint,
			config.interval.as_secs(),
			if config.push_enabled { "" } else { " (disabled)" },
		);
	}

	Ok(())
}

fn remove(store_path: &Path, entry_id: &str) -> Result<()> {
	let mut store = EntryStore::load(store_path)?;
	if store.remove(entry_id).is_none() {
		bail!("no entry '{entry_id}'");
	}

	store.save()?;
	Ok(())
}

fn form_errors(errors: &BTreeMap<String, String>) -> color_eyre::Report {
	let fields = errors
		.iter()
		.map(|(key, code)| format!("{key}: {code}"))
		.collect::<Vec<_>>()
		.join(", ");

	eyre!("invalid settings ({fields})")
}

enum Event {
	Stop,
	Reload,
	PushNow,
}

#[cfg(unix)]
struct Signals {
	terminate: tokio::signal::unix::Signal,
	hangup: tokio::signal::unix::Signal,
	user1: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
	fn new() -> io::Result<Self> {
		use tokio::signal::unix::{SignalKind, signal};

		Ok(Signals {
			terminate: signal(SignalKind::terminate())?,
			hangup: signal(SignalKind::hangup())?,
			user1: signal(SignalKind::user_defined1())?,
		})
	}

	async fn recv(&mut self) -> Event {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => Event::Stop,
			_ = self.terminate.recv() => Event::Stop,
			_ = self.hangup.recv() => Event::Reload,
			_ = self.user1.recv() => Event::PushNow,
		}
	}
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
	fn new() -> io::Result<Self> {
		Ok(Signals)
	}

	async fn recv(&mut self) -> Event {
		let _ = tokio::signal::ctrl_c().await;
		Event::Stop
	}
}
