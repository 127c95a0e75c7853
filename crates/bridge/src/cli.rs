use clap::{Args, Parser, Subcommand};
use reitti_pusher::entry::{
	CONF_API_KEY, CONF_DEVICE, CONF_ENABLE_DEBUG_LOGGING, CONF_ENABLE_PUSH, CONF_FRIENDLY_NAME,
	CONF_INTERVAL_SECONDS, CONF_PORT, CONF_URL,
};
use serde_json::{Map, Value};
use std::{path::PathBuf, time::Duration};
use url::Url;

/// Pushes home-assistant device tracker locations to Reitti.
#[derive(Debug, Parser)]
#[command(name = "reitti-bridge", version, about, long_about = None)]
pub struct Cli {
	/// Config entry store, defaults to the user config directory.
	#[arg(long, global = true, value_name = "FILE", env = "REITTI_BRIDGE_STORE")]
	pub store: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Run every stored entry until interrupted.
	///
	/// SIGHUP reloads the store, SIGUSR1 pushes all entries now.
	Run(RunArgs),

	/// Create a new entry.
	Add(AddArgs),

	/// Change the options of an entry.
	Options(OptionsArgs),

	/// List stored entries.
	List,

	/// Delete an entry.
	Remove {
		entry_id: String,
	},
}

#[derive(Debug, Args)]
pub struct RunArgs {
	/// Base URL of home-assistant.
	#[arg(long, env = "HASS_URL", default_value = "http://homeassistant.local:8123")]
	pub hass_url: Url,

	/// Long-lived access token.
	#[arg(long, env = "HASS_TOKEN", hide_env_values = true)]
	pub hass_token: String,

	/// Seconds between state polls of each tracked device.
	#[arg(long, value_name = "SECONDS", default_value_t = 10)]
	pub poll_interval: u64,
}

impl RunArgs {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval.max(1))
	}
}

#[derive(Debug, Args)]
pub struct AddArgs {
	/// Reitti server URL.
	#[arg(long)]
	pub url: Option<String>,

	#[arg(long)]
	pub port: Option<u16>,

	/// Reitti API token.
	#[arg(long, env = "REITTI_API_KEY", hide_env_values = true)]
	pub api_key: Option<String>,

	/// device_tracker entity to follow.
	#[arg(long)]
	pub device: Option<String>,

	#[command(flatten)]
	pub options: EntryOptions,
}

#[derive(Debug, Args)]
pub struct OptionsArgs {
	pub entry_id: String,

	/// device_tracker entity to follow.
	#[arg(long)]
	pub device: Option<String>,

	#[command(flatten)]
	pub options: EntryOptions,
}

#[derive(Debug, Default, Args)]
pub struct EntryOptions {
	/// Seconds between scheduled pushes.
	#[arg(long, value_name = "SECONDS")]
	pub interval: Option<u64>,

	/// Turn scheduled and state-change pushes on or off.
	#[arg(long, value_name = "BOOL")]
	pub push: Option<bool>,

	/// Log request URLs, payloads and responses.
	#[arg(long, value_name = "BOOL")]
	pub debug_logging: Option<bool>,

	#[arg(long)]
	pub name: Option<String>,
}

impl EntryOptions {
	fn write(&self, input: &mut Map<String, Value>) {
		set(input, CONF_INTERVAL_SECONDS, self.interval);
		set(input, CONF_ENABLE_PUSH, self.push);
		set(input, CONF_ENABLE_DEBUG_LOGGING, self.debug_logging);
		set(input, CONF_FRIENDLY_NAME, self.name.clone());
	}
}

fn set(input: &mut Map<String, Value>, key: &str, value: Option<impl Into<Value>>) {
	if let Some(value) = value {
		input.insert(key.into(), value.into());
	}
}

impl AddArgs {
	/// Flow input holding only the settings given on the command line.
	pub fn input(&self) -> Map<String, Value> {
		let mut input = Map::new();
		set(&mut input, CONF_URL, self.url.clone());
		set(&mut input, CONF_PORT, self.port);
		set(&mut input, CONF_API_KEY, self.api_key.clone());
		set(&mut input, CONF_DEVICE, self.device.clone());
		self.options.write(&mut input);
		input
	}
}

impl OptionsArgs {
	pub fn input(&self) -> Map<String, Value> {
		let mut input = Map::new();
		set(&mut input, CONF_DEVICE, self.device.clone());
		self.options.write(&mut input);
		input
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_matches::assert_matches;
	use clap::CommandFactory;
	use serde_json::json;

	#[test]
	fn verify_cli() {
		Cli::command().debug_assert();
	}

	#[test]
	fn add_input_holds_given_settings() {
		let cli = Cli::try_parse_from([
			"reitti-bridge",
			"add",
			"--api-key",
			"abc",
			"--device",
			"device_tracker.johns_phone",
			"--interval",
			"60",
			"--push",
			"false",
		])
		.unwrap();

		let args = assert_matches!(cli.command, Command::Add(args) => args);
		assert_eq!(
			Value::Object(args.input()),
			json!({
				"api_key": "abc",
				"device": "device_tracker.johns_phone",
				"interval_seconds": 60,
				"enable_push": false,
			})
		);
	}

	#[test]
	fn store_is_global() {
		let cli = Cli::try_parse_from(["reitti-bridge", "remove", "01J8", "--store", "/tmp/entries.json"]).unwrap();
		assert_eq!(cli.store, Some(PathBuf::from("/tmp/entries.json")));
		assert_matches!(cli.command, Command::Remove { entry_id } if entry_id == "01J8");
	}
}
