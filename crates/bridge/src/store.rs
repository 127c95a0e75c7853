use reitti_pusher::{ConfigEntry, migrate_entry};
use serde::{Deserialize, Serialize};
use std::{
	fs, io,
	path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{Level, debug, info, instrument};

pub const STORE_KEY: &str = "reitti.config_entries";
pub const STORE_VERSION: u32 = 1;

const APP_DIR: &str = "reitti-bridge";
const FILE_NAME: &str = "config_entries.json";

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("failed to read {}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("failed to parse {}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("{} holds '{found}', not config entries", path.display())]
	Key { path: PathBuf, found: String },

	#[error("{} has store version {found}, expected {STORE_VERSION}", path.display())]
	Version { path: PathBuf, found: u32 },

	#[error("failed to write {}", path.display())]
	Write {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
	version: u32,
	key: String,
	data: StoreData,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
	#[serde(default)]
	entries: Vec<ConfigEntry>,
}

/// Config entries persisted as JSON, in the same envelope home-assistant
/// uses for its `.storage` files.
#[derive(Debug)]
pub struct EntryStore {
	path: PathBuf,
	entries: Vec<ConfigEntry>,
}

impl EntryStore {
	/// `<config dir>/reitti-bridge/config_entries.json`.
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir()
			.or_else(dirs::state_dir)
			.map(|dir| dir.join(APP_DIR).join(FILE_NAME))
	}

	/// Loads the store at `path`, migrating old entries. A missing file is an
	/// empty store.
	#[instrument(level = Level::DEBUG, name = "EntryStore::load", skip_all, fields(path = %path.as_ref().display()))]
	pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
		let path = path.as_ref().to_owned();
		let contents = match fs::read(&path) {
			Ok(contents) => contents,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				debug!("no store yet");
				return Ok(EntryStore {
					path,
					entries: Vec::new(),
				});
			}
			Err(source) => return Err(StoreError::Read { path, source }),
		};

		let file: StoreFile = match serde_json::from_slice(&contents) {
			Ok(file) => file,
			Err(source) => return Err(StoreError::Parse { path, source }),
		};

		if file.key != STORE_KEY {
			return Err(StoreError::Key {
				path,
				found: file.key,
			});
		}

		if file.version != STORE_VERSION {
			return Err(StoreError::Version {
				path,
				found: file.version,
			});
		}

		let mut store = EntryStore {
			path,
			entries: file.data.entries,
		};

		let mut migrated = false;
		for entry in &mut store.entries {
			// Entries from a newer version are kept as is and fail to set up.
			let version = entry.version;
			migrate_entry(entry);
			migrated |= entry.version != version;
		}

		if migrated {
			info!("migrated config entries");
			store.save()?;
		}

		Ok(store)
	}

	/// Writes the store next to its final path and renames it into place.
	#[instrument(level = Level::DEBUG, name = "EntryStore::save", skip_all, fields(path = %self.path.display()))]
	pub fn save(&self) -> Result<(), StoreError> {
		let write_error = |source: io::Error| StoreError::Write {
			path: self.path.clone(),
			source,
		};

		if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
			fs::create_dir_all(dir).map_err(write_error)?;
		}

		let file = StoreFile {
			version: STORE_VERSION,
			key: STORE_KEY.into(),
			data: StoreData {
				entries: self.entries.clone(),
			},
		};

		let contents = serde_json::to_vec_pretty(&file)
			.map_err(|e| write_error(io::Error::new(io::ErrorKind::InvalidData, e)))?;

		let mut tmp = self.path.clone().into_os_string();
		tmp.push(".tmp");
		let tmp = PathBuf::from(tmp);

		fs::write(&tmp, contents).map_err(write_error)?;
		fs::rename(&tmp, &self.path).map_err(write_error)?;

		debug!(entries = self.entries.len(), "saved store");
		Ok(())
	}

	#[inline]
	pub fn path(&self) -> &Path {
		&self.path
	}

	#[inline]
	pub fn entries(&self) -> &[ConfigEntry] {
		&self.entries
	}

	pub fn get(&self, entry_id: &str) -> Option<&ConfigEntry> {
		self.entries.iter().find(|entry| entry.entry_id == entry_id)
	}

	pub fn get_mut(&mut self, entry_id: &str) -> Option<&mut ConfigEntry> {
		self.entries.iter_mut().find(|entry| entry.entry_id == entry_id)
	}

	/// Adds `entry`, replacing a stored entry with the same id.
	pub fn insert(&mut self, entry: ConfigEntry) {
		match self.get_mut(&entry.entry_id) {
			Some(existing) => *existing = entry,
			None => self.entries.push(entry),
		}
	}

	pub fn remove(&mut self, entry_id: &str) -> Option<ConfigEntry> {
		let index = self.entries.iter().position(|entry| entry.entry_id == entry_id)?;
		Some(self.entries.remove(index))
	}
}
