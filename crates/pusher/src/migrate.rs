use crate::entry::{
	CONF_ENABLE_DEBUG_LOGGING, CONF_ENABLE_PUSH, CONF_FRIENDLY_NAME, CONF_INTERVAL_SECONDS,
	CURRENT_VERSION, ConfigEntry, DEFAULT_INTERVAL_SECONDS,
};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Brings a stored entry up to [`CURRENT_VERSION`].
///
/// Returns `false` when the entry was written by a newer version and cannot be
/// loaded. Migration only adds missing options, it never rewrites values the
/// user has set.
pub fn migrate_entry(entry: &mut ConfigEntry) -> bool {
	if entry.version > CURRENT_VERSION {
		warn!(
			entry_id = %entry.entry_id,
			version = entry.version,
			"config entry was created by a newer version"
		);
		return false;
	}

	if entry.version == CURRENT_VERSION {
		return true;
	}

	debug!(entry_id = %entry.entry_id, from = entry.version, "migrating config entry");

	if entry.version <= 1 {
		let title = entry.title.clone();
		let options = &mut entry.options;
		options
			.entry(CONF_ENABLE_DEBUG_LOGGING)
			.or_insert(Value::Bool(false));
		options.entry(CONF_ENABLE_PUSH).or_insert(Value::Bool(true));
		options
			.entry(CONF_INTERVAL_SECONDS)
			.or_insert(Value::from(DEFAULT_INTERVAL_SECONDS));
		options
			.entry(CONF_FRIENDLY_NAME)
			.or_insert(Value::String(title));

		entry.version = 2;
	}

	info!(entry_id = %entry.entry_id, version = entry.version, "migrated config entry");
	true
}
