//! Queue layout & config: directory schema, and layered effective-settings
//! resolution (defaults -> root config -> queue config), cached per queue.

use crate::error::{DdmqError, Result};
use crate::logging::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const CONFIG_FILE: &str = "ddmq.yaml";
pub const CONFIG_EXAMPLE_FILE: &str = "ddmq.yaml.example";
pub const WORK_DIR: &str = "work";

/// Effective settings for a queue: the merge of defaults, root config and
/// queue config, in that order of precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
	pub message_timeout: u64,
	pub priority: i64,
	pub requeue: bool,
	pub requeue_prio: i64,
	pub cleaned: u64,
}

impl Default for Settings {
	fn default() -> Self {
		Settings { message_timeout: 600, priority: 999, requeue: true, requeue_prio: 0, cleaned: 0 }
	}
}

/// A queue name must match this pattern to be accepted by admin operations.
pub fn validate_queue_name(name: &str) -> Result<()> {
	let ok = !name.is_empty()
		&& name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
	if ok {
		Ok(())
	} else {
		Err(DdmqError::InvalidName { name: name.to_string() })
	}
}

/// Filesystem layout rooted at a single ddmq root directory.
pub struct Layout {
	root: PathBuf,
	cache: Mutex<HashMap<String, Settings>>,
}

impl Layout {
	/// Open an existing, initiated root.
	pub fn open(root: impl Into<PathBuf>) -> Result<Layout> {
		let root = root.into();
		if !root.is_dir() {
			return Err(DdmqError::RootMissing { path: root });
		}
		if !root.join(CONFIG_FILE).is_file() {
			return Err(DdmqError::RootUninitiated { path: root });
		}
		Ok(Layout { root, cache: Mutex::new(HashMap::new()) })
	}

	/// Open a root, initiating it (writing the default root config) if it
	/// isn't already a valid root.
	pub fn open_or_init(root: impl Into<PathBuf>) -> Result<Layout> {
		let root = root.into();
		if !root.is_dir() {
			fs::create_dir_all(&root)?;
		}
		let config_path = root.join(CONFIG_FILE);
		if !config_path.is_file() {
			info!("initializing ddmq root at {}", root.display());
			fs::write(&config_path, "")?;
			let example = serde_yaml::to_string(&Settings::default())?;
			fs::write(root.join(CONFIG_EXAMPLE_FILE), example)?;
		}
		Ok(Layout { root, cache: Mutex::new(HashMap::new()) })
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn queue_dir(&self, queue: &str) -> PathBuf {
		self.root.join(queue)
	}

	pub fn work_dir(&self, queue: &str) -> PathBuf {
		self.queue_dir(queue).join(WORK_DIR)
	}

	/// `check_dir`: does `path` look like a valid ddmq directory? When
	/// `only_conf` is set, presence of the config file alone is enough;
	/// otherwise `work/` must exist too.
	pub fn check_dir(path: &Path, only_conf: bool) -> bool {
		if !path.join(CONFIG_FILE).is_file() {
			return false;
		}
		only_conf || path.join(WORK_DIR).is_dir()
	}

	pub fn is_queue(&self, queue: &str) -> bool {
		Self::check_dir(&self.queue_dir(queue), false)
	}

	/// List valid queue names in lexicographic order.
	pub fn list_queues(&self) -> Result<Vec<String>> {
		let mut queues = Vec::new();
		let entries = match fs::read_dir(&self.root) {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(DdmqError::RootMissing { path: self.root.clone() })
			}
			Err(e) => return Err(e.into()),
		};
		for entry in entries {
			let entry = entry?;
			if !entry.file_type()?.is_dir() {
				continue;
			}
			let name = entry.file_name().to_string_lossy().into_owned();
			if Self::check_dir(&entry.path(), false) {
				queues.push(name);
			}
		}
		queues.sort();
		Ok(queues)
	}

	/// Read a config file as a raw YAML mapping, preserving keys this
	/// crate doesn't recognize so they round-trip on write-back. An empty
	/// or missing file reads as an empty mapping.
	fn read_mapping(path: &Path) -> Result<serde_yaml::Mapping> {
		let text = match fs::read_to_string(path) {
			Ok(text) => text,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(serde_yaml::Mapping::new()),
			Err(e) => return Err(e.into()),
		};
		if text.trim().is_empty() {
			return Ok(serde_yaml::Mapping::new());
		}
		match serde_yaml::from_str(&text)? {
			serde_yaml::Value::Mapping(m) => Ok(m),
			_ => Ok(serde_yaml::Mapping::new()),
		}
	}

	fn overlay(base: &mut serde_yaml::Mapping, overlay: serde_yaml::Mapping) {
		for (k, v) in overlay {
			base.insert(k, v);
		}
	}

	/// Resolve effective settings for `queue`, reading the root config and
	/// then the queue config the first time and caching the merged result
	/// for the lifetime of this `Layout`.
	pub fn effective_settings(&self, queue: &str) -> Result<Settings> {
		if let Some(cached) = self.cache.lock().unwrap().get(queue) {
			return Ok(cached.clone());
		}

		debug!("resolving effective settings for queue {}", queue);
		let mut mapping = match serde_yaml::to_value(Settings::default())? {
			serde_yaml::Value::Mapping(m) => m,
			_ => serde_yaml::Mapping::new(),
		};
		Self::overlay(&mut mapping, Self::read_mapping(&self.root.join(CONFIG_FILE))?);
		let queue_config = self.queue_dir(queue).join(CONFIG_FILE);
		Self::overlay(&mut mapping, Self::read_mapping(&queue_config)?);

		let merged: Settings = serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))?;
		self.cache.lock().unwrap().insert(queue.to_string(), merged.clone());
		Ok(merged)
	}

	/// Invalidate the cached settings for `queue`, forcing the next
	/// `effective_settings` call to re-read from disk.
	pub fn invalidate(&self, queue: &str) {
		self.cache.lock().unwrap().remove(queue);
	}

	/// `write_config`: load the current queue config as a raw mapping,
	/// apply `patch` (shallow key merge, preserving unrecognized keys),
	/// write to `<config>.intermediate`, then rename over the live config.
	pub fn write_queue_config(&self, queue: &str, patch: &serde_yaml::Mapping) -> Result<()> {
		let config_path = self.queue_dir(queue).join(CONFIG_FILE);
		let mut current = Self::read_mapping(&config_path)?;
		Self::overlay(&mut current, patch.clone());
		self.write_mapping_atomic(&config_path, &current)?;
		self.invalidate(queue);
		Ok(())
	}

	/// Persist just the `cleaned` timestamp back into a queue's config,
	/// as the cleaner does after each pass.
	pub fn persist_cleaned(&self, queue: &str, cleaned: u64) -> Result<()> {
		let mut patch = serde_yaml::Mapping::new();
		patch.insert("cleaned".into(), cleaned.into());
		self.write_queue_config(queue, &patch)
	}

	fn write_mapping_atomic(&self, config_path: &Path, mapping: &serde_yaml::Mapping) -> Result<()> {
		let intermediate = config_path.with_extension("yaml.intermediate");
		let text = serde_yaml::to_string(mapping)?;
		fs::write(&intermediate, text)?;
		fs::rename(&intermediate, config_path)?;
		Ok(())
	}

	/// Create a new queue: its directory, `work/`, and a default config.
	/// Idempotent if `queue` is already a valid queue; fails if the
	/// directory exists but lacks the config (a foreign directory).
	pub fn create_queue(&self, queue: &str) -> Result<()> {
		validate_queue_name(queue)?;
		let dir = self.queue_dir(queue);
		if Self::check_dir(&dir, true) {
			return Ok(());
		}
		if dir.exists() {
			return Err(DdmqError::Io {
				source: std::io::Error::new(
					std::io::ErrorKind::AlreadyExists,
					format!("{} exists but is not a ddmq queue", dir.display()),
				),
			});
		}
		info!("creating queue {}", queue);
		fs::create_dir_all(self.work_dir(queue))?;
		let text = serde_yaml::to_string(&Settings::default())?;
		fs::write(dir.join(CONFIG_FILE), text)?;
		self.invalidate(queue);
		Ok(())
	}

	/// Ensure `queue` exists, creating it when `create` is set; otherwise
	/// fail with `QueueMissing`.
	pub fn ensure_queue(&self, queue: &str, create: bool) -> Result<()> {
		if self.is_queue(queue) {
			return Ok(());
		}
		if create {
			self.create_queue(queue)
		} else {
			Err(DdmqError::QueueMissing { queue: queue.to_string() })
		}
	}

	/// Delete a queue entirely: all message files, `work/`, config files,
	/// then the queue directory itself. Fails (without force) if foreign
	/// files remain after cleanup.
	pub fn delete_queue(&self, queue: &str) -> Result<()> {
		info!("deleting queue {}", queue);
		let dir = self.queue_dir(queue);
		let work = self.work_dir(queue);

		if let Ok(entries) = fs::read_dir(&work) {
			for entry in entries.flatten() {
				let name = entry.file_name().to_string_lossy().into_owned();
				if crate::filename::is_message_filename(&name) {
					fs::remove_file(entry.path())?;
				}
			}
			fs::remove_dir(&work).ok();
		}

		if let Ok(entries) = fs::read_dir(&dir) {
			for entry in entries.flatten() {
				let name = entry.file_name().to_string_lossy().into_owned();
				if crate::filename::is_message_filename(&name) {
					fs::remove_file(entry.path())?;
				}
			}
		}

		fs::remove_file(dir.join(CONFIG_FILE)).ok();
		fs::remove_file(dir.join(format!("{}.intermediate", CONFIG_FILE))).ok();

		fs::remove_dir(&dir).map_err(|e| {
			warn!("queue directory {} not empty after cleanup: {}", dir.display(), e);
			DdmqError::Io { source: e }
		})?;

		self.invalidate(queue);
		Ok(())
	}
}


// vim: ts=4
