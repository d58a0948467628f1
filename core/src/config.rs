//! Plugin host configuration

use std::{
	collections::HashMap,
	fs,
	path::{Path, PathBuf},
	time::Duration,
};

use anyhow::{anyhow, Context, Result};
use ph_main_sync::DocumentsConfig;
use ph_plugin_host::HostEnvironment;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "plugin-host.json";

/// Current config schema version
pub const CONFIG_VERSION: u32 = 1;

/// Main configuration, persisted as JSON inside the data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
	/// Config schema version
	pub version: u32,

	/// Where this config lives, never persisted
	#[serde(skip)]
	pub data_dir: PathBuf,

	/// Fallback filter when `RUST_LOG` is unset
	#[serde(default = "default_log_level")]
	pub log_level: String,

	#[serde(default)]
	pub sync_cache: SyncCacheConfig,

	#[serde(default)]
	pub documents: DocumentSyncConfig,

	#[serde(default)]
	pub environment: EnvironmentConfig,
}

/// Bounds of the cache holding plugin opened resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCacheConfig {
	pub max_age_ms: u64,
	pub max_bytes: usize,
}

impl Default for SyncCacheConfig {
	fn default() -> Self {
		Self {
			max_age_ms: 180_000,
			max_bytes: ph_cache::DEFAULT_MAX_BYTES,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSyncConfig {
	/// How long a save waits for plugin will-save participants
	pub will_save_timeout_ms: u64,
}

impl Default for DocumentSyncConfig {
	fn default() -> Self {
		Self {
			will_save_timeout_ms: 1750,
		}
	}
}

/// Environment reported to plugin hosts on init
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
	pub language: String,
	#[serde(default)]
	pub query_params: HashMap<String, String>,
}

impl Default for EnvironmentConfig {
	fn default() -> Self {
		Self {
			language: "en".to_string(),
			query_params: HashMap::new(),
		}
	}
}

fn default_log_level() -> String {
	"info".to_string()
}

impl HostConfig {
	/// Load configuration from the default location
	pub fn load() -> Result<Self> {
		Self::load_from(&default_data_dir()?)
	}

	/// Load configuration from `data_dir`, writing the defaults there on first run
	pub fn load_from(data_dir: &Path) -> Result<Self> {
		let config_path = data_dir.join(CONFIG_FILE_NAME);

		if config_path.exists() {
			info!(?config_path, "Loading config");
			let json = fs::read_to_string(&config_path)
				.with_context(|| format!("failed to read {}", config_path.display()))?;
			let mut config: Self = serde_json::from_str(&json)
				.with_context(|| format!("failed to parse {}", config_path.display()))?;

			if config.version > CONFIG_VERSION {
				return Err(anyhow!(
					"Unknown config version: {} (newest known is {CONFIG_VERSION})",
					config.version
				));
			}

			config.data_dir = data_dir.to_path_buf();
			Ok(config)
		} else {
			warn!(?config_path, "No config found, creating default");
			let config = Self::default_with_dir(data_dir.to_path_buf());
			config.save()?;
			Ok(config)
		}
	}

	#[must_use]
	pub fn default_with_dir(data_dir: PathBuf) -> Self {
		Self {
			version: CONFIG_VERSION,
			data_dir,
			log_level: default_log_level(),
			sync_cache: SyncCacheConfig::default(),
			documents: DocumentSyncConfig::default(),
			environment: EnvironmentConfig::default(),
		}
	}

	/// Save configuration to disk
	pub fn save(&self) -> Result<()> {
		fs::create_dir_all(&self.data_dir)?;

		let config_path = self.data_dir.join(CONFIG_FILE_NAME);
		fs::write(&config_path, serde_json::to_string_pretty(self)?)?;
		info!(?config_path, "Saved config");
		Ok(())
	}

	#[must_use]
	pub fn logs_dir(&self) -> PathBuf {
		self.data_dir.join("logs")
	}

	#[must_use]
	pub fn documents_config(&self) -> DocumentsConfig {
		DocumentsConfig {
			will_save_timeout: Duration::from_millis(self.documents.will_save_timeout_ms),
			cache_max_age: Duration::from_millis(self.sync_cache.max_age_ms),
			cache_max_bytes: self.sync_cache.max_bytes,
		}
	}

	#[must_use]
	pub fn host_environment(&self) -> HostEnvironment {
		HostEnvironment {
			query_params: self.environment.query_params.clone(),
			language: self.environment.language.clone(),
		}
	}
}

/// Platform-specific data directory resolution
pub fn default_data_dir() -> Result<PathBuf> {
	let dir = dirs::data_local_dir()
		.ok_or_else(|| anyhow!("Could not determine data directory"))?
		.join("plugin-host");

	fs::create_dir_all(&dir)?;

	Ok(dir)
}
