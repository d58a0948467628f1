use std::{path::Path, sync::Arc};

use anyhow::Result;
use ph_plugin_host::{HostedPluginSupport, PluginHostServices};
use tracing::info;

use super::{
	config::HostConfig,
	logging,
	main_api::{MainApi, MainApiCollaborators},
};

/// One plugin hosting session: lifecycle manager plus the main side API it installs per host.
pub struct Session {
	config: HostConfig,
	support: Arc<HostedPluginSupport>,
	main_api: Arc<MainApi>,
}

impl Session {
	#[must_use]
	pub fn new(
		config: HostConfig,
		services: PluginHostServices,
		collaborators: MainApiCollaborators,
	) -> Self {
		let main_api = Arc::new(MainApi::new(collaborators, config.documents_config()));
		let support = HostedPluginSupport::new(services, config.host_environment())
			.with_api_provider(Arc::clone(&main_api) as _);

		Self {
			config,
			support: Arc::new(support),
			main_api,
		}
	}

	/// Initializes tracing and loads the configuration from `data_dir` before building the session.
	pub fn bootstrap(
		data_dir: &Path,
		services: PluginHostServices,
		collaborators: MainApiCollaborators,
	) -> Result<Self> {
		let config = HostConfig::load_from(data_dir)?;
		logging::init(data_dir, &config.log_level)?;

		info!(data_dir = %data_dir.display(), "Starting plugin host session");

		Ok(Self::new(config, services, collaborators))
	}

	/// Deploys every plugin known to the server.
	pub async fn start(&self) {
		self.support.init_plugins().await;
	}

	#[must_use]
	pub const fn config(&self) -> &HostConfig {
		&self.config
	}

	#[must_use]
	pub const fn support(&self) -> &Arc<HostedPluginSupport> {
		&self.support
	}

	#[must_use]
	pub const fn main_api(&self) -> &Arc<MainApi> {
		&self.main_api
	}

	pub fn shutdown(&self) {
		self.main_api.dispose();
		self.support.dispose();
		info!("Plugin host session ended");
	}
}
