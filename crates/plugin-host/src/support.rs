use std::{
	collections::{HashMap, HashSet},
	path::PathBuf,
	sync::{Arc, Mutex, PoisonError},
};

use futures_concurrency::future::{Join, TryJoin};
use ph_rpc::RpcProtocol;
use tokio::{spawn, sync::broadcast::error::RecvError};
use tracing::{debug, error, info, instrument, warn};

use super::{
	activation::ActivationTracker,
	error::{Error, Result},
	manager::{
		ExtPluginApi, HostEnvironment, HostPaths, KeysToKeysToAnyValue, PluginManagerExtProxy,
		PluginManagerInitParams,
	},
	metadata::{PluginHost, PluginId, PluginMetadata},
	services::{
		ChannelFactory, CommandRegistry, ContributionHandler, HostedPluginServer,
		MainPluginApiProvider, PluginPathsProvider, PreferenceProvider, WorkspaceProvider,
		WorkspaceRoot,
	},
};

/// Host application services the lifecycle manager is built on.
#[derive(Clone)]
pub struct PluginHostServices {
	pub server: Arc<dyn HostedPluginServer>,
	pub paths: Arc<dyn PluginPathsProvider>,
	pub workspace: Arc<dyn WorkspaceProvider>,
	pub preferences: Arc<dyn PreferenceProvider>,
	pub channels: Arc<dyn ChannelFactory>,
	pub contributions: Arc<dyn ContributionHandler>,
	pub commands: Arc<dyn CommandRegistry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
	Uninitialized,
	Deploying,
	Loaded,
}

/// Everything gathered before a deployment batch is sent to the plugin hosts.
#[derive(Debug, Clone, Default)]
pub struct PluginsInitData {
	pub plugins: Vec<PluginMetadata>,
	pub log_path: PathBuf,
	pub storage_path: Option<PathBuf>,
	pub plugin_apis: Vec<ExtPluginApi>,
	pub global_state: KeysToKeysToAnyValue,
	pub workspace_state: KeysToKeysToAnyValue,
	pub roots: Vec<WorkspaceRoot>,
}

struct HostConnection {
	rpc: RpcProtocol,
	manager: PluginManagerExtProxy,
}

struct Session {
	lifecycle: LifecycleState,
	loaded: HashSet<PluginId>,
	hosts: HashMap<PluginHost, HostConnection>,
}

/// Hosted plugin lifecycle manager: deploys plugins to their hosts, one RPC protocol per host,
/// and activates plugin code lazily on activation events.
///
/// All session state (loaded plugin ids, connected hosts, fired events) is owned here and lives
/// until [`dispose`](Self::dispose).
pub struct HostedPluginSupport {
	services: PluginHostServices,
	api_providers: Vec<Arc<dyn MainPluginApiProvider>>,
	environment: HostEnvironment,
	activation: Arc<ActivationTracker>,
	session: Mutex<Session>,
}

impl HostedPluginSupport {
	pub fn new(services: PluginHostServices, environment: HostEnvironment) -> Self {
		Self {
			services,
			api_providers: Vec::new(),
			environment,
			activation: Arc::new(ActivationTracker::default()),
			session: Mutex::new(Session {
				lifecycle: LifecycleState::Uninitialized,
				loaded: HashSet::new(),
				hosts: HashMap::new(),
			}),
		}
	}

	#[must_use]
	pub fn with_api_provider(mut self, provider: Arc<dyn MainPluginApiProvider>) -> Self {
		self.api_providers.push(provider);
		self
	}

	#[must_use]
	pub fn state(&self) -> LifecycleState {
		self.session().lifecycle
	}

	#[must_use]
	pub fn retained_hosts(&self) -> Vec<PluginHost> {
		let mut hosts = self.session().hosts.keys().cloned().collect::<Vec<_>>();
		hosts.sort();
		hosts
	}

	#[must_use]
	pub fn is_loaded(&self, plugin_id: &PluginId) -> bool {
		self.session().loaded.contains(plugin_id)
	}

	#[must_use]
	pub fn activation(&self) -> &ActivationTracker {
		&self.activation
	}

	/// Gathers deployment data and loads every plugin not loaded yet.
	///
	/// A gathering failure abandons this call, it is logged and never propagated.
	#[instrument(skip(self))]
	pub async fn init_plugins(&self) {
		match self.gather().await {
			Ok(data) => self.load_plugins(data).await,
			Err(e) => error!(?e, "Failed to gather plugin initialization data"),
		}
	}

	async fn gather(&self) -> Result<PluginsInitData> {
		let PluginHostServices {
			server,
			paths,
			workspace,
			..
		} = &self.services;

		let (plugins, log_path, storage_path, plugin_apis, global_state, workspace_state, roots) =
			(
				server.deployed_metadata(),
				paths.host_log_path(),
				paths.host_storage_path(),
				server.ext_plugin_api(),
				server.key_value_storage_get_all(true),
				server.key_value_storage_get_all(false),
				workspace.roots(),
			)
				.try_join()
				.await?;

		Ok(PluginsInitData {
			plugins,
			log_path,
			storage_path,
			plugin_apis,
			global_state,
			workspace_state,
			roots,
		})
	}

	/// Deploys a batch of plugins.
	///
	/// Plugins already loaded in this session are filtered out. The rest are grouped by target
	/// host; each host gets one protocol for the whole session and exactly one `$init` per batch
	/// carrying its share of the plugins. `$init` failures are logged per host.
	#[instrument(skip_all, fields(plugins = data.plugins.len()))]
	pub async fn load_plugins(&self, data: PluginsInitData) {
		let PluginsInitData {
			plugins,
			log_path,
			storage_path,
			plugin_apis,
			global_state,
			workspace_state,
			roots,
		} = data;

		let plugins = {
			let mut session = self.session();
			if session.lifecycle == LifecycleState::Uninitialized {
				session.lifecycle = LifecycleState::Deploying;
			}

			plugins
				.into_iter()
				.filter(|plugin| session.loaded.insert(plugin.model.id.clone()))
				.collect::<Vec<_>>()
		};

		let mut by_host = HashMap::<PluginHost, Vec<PluginMetadata>>::new();
		for plugin in plugins {
			if let Some(contributions) = &plugin.model.contributes {
				self.services
					.contributions
					.handle_contributions(&plugin.model.id, contributions);
			}
			by_host.entry(plugin.target_host()).or_default().push(plugin);
		}

		if by_host.is_empty() {
			debug!("Nothing new to deploy");
			self.session().lifecycle = LifecycleState::Loaded;
			return;
		}

		self.services.preferences.ready().await;
		let preferences = self.services.preferences.preferences(&roots);

		let paths = HostPaths {
			host_log_path: log_path,
			host_storage_path: storage_path,
		};
		let paths = &paths;

		let mut inits = Vec::with_capacity(by_host.len());
		for (host, plugins) in by_host {
			let routing_key = plugins
				.first()
				.map(|plugin| plugin.model.routing_key())
				.unwrap_or_default();

			let (manager, activation_events) = match self.connect(&host, &routing_key) {
				Ok(connected) => connected,
				Err(e) => {
					error!(%host, ?e, "Failed to start plugin host, skipping its plugins");
					continue;
				}
			};

			let params = PluginManagerInitParams {
				plugins,
				preferences: preferences.clone(),
				global_state: global_state.clone(),
				workspace_state: workspace_state.clone(),
				env: self.environment.clone(),
				ext_api: plugin_apis.clone(),
				activation_events,
			};

			inits.push(async move {
				let res = manager.init(&params, paths).await;
				(host, params.plugins.len(), res)
			});
		}

		for (host, count, res) in inits.join().await {
			match res {
				Ok(()) => info!(%host, count, "Plugin host initialized"),
				Err(e) => error!(%host, ?e, "Failed to initialize plugin host"),
			}
		}

		self.session().lifecycle = LifecycleState::Loaded;
	}

	/// Protocol and manager of `host`, connecting it on first use.
	///
	/// Returns the events the host must catch up with.
	fn connect(
		&self,
		host: &PluginHost,
		routing_key: &str,
	) -> Result<(PluginManagerExtProxy, Vec<String>)> {
		let mut session = self.session();

		if let Some(connection) = session.hosts.get(host) {
			return Ok((connection.manager.clone(), self.activation.fired_events()));
		}

		let channel = self.services.channels.open(host, routing_key)?;
		let rpc = RpcProtocol::new(host.to_string(), channel);

		for provider in &self.api_providers {
			if let Err(e) = provider.initialize(&rpc, host) {
				rpc.dispose();
				return Err(e);
			}
		}

		let manager = rpc.get_proxy::<PluginManagerExtProxy>();
		let activation_events = self.activation.retain_manager(manager.clone());

		debug!(%host, routing_key, "Connected plugin host");

		session.hosts.insert(
			host.clone(),
			HostConnection {
				rpc,
				manager: manager.clone(),
			},
		);

		Ok((manager, activation_events))
	}

	/// Broadcasts a storage path change, failures are logged per host.
	#[instrument(skip(self))]
	pub async fn update_storage_path(&self, path: Option<PathBuf>) {
		let path = path.as_ref();

		for (host, res) in self
			.activation
			.managers()
			.into_iter()
			.map(|manager| async move {
				let res = manager.update_storage_path(path).await;
				(manager.host().to_string(), res)
			})
			.collect::<Vec<_>>()
			.join()
			.await
		{
			if let Err(e) = res {
				warn!(%host, ?e, "Failed to update plugin host storage path");
			}
		}
	}

	pub async fn activate_by_event(&self, event: &str) -> Result<()> {
		self.activation.activate_by_event(event).await
	}

	pub async fn activate_by_language(&self, language_id: &str) -> Result<()> {
		self.activate_by_event(&format!("onLanguage:{language_id}"))
			.await
	}

	pub async fn activate_by_command(&self, command_id: &str) -> Result<()> {
		self.activate_by_event(&format!("onCommand:{command_id}"))
			.await
	}

	/// Fires `onLanguage` for languages that were already active before this manager existed.
	pub async fn activate_languages(&self, language_ids: impl IntoIterator<Item = String>) {
		for res in language_ids
			.into_iter()
			.map(|id| async move { self.activate_by_language(&id).await })
			.collect::<Vec<_>>()
			.join()
			.await
		{
			if let Err(e) = res {
				error!(?e, "Failed to activate plugins for language");
			}
		}
	}

	/// Resolves when `command_id` can execute.
	///
	/// Activation by command always starts. If the command already has a concrete handler, or
	/// was not contributed by a plugin at all, this returns right away and activation continues
	/// in the background. Otherwise it waits for both the activation and the handler
	/// registration; a failed activation ends the wait with that failure.
	#[instrument(skip(self))]
	pub async fn ensure_command_handler_registration(&self, command_id: &str) -> Result<()> {
		// Subscribe before checking, a registration in between must not be missed
		let mut registrations = self
			.services
			.contributions
			.subscribe_command_handler_registered();

		let event = format!("onCommand:{command_id}");
		let activation = spawn({
			let tracker = Arc::clone(&self.activation);
			let event = event.clone();
			async move {
				let res = tracker.activate_by_event(&event).await;
				if let Err(e) = &res {
					error!(?e, "Activation by command failed");
				}
				res
			}
		});

		let contributions = &self.services.contributions;
		if self.services.commands.has_command(command_id)
			&& (!contributions.has_command(command_id)
				|| contributions.has_command_handler(command_id))
		{
			return Ok(());
		}

		debug!("Deferring command until its handler is registered");

		let activation = async {
			activation
				.await
				.map_err(|e| Error::ActivationAborted {
					event,
					reason: e.to_string(),
				})
				.and_then(|res| res)
		};

		let handler_registered = async {
			loop {
				match registrations.recv().await {
					Ok(id) if id == command_id => return Ok(()),
					Ok(_) => {}
					Err(RecvError::Lagged(skipped)) => {
						warn!(skipped, "Missed command handler registrations, re-checking");
						if contributions.has_command_handler(command_id) {
							return Ok(());
						}
					}
					Err(RecvError::Closed) => {
						return Err(Error::CommandHandlerSignalClosed(command_id.to_string()))
					}
				}
			}
		};

		futures::future::try_join(activation, handler_registered)
			.await
			.map(|((), ())| ())
	}

	/// Ends the session: every host protocol is disposed and all session state is cleared.
	#[instrument(skip(self))]
	pub fn dispose(&self) {
		let hosts = {
			let mut session = self.session();
			session.lifecycle = LifecycleState::Uninitialized;
			session.loaded.clear();
			std::mem::take(&mut session.hosts)
		};

		self.activation.clear();

		for (host, connection) in hosts {
			debug!(%host, "Disposing plugin host protocol");
			connection.rpc.dispose();
		}
	}

	fn session(&self) -> std::sync::MutexGuard<'_, Session> {
		self.session.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
