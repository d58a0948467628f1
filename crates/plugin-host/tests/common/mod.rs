#![allow(dead_code)]

use ph_plugin_host::{
	ChannelFactory, CommandRegistry, ContributionHandler, Error, HostEnvironment, HostPaths,
	HostedPluginServer, HostedPluginSupport, KeysToKeysToAnyValue, ExtPluginApi,
	PluginContribution, PluginEngine, PluginEntryPoint, PluginHost, PluginHostServices, PluginId,
	PluginManagerInitParams, PluginMetadata, PluginModel, PluginPackage, PluginPathsProvider,
	PreferenceProvider, Result, WorkspaceProvider, WorkspaceRoot,
};
use ph_rpc::{main_context, Channel, LocalService, RpcProtocol};

use std::{
	collections::{HashMap, HashSet},
	convert::Infallible,
	path::PathBuf,
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc, Mutex,
	},
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Semaphore};

/// Plugin manager living on the plugin host side of a channel.
pub struct FakeManager {
	pub inits: Mutex<Vec<(PluginManagerInitParams, HostPaths)>>,
	pub events: Mutex<Vec<String>>,
	pub storage_paths: Mutex<Vec<Option<PathBuf>>>,
	pub activation_gate: Semaphore,
	pub fail_activation: AtomicBool,
}

impl FakeManager {
	fn new(hold_activation: bool) -> Self {
		Self {
			inits: Mutex::new(Vec::new()),
			events: Mutex::new(Vec::new()),
			storage_paths: Mutex::new(Vec::new()),
			activation_gate: Semaphore::new(if hold_activation {
				0
			} else {
				Semaphore::MAX_PERMITS
			}),
			fail_activation: AtomicBool::new(false),
		}
	}

	pub fn release_activations(&self) {
		self.activation_gate.add_permits(1024);
	}

	pub fn init_plugin_ids(&self) -> Vec<Vec<PluginId>> {
		self.inits
			.lock()
			.unwrap()
			.iter()
			.map(|(params, _)| {
				params
					.plugins
					.iter()
					.map(|plugin| plugin.model.id.clone())
					.collect()
			})
			.collect()
	}

	pub fn events(&self) -> Vec<String> {
		self.events.lock().unwrap().clone()
	}

	fn service(self: Arc<Self>) -> LocalService<Self> {
		LocalService::builder(main_context::HOSTED_PLUGIN_MANAGER_EXT, self)
			.method(
				"$init",
				|manager: Arc<Self>, (params, paths): (PluginManagerInitParams, HostPaths)| async move {
					manager.inits.lock().unwrap().push((params, paths));
					Ok::<_, Infallible>(true)
				},
			)
			.method(
				"$activateByEvent",
				|manager: Arc<Self>, (event,): (String,)| async move {
					drop(manager.activation_gate.acquire().await.unwrap());
					manager.events.lock().unwrap().push(event);
					if manager.fail_activation.load(Ordering::SeqCst) {
						Err("activation exploded".to_string())
					} else {
						Ok(())
					}
				},
			)
			.method(
				"$updateStoragePath",
				|manager: Arc<Self>, (path,): (Option<PathBuf>,)| async move {
					manager.storage_paths.lock().unwrap().push(path);
					Ok::<_, Infallible>(())
				},
			)
			.build()
			.unwrap()
	}
}

#[derive(Default)]
pub struct FakeChannels {
	pub opened: AtomicUsize,
	pub hold_activation: AtomicBool,
	pub fail_activation: AtomicBool,
	pub refuse: Mutex<HashSet<PluginHost>>,
	hosts: Mutex<HashMap<PluginHost, (RpcProtocol, Arc<FakeManager>)>>,
}

impl FakeChannels {
	pub fn manager(&self, host: &PluginHost) -> Arc<FakeManager> {
		Arc::clone(&self.hosts.lock().unwrap()[host].1)
	}

	pub fn hosts(&self) -> Vec<PluginHost> {
		let mut hosts = self.hosts.lock().unwrap().keys().cloned().collect::<Vec<_>>();
		hosts.sort();
		hosts
	}
}

impl ChannelFactory for FakeChannels {
	fn open(&self, host: &PluginHost, _routing_key: &str) -> Result<Channel> {
		if self.refuse.lock().unwrap().contains(host) {
			return Err(Error::Channel {
				host: host.to_string(),
				reason: "refused".to_string(),
			});
		}

		self.opened.fetch_add(1, Ordering::SeqCst);

		let (main_side, plugin_side) = Channel::memory_pair();
		let rpc = RpcProtocol::new("main", plugin_side);

		let manager = FakeManager::new(self.hold_activation.load(Ordering::SeqCst));
		manager
			.fail_activation
			.store(self.fail_activation.load(Ordering::SeqCst), Ordering::SeqCst);
		let manager = rpc.set(Arc::new(manager).service()).unwrap();

		self.hosts
			.lock()
			.unwrap()
			.insert(host.clone(), (rpc, manager));

		Ok(main_side)
	}
}

#[derive(Default)]
pub struct FakeServer {
	pub plugins: Mutex<Vec<PluginMetadata>>,
	pub fail: AtomicBool,
}

#[async_trait]
impl HostedPluginServer for FakeServer {
	async fn deployed_metadata(&self) -> Result<Vec<PluginMetadata>> {
		if self.fail.load(Ordering::SeqCst) {
			return Err(Error::Gathering("deployer is down".to_string()));
		}
		Ok(self.plugins.lock().unwrap().clone())
	}

	async fn ext_plugin_api(&self) -> Result<Vec<ExtPluginApi>> {
		Ok(vec![ExtPluginApi {
			frontend_ext_api: None,
			backend_init_path: Some("/ext/backend-init.js".to_string()),
		}])
	}

	async fn key_value_storage_get_all(&self, global: bool) -> Result<KeysToKeysToAnyValue> {
		let scope = if global { "global" } else { "workspace" };
		Ok(HashMap::from([(
			"acme.tasks".to_string(),
			HashMap::from([("scope".to_string(), json!(scope))]),
		)]))
	}
}

pub struct FakePaths;

#[async_trait]
impl PluginPathsProvider for FakePaths {
	async fn host_log_path(&self) -> Result<PathBuf> {
		Ok(PathBuf::from("/logs/plugins"))
	}

	async fn host_storage_path(&self) -> Result<Option<PathBuf>> {
		Ok(Some(PathBuf::from("/storage/workspace")))
	}
}

pub struct FakeWorkspace;

#[async_trait]
impl WorkspaceProvider for FakeWorkspace {
	async fn roots(&self) -> Result<Vec<WorkspaceRoot>> {
		Ok(vec!["file:///projects/demo".to_string()])
	}
}

pub struct FakePreferences;

#[async_trait]
impl PreferenceProvider for FakePreferences {
	async fn ready(&self) {}

	fn preferences(&self, roots: &[WorkspaceRoot]) -> Value {
		json!({ "editor.tabSize": 4, "roots": roots })
	}
}

pub struct FakeContributions {
	pub handled: Mutex<Vec<PluginId>>,
	declared: Mutex<HashSet<String>>,
	handlers: Mutex<HashSet<String>>,
	registered_tx: broadcast::Sender<String>,
}

impl Default for FakeContributions {
	fn default() -> Self {
		Self {
			handled: Mutex::default(),
			declared: Mutex::default(),
			handlers: Mutex::default(),
			registered_tx: broadcast::channel(16).0,
		}
	}
}

impl FakeContributions {
	pub fn register_handler(&self, command_id: &str) {
		self.handlers
			.lock()
			.unwrap()
			.insert(command_id.to_string());
		self.registered_tx.send(command_id.to_string()).ok();
	}
}

impl ContributionHandler for FakeContributions {
	fn handle_contributions(&self, plugin_id: &PluginId, contributions: &PluginContribution) {
		self.handled.lock().unwrap().push(plugin_id.clone());
		self.declared.lock().unwrap().extend(
			contributions
				.commands
				.iter()
				.map(|command| command.command.clone()),
		);
	}

	fn has_command(&self, command_id: &str) -> bool {
		self.declared.lock().unwrap().contains(command_id)
	}

	fn has_command_handler(&self, command_id: &str) -> bool {
		self.handlers.lock().unwrap().contains(command_id)
	}

	fn subscribe_command_handler_registered(&self) -> broadcast::Receiver<String> {
		self.registered_tx.subscribe()
	}
}

/// Every contributed command shows up in the registry with a placeholder handler.
pub struct FakeCommands {
	pub contributions: Arc<FakeContributions>,
	pub builtin: HashSet<String>,
}

impl CommandRegistry for FakeCommands {
	fn has_command(&self, command_id: &str) -> bool {
		self.builtin.contains(command_id) || self.contributions.has_command(command_id)
	}
}

pub struct Fixture {
	pub support: Arc<HostedPluginSupport>,
	pub server: Arc<FakeServer>,
	pub channels: Arc<FakeChannels>,
	pub contributions: Arc<FakeContributions>,
}

pub fn fixture() -> Fixture {
	fixture_with(FakeChannels::default())
}

pub fn fixture_with(channels: FakeChannels) -> Fixture {
	let server = Arc::new(FakeServer::default());
	let channels = Arc::new(channels);
	let contributions = Arc::new(FakeContributions::default());

	let support = HostedPluginSupport::new(
		PluginHostServices {
			server: Arc::clone(&server) as _,
			paths: Arc::new(FakePaths),
			workspace: Arc::new(FakeWorkspace),
			preferences: Arc::new(FakePreferences),
			channels: Arc::clone(&channels) as _,
			contributions: Arc::clone(&contributions) as _,
			commands: Arc::new(FakeCommands {
				contributions: Arc::clone(&contributions),
				builtin: HashSet::from(["core.about".to_string()]),
			}),
		},
		HostEnvironment {
			query_params: HashMap::from([("debug".to_string(), "true".to_string())]),
			language: "en".to_string(),
		},
	);

	Fixture {
		support: Arc::new(support),
		server,
		channels,
		contributions,
	}
}

pub fn plugin(name: &str, host: PluginHost, commands: &[&str]) -> PluginMetadata {
	let contributes = (!commands.is_empty()).then(|| {
		serde_json::from_value::<PluginContribution>(json!({
			"commands": commands
				.iter()
				.map(|command| json!({ "command": command, "title": command }))
				.collect::<Vec<_>>()
		}))
		.unwrap()
	});

	PluginMetadata {
		host,
		source: PluginPackage {
			package_path: PathBuf::from(format!("/plugins/{name}")),
			manifest: json!({ "name": name, "publisher": "acme", "version": "1.0.0" }),
		},
		model: PluginModel {
			id: PluginId::new("acme", name, "1.0.0"),
			name: name.to_string(),
			publisher: "acme".to_string(),
			version: "1.0.0".to_string(),
			display_name: name.to_string(),
			description: String::new(),
			engine: PluginEngine {
				kind: "pluginHost".to_string(),
				version: "next".to_string(),
			},
			entry_point: PluginEntryPoint {
				backend: Some(format!("/plugins/{name}/lib/backend.js")),
				..Default::default()
			},
			package_path: PathBuf::from(format!("/plugins/{name}")),
			activation_events: vec!["*".to_string()],
			contributes,
		},
	}
}

pub fn frontend_plugin(name: &str) -> PluginMetadata {
	let mut metadata = plugin(name, PluginHost::External("main".to_string()), &[]);
	metadata.model.entry_point = PluginEntryPoint {
		frontend: Some("lib/frontend.js".to_string()),
		..Default::default()
	};
	metadata
}

pub fn main_host() -> PluginHost {
	PluginHost::External("main".to_string())
}
