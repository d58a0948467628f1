#![allow(dead_code)]

use ph_core::MainApiCollaborators;
use ph_main_sync::{
	ApplicationShell, Breakpoint, DebugSessionManager, DebuggerDescription,
	DocumentCollaborators, EditorManager, EditorOpenerOptions, EditorWidget, ModelReference,
	ModelService, NameOrConfiguration, Opener, OpenerService, UntitledResources, ViewRegistry,
	WorkspaceFolder,
};
use ph_plugin_host::{
	ChannelFactory, CommandRegistry, ContributionHandler, ExtPluginApi, HostPaths,
	HostedPluginServer, KeysToKeysToAnyValue, PluginContribution, PluginEngine, PluginEntryPoint,
	PluginHost, PluginHostServices, PluginId, PluginManagerInitParams, PluginMetadata,
	PluginModel, PluginPackage, PluginPathsProvider, PreferenceProvider, Result,
	WorkspaceProvider, WorkspaceRoot,
};
use ph_rpc::{main_context, Channel, LocalService, RpcProtocol};

use std::{
	collections::HashMap,
	convert::Infallible,
	path::PathBuf,
	sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

/// Plugin manager side of a host connection.
#[derive(Default)]
pub struct FakeManager {
	pub inits: Mutex<Vec<PluginManagerInitParams>>,
}

impl FakeManager {
	fn service(self: Arc<Self>) -> LocalService<Self> {
		LocalService::builder(main_context::HOSTED_PLUGIN_MANAGER_EXT, self)
			.method(
				"$init",
				|manager: Arc<Self>, (params, _paths): (PluginManagerInitParams, HostPaths)| async move {
					manager.inits.lock().unwrap().push(params);
					Ok::<_, Infallible>(true)
				},
			)
			.method(
				"$activateByEvent",
				|_manager: Arc<Self>, (_event,): (String,)| async move { Ok::<_, Infallible>(()) },
			)
			.build()
			.unwrap()
	}
}

/// Opens in-memory channels and keeps the plugin side of each one.
#[derive(Default)]
pub struct FakeChannels {
	pub hosts: Mutex<HashMap<PluginHost, (RpcProtocol, Arc<FakeManager>)>>,
}

impl FakeChannels {
	pub fn plugin_side(&self, host: &PluginHost) -> RpcProtocol {
		self.hosts.lock().unwrap()[host].0.clone()
	}

	pub fn manager(&self, host: &PluginHost) -> Arc<FakeManager> {
		Arc::clone(&self.hosts.lock().unwrap()[host].1)
	}
}

impl ChannelFactory for FakeChannels {
	fn open(&self, host: &PluginHost, _routing_key: &str) -> Result<ph_rpc::Channel> {
		let (main_side, plugin_side) = Channel::memory_pair();
		let rpc = RpcProtocol::new("main", plugin_side);
		let manager = rpc.set(Arc::new(FakeManager::default()).service())?;

		self.hosts
			.lock()
			.unwrap()
			.insert(host.clone(), (rpc, manager));

		Ok(main_side)
	}
}

pub struct FakeServer {
	pub plugins: Vec<PluginMetadata>,
}

#[async_trait]
impl HostedPluginServer for FakeServer {
	async fn deployed_metadata(&self) -> Result<Vec<PluginMetadata>> {
		Ok(self.plugins.clone())
	}

	async fn ext_plugin_api(&self) -> Result<Vec<ExtPluginApi>> {
		Ok(Vec::new())
	}

	async fn key_value_storage_get_all(&self, _global: bool) -> Result<KeysToKeysToAnyValue> {
		Ok(HashMap::new())
	}
}

pub struct FakePaths;

#[async_trait]
impl PluginPathsProvider for FakePaths {
	async fn host_log_path(&self) -> Result<PathBuf> {
		Ok(PathBuf::from("/logs/plugins"))
	}

	async fn host_storage_path(&self) -> Result<Option<PathBuf>> {
		Ok(None)
	}
}

pub struct FakeWorkspace;

#[async_trait]
impl WorkspaceProvider for FakeWorkspace {
	async fn roots(&self) -> Result<Vec<WorkspaceRoot>> {
		Ok(Vec::new())
	}
}

pub struct FakePreferences;

#[async_trait]
impl PreferenceProvider for FakePreferences {
	async fn ready(&self) {}

	fn preferences(&self, _roots: &[WorkspaceRoot]) -> Value {
		json!({})
	}
}

pub struct FakeContributions {
	registered: broadcast::Sender<String>,
}

impl ContributionHandler for FakeContributions {
	fn handle_contributions(&self, _plugin_id: &PluginId, _contributions: &PluginContribution) {}

	fn has_command(&self, _command_id: &str) -> bool {
		false
	}

	fn has_command_handler(&self, _command_id: &str) -> bool {
		false
	}

	fn subscribe_command_handler_registered(&self) -> broadcast::Receiver<String> {
		self.registered.subscribe()
	}
}

pub struct NoCommands;

impl CommandRegistry for NoCommands {
	fn has_command(&self, _command_id: &str) -> bool {
		false
	}
}

pub fn services(plugins: Vec<PluginMetadata>, channels: Arc<FakeChannels>) -> PluginHostServices {
	PluginHostServices {
		server: Arc::new(FakeServer { plugins }),
		paths: Arc::new(FakePaths),
		workspace: Arc::new(FakeWorkspace),
		preferences: Arc::new(FakePreferences),
		channels,
		contributions: Arc::new(FakeContributions {
			registered: broadcast::channel(4).0,
		}),
		commands: Arc::new(NoCommands),
	}
}

pub struct NoModels;

#[async_trait]
impl ModelService for NoModels {
	async fn create_model_reference(
		&self,
		uri: &str,
	) -> ph_main_sync::Result<Box<dyn ModelReference>> {
		Err(ph_main_sync::Error::NoSuchDocument(uri.to_string()))
	}
}

pub struct NoEditors;

#[async_trait]
impl EditorManager for NoEditors {
	async fn get_by_uri(&self, _uri: &str) -> Option<Arc<dyn EditorWidget>> {
		None
	}
}

pub struct NoOpeners;

#[async_trait]
impl OpenerService for NoOpeners {
	async fn get_opener(
		&self,
		uri: &str,
		_options: Option<&EditorOpenerOptions>,
	) -> ph_main_sync::Result<Arc<dyn Opener>> {
		Err(ph_main_sync::Error::Editor(format!("no opener for {uri}")))
	}
}

pub struct SingleGroup;

impl ApplicationShell for SingleGroup {
	fn main_area_tab_bar_owner(&self, _index: usize) -> Option<String> {
		None
	}
}

#[derive(Default)]
pub struct FakeUntitled {
	pub created: Mutex<Vec<String>>,
}

impl UntitledResources for FakeUntitled {
	fn create(&self, uri: &str, _content: Option<String>, _language: Option<String>) {
		self.created.lock().unwrap().push(uri.to_string());
	}
}

pub struct NoDebugger;

#[async_trait]
impl DebugSessionManager for NoDebugger {
	fn append_console(&self, _value: &str) {}

	fn append_console_line(&self, _value: &str) {}

	fn register_debugger(&self, _description: DebuggerDescription) {}

	fn add_breakpoints(&self, _breakpoints: Vec<Breakpoint>) {}

	fn remove_breakpoints(&self, _breakpoint_ids: Vec<String>) {}

	async fn start_debugging(
		&self,
		_folder: Option<WorkspaceFolder>,
		_configuration: NameOrConfiguration,
	) -> ph_main_sync::Result<bool> {
		Ok(false)
	}

	async fn custom_request(
		&self,
		_session_id: &str,
		_command: &str,
		_args: Value,
	) -> ph_main_sync::Result<Value> {
		Ok(Value::Null)
	}
}

#[derive(Default)]
pub struct FakeViews {
	pub registered: Mutex<Vec<String>>,
}

#[async_trait]
impl ViewRegistry for FakeViews {
	fn register_tree_view(&self, tree_view_id: &str) {
		self.registered
			.lock()
			.unwrap()
			.push(tree_view_id.to_string());
	}

	fn unregister_tree_view(&self, tree_view_id: &str) {
		self.registered
			.lock()
			.unwrap()
			.retain(|id| id != tree_view_id);
	}

	fn refresh(&self, _tree_view_id: &str) {}

	async fn reveal(&self, _tree_view_id: &str, _tree_item_id: &str) -> ph_main_sync::Result<()> {
		Ok(())
	}
}

pub fn collaborators(
	untitled: Arc<FakeUntitled>,
	views: Arc<FakeViews>,
) -> MainApiCollaborators {
	MainApiCollaborators {
		documents: DocumentCollaborators {
			models: Arc::new(NoModels),
			editors: Arc::new(NoEditors),
			openers: Arc::new(NoOpeners),
			shell: Arc::new(SingleGroup),
			untitled,
		},
		debug: Arc::new(NoDebugger),
		views,
	}
}

pub fn plugin(name: &str) -> PluginMetadata {
	let package_path = PathBuf::from(format!("/plugins/{name}"));

	PluginMetadata {
		host: PluginHost::External("main".to_string()),
		source: PluginPackage {
			package_path: package_path.clone(),
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
			package_path,
			activation_events: vec!["*".to_string()],
			contributes: None,
		},
	}
}
