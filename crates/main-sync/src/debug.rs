use std::{
	collections::{HashMap, HashSet},
	convert::Infallible,
	sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use ph_rpc::{main_context, plugin_context, LocalService, RpcIdentifier, RpcProtocol, RpcProxy};
use serde::{de::IgnoredAny, Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error};

use super::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
	pub id: String,
	pub enabled: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub condition: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hit_condition: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub log_message: Option<String>,
	/// Source location or function name, passed through untouched.
	#[serde(flatten)]
	pub location: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugConfiguration {
	#[serde(rename = "type")]
	pub kind: String,
	pub name: String,
	pub request: String,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NameOrConfiguration {
	Name(String),
	Configuration(DebugConfiguration),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebuggerDescription {
	#[serde(rename = "type")]
	pub kind: String,
	pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFolder {
	pub uri: String,
	pub name: String,
	pub index: u32,
}

/// Host debug services plugins drive through [`DebugMain`].
#[async_trait]
pub trait DebugSessionManager: Send + Sync + 'static {
	fn append_console(&self, value: &str);

	fn append_console_line(&self, value: &str);

	fn register_debugger(&self, description: DebuggerDescription);

	fn add_breakpoints(&self, breakpoints: Vec<Breakpoint>);

	fn remove_breakpoints(&self, breakpoint_ids: Vec<String>);

	/// Returns whether a session was started.
	async fn start_debugging(
		&self,
		folder: Option<WorkspaceFolder>,
		configuration: NameOrConfiguration,
	) -> Result<bool>;

	async fn custom_request(&self, session_id: &str, command: &str, args: Value) -> Result<Value>;
}

/// Client stub of the debug API living in a plugin host.
#[derive(Clone)]
pub struct DebugExtProxy {
	rpc: RpcProtocol,
}

impl RpcProxy for DebugExtProxy {
	const IDENTIFIER: RpcIdentifier = main_context::DEBUG_EXT;

	fn from_rpc(rpc: RpcProtocol) -> Self {
		Self { rpc }
	}
}

impl DebugExtProxy {
	async fn request<A, R>(&self, method: &str, args: A) -> Result<R>
	where
		A: Serialize + Send,
		R: serde::de::DeserializeOwned,
	{
		Ok(self.rpc.call(Self::IDENTIFIER, method, args).await?)
	}

	async fn notify<A: Serialize + Send>(&self, method: &str, args: A) -> Result<()> {
		self.request::<_, IgnoredAny>(method, args)
			.await
			.map(|_| ())
	}

	pub async fn session_did_create(&self, session_id: &str) -> Result<()> {
		self.notify("$sessionDidCreate", (session_id,)).await
	}

	pub async fn session_did_destroy(&self, session_id: &str) -> Result<()> {
		self.notify("$sessionDidDestroy", (session_id,)).await
	}

	pub async fn session_did_change(&self, session_id: Option<&str>) -> Result<()> {
		self.notify("$sessionDidChange", (session_id,)).await
	}

	pub async fn on_session_custom_event(
		&self,
		session_id: &str,
		event: &str,
		body: &Value,
	) -> Result<()> {
		self.notify("$onSessionCustomEvent", (session_id, event, body))
			.await
	}

	pub async fn breakpoints_did_change(
		&self,
		all: &[Breakpoint],
		added: &[Breakpoint],
		removed: &[String],
		changed: &[Breakpoint],
	) -> Result<()> {
		self.notify("$breakpointsDidChange", (all, added, removed, changed))
			.await
	}

	pub async fn provide_debug_configurations(
		&self,
		debug_type: &str,
		workspace_folder_uri: Option<&str>,
	) -> Result<Vec<DebugConfiguration>> {
		self.request(
			"$provideDebugConfigurations",
			(debug_type, workspace_folder_uri),
		)
		.await
	}

	pub async fn resolve_debug_configuration(
		&self,
		configuration: &DebugConfiguration,
		workspace_folder_uri: Option<&str>,
	) -> Result<Option<DebugConfiguration>> {
		self.request(
			"$resolveDebugConfigurations",
			(configuration, workspace_folder_uri),
		)
		.await
	}

	/// Returns the id of the created session.
	pub async fn create_debug_session(&self, configuration: &DebugConfiguration) -> Result<String> {
		self.request("$createDebugSession", (configuration,)).await
	}

	pub async fn terminate_debug_session(&self, session_id: &str) -> Result<()> {
		self.notify("$terminateDebugSession", (session_id,)).await
	}

	pub async fn supported_languages(&self, debug_type: &str) -> Result<Vec<String>> {
		self.request("$getSupportedLanguages", (debug_type,)).await
	}

	pub async fn schema_attributes(&self, debug_type: &str) -> Result<Vec<Value>> {
		self.request("$getSchemaAttributes", (debug_type,)).await
	}

	pub async fn configuration_snippets(&self, debug_type: &str) -> Result<Vec<Value>> {
		self.request("$getConfigurationSnippets", (debug_type,))
			.await
	}
}

/// Mirrors host debug sessions and breakpoints into a plugin host.
pub struct DebugMain {
	proxy: DebugExtProxy,
	manager: Arc<dyn DebugSessionManager>,
	sessions: Mutex<HashSet<String>>,
	debuggers: Mutex<HashMap<String, DebuggerDescription>>,
}

impl DebugMain {
	#[must_use]
	pub fn new(proxy: DebugExtProxy, manager: Arc<dyn DebugSessionManager>) -> Self {
		Self {
			proxy,
			manager,
			sessions: Mutex::default(),
			debuggers: Mutex::default(),
		}
	}

	pub fn register(rpc: &RpcProtocol, manager: Arc<dyn DebugSessionManager>) -> Result<Arc<Self>> {
		let debug = Arc::new(Self::new(rpc.get_proxy(), manager));

		let service = LocalService::builder(plugin_context::DEBUG_MAIN, debug)
			.method(
				"$appendToDebugConsole",
				|debug: Arc<Self>, (value,): (String,)| async move {
					debug.manager.append_console(&value);
					Ok::<_, Infallible>(())
				},
			)
			.method(
				"$appendLineToDebugConsole",
				|debug: Arc<Self>, (value,): (String,)| async move {
					debug.manager.append_console_line(&value);
					Ok::<_, Infallible>(())
				},
			)
			.method(
				"$registerDebuggerContribution",
				|debug: Arc<Self>, (description,): (DebuggerDescription,)| async move {
					debug.register_debugger_contribution(description);
					Ok::<_, Infallible>(())
				},
			)
			.method(
				"$addBreakpoints",
				|debug: Arc<Self>, (breakpoints,): (Vec<Breakpoint>,)| async move {
					debug.manager.add_breakpoints(breakpoints);
					Ok::<_, Infallible>(())
				},
			)
			.method(
				"$removeBreakpoints",
				|debug: Arc<Self>, (breakpoint_ids,): (Vec<String>,)| async move {
					debug.manager.remove_breakpoints(breakpoint_ids);
					Ok::<_, Infallible>(())
				},
			)
			.method(
				"$startDebugging",
				|debug: Arc<Self>,
				 (folder, configuration): (Option<WorkspaceFolder>, NameOrConfiguration)| async move {
					debug.manager.start_debugging(folder, configuration).await
				},
			)
			.method(
				"$customRequest",
				|debug: Arc<Self>, (session_id, command, args): (String, String, Option<Value>)| async move {
					debug
						.manager
						.custom_request(&session_id, &command, args.unwrap_or(Value::Null))
						.await
				},
			)
			.build()?;

		Ok(rpc.set(service)?)
	}

	#[must_use]
	pub const fn proxy(&self) -> &DebugExtProxy {
		&self.proxy
	}

	#[must_use]
	pub fn is_mirrored(&self, session_id: &str) -> bool {
		self.sessions
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.contains(session_id)
	}

	#[must_use]
	pub fn debuggers(&self) -> Vec<DebuggerDescription> {
		let mut debuggers = self
			.debuggers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.values()
			.cloned()
			.collect::<Vec<_>>();
		debuggers.sort_by(|a, b| a.kind.cmp(&b.kind));
		debuggers
	}

	fn register_debugger_contribution(&self, description: DebuggerDescription) {
		let mut debuggers = self
			.debuggers
			.lock()
			.unwrap_or_else(PoisonError::into_inner);

		if debuggers.contains_key(&description.kind) {
			return;
		}

		debug!(debug_type = %description.kind, "Registered debugger contribution");
		debuggers.insert(description.kind.clone(), description.clone());
		drop(debuggers);

		self.manager.register_debugger(description);
	}

	pub async fn on_session_created(&self, session_id: &str) {
		if !self
			.sessions
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(session_id.to_string())
		{
			return;
		}

		if let Err(e) = self.proxy.session_did_create(session_id).await {
			error!(%session_id, ?e, "Failed to forward debug session creation");
		}
	}

	pub async fn on_session_destroyed(&self, session_id: &str) {
		if !self
			.sessions
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(session_id)
		{
			return;
		}

		if let Err(e) = self.proxy.session_did_destroy(session_id).await {
			error!(%session_id, ?e, "Failed to forward debug session destruction");
		}
	}

	pub async fn on_session_changed(&self, session_id: Option<&str>) {
		if let Err(e) = self.proxy.session_did_change(session_id).await {
			error!(?session_id, ?e, "Failed to forward active debug session");
		}
	}

	pub async fn on_session_custom_event(&self, session_id: &str, event: &str, body: &Value) {
		if !self.is_mirrored(session_id) {
			return;
		}

		if let Err(e) = self
			.proxy
			.on_session_custom_event(session_id, event, body)
			.await
		{
			error!(%session_id, %event, ?e, "Failed to forward debug session event");
		}
	}

	pub async fn on_breakpoints_changed(
		&self,
		all: &[Breakpoint],
		added: &[Breakpoint],
		removed: &[String],
		changed: &[Breakpoint],
	) {
		if let Err(e) = self
			.proxy
			.breakpoints_did_change(all, added, removed, changed)
			.await
		{
			error!(?e, "Failed to forward breakpoint changes");
		}
	}

	pub fn dispose(&self) {
		self.sessions
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clear();
		self.debuggers
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clear();
	}
}
