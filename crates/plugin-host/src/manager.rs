use std::{collections::HashMap, path::PathBuf};

use ph_rpc::{main_context, RpcIdentifier, RpcProtocol, RpcProxy};
use serde::{de::IgnoredAny, Deserialize, Serialize};
use serde_json::Value;

use super::metadata::PluginMetadata;

/// Persisted plugin state: plugin key -> state key -> value.
pub type KeysToKeysToAnyValue = HashMap<String, HashMap<String, Value>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendExtApi {
	pub init_path: String,
	pub init_function: String,
	pub init_variable: String,
}

/// Additional API namespace contributed to plugin hosts by a host extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtPluginApi {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frontend_ext_api: Option<FrontendExtApi>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub backend_init_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostEnvironment {
	pub query_params: HashMap<String, String>,
	pub language: String,
}

/// Payload of the single `$init` call each plugin host receives per deployment batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManagerInitParams {
	pub plugins: Vec<PluginMetadata>,
	pub preferences: Value,
	pub global_state: KeysToKeysToAnyValue,
	pub workspace_state: KeysToKeysToAnyValue,
	pub env: HostEnvironment,
	pub ext_api: Vec<ExtPluginApi>,
	/// Events already fired in this session, so a late host catches up without a replay.
	pub activation_events: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostPaths {
	pub host_log_path: PathBuf,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub host_storage_path: Option<PathBuf>,
}

/// Client stub of the plugin manager running inside a plugin host.
#[derive(Clone)]
pub struct PluginManagerExtProxy {
	rpc: RpcProtocol,
}

impl RpcProxy for PluginManagerExtProxy {
	const IDENTIFIER: RpcIdentifier = main_context::HOSTED_PLUGIN_MANAGER_EXT;

	fn from_rpc(rpc: RpcProtocol) -> Self {
		Self { rpc }
	}
}

impl PluginManagerExtProxy {
	#[must_use]
	pub fn host(&self) -> &str {
		self.rpc.host()
	}

	pub async fn init(
		&self,
		params: &PluginManagerInitParams,
		paths: &HostPaths,
	) -> ph_rpc::Result<()> {
		self.rpc
			.call::<_, IgnoredAny>(Self::IDENTIFIER, "$init", (params, paths))
			.await
			.map(|_| ())
	}

	pub async fn update_storage_path(&self, path: Option<&PathBuf>) -> ph_rpc::Result<()> {
		self.rpc
			.call::<_, IgnoredAny>(Self::IDENTIFIER, "$updateStoragePath", (path,))
			.await
			.map(|_| ())
	}

	pub async fn activate_by_event(&self, event: &str) -> ph_rpc::Result<()> {
		self.rpc
			.call::<_, IgnoredAny>(Self::IDENTIFIER, "$activateByEvent", (event,))
			.await
			.map(|_| ())
	}
}
