//! Contracts of the host application services the lifecycle manager depends on.

use std::path::PathBuf;

use async_trait::async_trait;
use ph_rpc::{Channel, RpcProtocol};
use serde_json::Value;
use tokio::sync::broadcast;

use super::{
	error::Result,
	manager::{ExtPluginApi, KeysToKeysToAnyValue},
	metadata::{PluginContribution, PluginHost, PluginId, PluginMetadata},
};

/// Workspace root URI.
pub type WorkspaceRoot = String;

/// Source of deployed plugin metadata and persisted plugin state.
#[async_trait]
pub trait HostedPluginServer: Send + Sync + 'static {
	async fn deployed_metadata(&self) -> Result<Vec<PluginMetadata>>;

	async fn ext_plugin_api(&self) -> Result<Vec<ExtPluginApi>>;

	/// `global` selects the global scope, otherwise the current workspace's.
	async fn key_value_storage_get_all(&self, global: bool) -> Result<KeysToKeysToAnyValue>;
}

#[async_trait]
pub trait PluginPathsProvider: Send + Sync + 'static {
	async fn host_log_path(&self) -> Result<PathBuf>;

	async fn host_storage_path(&self) -> Result<Option<PathBuf>>;
}

#[async_trait]
pub trait WorkspaceProvider: Send + Sync + 'static {
	/// Resolves once the workspace is opened.
	async fn roots(&self) -> Result<Vec<WorkspaceRoot>>;
}

#[async_trait]
pub trait PreferenceProvider: Send + Sync + 'static {
	/// Resolves once every preference scope is loaded.
	async fn ready(&self);

	/// Resolved preference values, scoped to the given roots.
	fn preferences(&self, roots: &[WorkspaceRoot]) -> Value;
}

/// Opens the transport to a plugin host.
pub trait ChannelFactory: Send + Sync + 'static {
	/// `routing_key` identifies the first plugin assigned to `host`, external hosts use it to
	/// route the connection.
	fn open(&self, host: &PluginHost, routing_key: &str) -> Result<Channel>;
}

pub trait ContributionHandler: Send + Sync + 'static {
	fn handle_contributions(&self, plugin_id: &PluginId, contributions: &PluginContribution);

	/// Whether some plugin declared `command_id`.
	fn has_command(&self, command_id: &str) -> bool;

	/// Whether a plugin already registered the concrete handler of `command_id`.
	fn has_command_handler(&self, command_id: &str) -> bool;

	/// Ids of commands whose handler just got registered by a plugin.
	fn subscribe_command_handler_registered(&self) -> broadcast::Receiver<String>;
}

pub trait CommandRegistry: Send + Sync + 'static {
	/// Whether the command is known, either with a real handler or with a placeholder.
	fn has_command(&self, command_id: &str) -> bool;
}

/// Registers host-side API objects on every freshly created plugin host protocol.
pub trait MainPluginApiProvider: Send + Sync + 'static {
	fn initialize(&self, rpc: &RpcProtocol, host: &PluginHost) -> Result<()>;
}
