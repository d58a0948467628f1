use std::{
	collections::HashMap,
	sync::{Arc, Mutex, PoisonError},
};

use ph_main_sync::{
	DebugMain, DebugSessionManager, DocumentCollaborators, DocumentsConfig, DocumentsMain,
	TreeViewsMain, ViewRegistry,
};
use ph_plugin_host::{MainPluginApiProvider, PluginHost};
use ph_rpc::RpcProtocol;
use tracing::{debug, instrument};

/// Host application services backing the main side objects.
#[derive(Clone)]
pub struct MainApiCollaborators {
	pub documents: DocumentCollaborators,
	pub debug: Arc<dyn DebugSessionManager>,
	pub views: Arc<dyn ViewRegistry>,
}

/// Main side objects serving one plugin host.
#[derive(Clone)]
pub struct HostObjects {
	pub documents: Arc<DocumentsMain>,
	pub debug: Arc<DebugMain>,
	pub tree_views: Arc<TreeViewsMain>,
}

impl HostObjects {
	fn dispose(&self) {
		self.documents.dispose();
		self.debug.dispose();
		self.tree_views.dispose();
	}
}

/// Registers every main side object on each freshly connected plugin host.
pub struct MainApi {
	collaborators: MainApiCollaborators,
	documents_config: DocumentsConfig,
	hosts: Mutex<HashMap<PluginHost, HostObjects>>,
}

impl MainApi {
	#[must_use]
	pub fn new(collaborators: MainApiCollaborators, documents_config: DocumentsConfig) -> Self {
		Self {
			collaborators,
			documents_config,
			hosts: Mutex::default(),
		}
	}

	#[must_use]
	pub fn objects(&self, host: &PluginHost) -> Option<HostObjects> {
		self.hosts
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.get(host)
			.cloned()
	}

	pub fn dispose(&self) {
		for (_, objects) in self
			.hosts
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.drain()
		{
			objects.dispose();
		}
	}

	fn register_all(&self, rpc: &RpcProtocol) -> ph_main_sync::Result<HostObjects> {
		Ok(HostObjects {
			documents: DocumentsMain::register(
				rpc,
				self.collaborators.documents.clone(),
				self.documents_config,
			)?,
			debug: DebugMain::register(rpc, Arc::clone(&self.collaborators.debug))?,
			tree_views: TreeViewsMain::register(rpc, Arc::clone(&self.collaborators.views))?,
		})
	}
}

impl MainPluginApiProvider for MainApi {
	#[instrument(skip(self, rpc))]
	fn initialize(&self, rpc: &RpcProtocol, host: &PluginHost) -> ph_plugin_host::Result<()> {
		let objects = self.register_all(rpc).map_err(|e| match e {
			ph_main_sync::Error::Rpc(e) => ph_plugin_host::Error::Rpc(e),
			e => ph_plugin_host::Error::Channel {
				host: host.to_string(),
				reason: e.to_string(),
			},
		})?;

		if let Some(previous) = self
			.hosts
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(host.clone(), objects)
		{
			previous.dispose();
		}

		debug!("Main side objects registered");
		Ok(())
	}
}
