use std::{
	collections::HashSet,
	convert::Infallible,
	sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use ph_rpc::{main_context, plugin_context, LocalService, RpcIdentifier, RpcProtocol, RpcProxy};
use serde::{de::IgnoredAny, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollapsibleState {
	None,
	Collapsed,
	Expanded,
}

/// Tree node as produced by a plugin's tree data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeViewItem {
	pub id: String,
	pub label: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub icon: Option<String>,
	/// Plain URL or a `{ light, dark }` pair.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub icon_url: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub theme_icon_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub resource_uri: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tooltip: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub collapsible_state: Option<CollapsibleState>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub context_value: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub command: Option<Value>,
}

/// Host view layer rendering plugin contributed trees.
#[async_trait]
pub trait ViewRegistry: Send + Sync + 'static {
	fn register_tree_view(&self, tree_view_id: &str);

	fn unregister_tree_view(&self, tree_view_id: &str);

	fn refresh(&self, tree_view_id: &str);

	async fn reveal(&self, tree_view_id: &str, tree_item_id: &str) -> Result<()>;
}

/// Client stub of the tree data providers living in a plugin host.
#[derive(Clone)]
pub struct TreeViewsExtProxy {
	rpc: RpcProtocol,
}

impl RpcProxy for TreeViewsExtProxy {
	const IDENTIFIER: RpcIdentifier = main_context::TREE_VIEWS_EXT;

	fn from_rpc(rpc: RpcProtocol) -> Self {
		Self { rpc }
	}
}

impl TreeViewsExtProxy {
	pub async fn get_children(
		&self,
		tree_view_id: &str,
		tree_item_id: Option<&str>,
	) -> Result<Option<Vec<TreeViewItem>>> {
		Ok(self
			.rpc
			.call(Self::IDENTIFIER, "$getChildren", (tree_view_id, tree_item_id))
			.await?)
	}

	pub async fn set_expanded(
		&self,
		tree_view_id: &str,
		tree_item_id: &str,
		expanded: bool,
	) -> Result<()> {
		self.rpc
			.call::<_, IgnoredAny>(
				Self::IDENTIFIER,
				"$setExpanded",
				(tree_view_id, tree_item_id, expanded),
			)
			.await?;
		Ok(())
	}
}

pub struct TreeViewsMain {
	proxy: TreeViewsExtProxy,
	views: Arc<dyn ViewRegistry>,
	registered: Mutex<HashSet<String>>,
}

impl TreeViewsMain {
	#[must_use]
	pub fn new(proxy: TreeViewsExtProxy, views: Arc<dyn ViewRegistry>) -> Self {
		Self {
			proxy,
			views,
			registered: Mutex::default(),
		}
	}

	pub fn register(rpc: &RpcProtocol, views: Arc<dyn ViewRegistry>) -> Result<Arc<Self>> {
		let tree_views = Arc::new(Self::new(rpc.get_proxy(), views));

		let service = LocalService::builder(plugin_context::TREE_VIEWS_MAIN, tree_views)
			.method(
				"$registerTreeDataProvider",
				|tree_views: Arc<Self>, (tree_view_id,): (String,)| async move {
					tree_views.register_tree_data_provider(&tree_view_id);
					Ok::<_, Infallible>(())
				},
			)
			.method(
				"$unregisterTreeDataProvider",
				|tree_views: Arc<Self>, (tree_view_id,): (String,)| async move {
					tree_views.unregister_tree_data_provider(&tree_view_id);
					Ok::<_, Infallible>(())
				},
			)
			.method(
				"$refresh",
				|tree_views: Arc<Self>, (tree_view_id,): (String,)| async move {
					tree_views.refresh(&tree_view_id)
				},
			)
			.method(
				"$reveal",
				|tree_views: Arc<Self>, (tree_view_id, tree_item_id): (String, String)| async move {
					tree_views.reveal(&tree_view_id, &tree_item_id).await
				},
			)
			.build()?;

		Ok(rpc.set(service)?)
	}

	#[must_use]
	pub fn is_registered(&self, tree_view_id: &str) -> bool {
		self.registered
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.contains(tree_view_id)
	}

	fn ensure_registered(&self, tree_view_id: &str) -> Result<()> {
		if self.is_registered(tree_view_id) {
			Ok(())
		} else {
			Err(Error::UnknownTreeView(tree_view_id.to_string()))
		}
	}

	pub fn register_tree_data_provider(&self, tree_view_id: &str) {
		if self
			.registered
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(tree_view_id.to_string())
		{
			debug!(%tree_view_id, "Registered tree data provider");
			self.views.register_tree_view(tree_view_id);
		}
	}

	pub fn unregister_tree_data_provider(&self, tree_view_id: &str) {
		if self
			.registered
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(tree_view_id)
		{
			debug!(%tree_view_id, "Unregistered tree data provider");
			self.views.unregister_tree_view(tree_view_id);
		}
	}

	pub fn refresh(&self, tree_view_id: &str) -> Result<()> {
		self.ensure_registered(tree_view_id)?;
		self.views.refresh(tree_view_id);
		Ok(())
	}

	pub async fn reveal(&self, tree_view_id: &str, tree_item_id: &str) -> Result<()> {
		self.ensure_registered(tree_view_id)?;
		self.views.reveal(tree_view_id, tree_item_id).await
	}

	/// Children of `tree_item_id`, or the roots of the view when `None`.
	pub async fn get_children(
		&self,
		tree_view_id: &str,
		tree_item_id: Option<&str>,
	) -> Result<Option<Vec<TreeViewItem>>> {
		self.ensure_registered(tree_view_id)?;
		self.proxy.get_children(tree_view_id, tree_item_id).await
	}

	pub async fn set_expanded(
		&self,
		tree_view_id: &str,
		tree_item_id: &str,
		expanded: bool,
	) -> Result<()> {
		self.ensure_registered(tree_view_id)?;
		self.proxy
			.set_expanded(tree_view_id, tree_item_id, expanded)
			.await
	}

	pub fn dispose(&self) {
		for tree_view_id in self
			.registered
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.drain()
		{
			self.views.unregister_tree_view(&tree_view_id);
		}
	}
}
