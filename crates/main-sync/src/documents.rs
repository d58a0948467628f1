use std::{
	collections::HashMap,
	convert::Infallible,
	pin::pin,
	sync::{
		atomic::{AtomicU32, Ordering},
		Arc, Mutex, PoisonError,
	},
	time::Duration,
};

use futures::{Stream, StreamExt};
use ph_cache::{OwnedResource, ResourceSyncCache, DEFAULT_MAX_AGE, DEFAULT_MAX_BYTES};
use ph_rpc::{main_context, plugin_context, LocalService, RpcIdentifier, RpcProtocol, RpcProxy};
use serde::de::IgnoredAny;
use tokio::{
	spawn,
	sync::{broadcast::error::RecvError, oneshot},
	task::JoinHandle,
	time::timeout,
};
use tracing::{debug, error, instrument, trace, warn};

use super::{
	editor::{
		ApplicationShell, CreateDocumentOptions, EditorManager, EditorOpenerOptions,
		ModelChangedEvent, ModelReference, ModelService, OpenMode, OpenerService, SaveReason,
		SingleEditOperation, TextDocumentShowOptions, TextModel, UntitledResources,
		WidgetPlacement,
	},
	error::{Error, Result},
};

pub const DEFAULT_WILL_SAVE_TIMEOUT: Duration = Duration::from_millis(1750);

/// Client stub of the documents mirror living in a plugin host.
#[derive(Clone)]
pub struct DocumentsExtProxy {
	rpc: RpcProtocol,
}

impl RpcProxy for DocumentsExtProxy {
	const IDENTIFIER: RpcIdentifier = main_context::DOCUMENTS_EXT;

	fn from_rpc(rpc: RpcProtocol) -> Self {
		Self { rpc }
	}
}

impl DocumentsExtProxy {
	async fn notify<A: serde::Serialize + Send>(&self, method: &str, args: A) -> Result<()> {
		self.rpc
			.call::<_, IgnoredAny>(Self::IDENTIFIER, method, args)
			.await
			.map(|_| ())
			.map_err(Into::into)
	}

	pub async fn accept_model_changed(
		&self,
		uri: &str,
		event: &ModelChangedEvent,
		is_dirty: bool,
	) -> Result<()> {
		self.notify("$acceptModelChanged", (uri, event, is_dirty))
			.await
	}

	pub async fn accept_model_saved(&self, uri: &str) -> Result<()> {
		self.notify("$acceptModelSaved", (uri,)).await
	}

	pub async fn accept_dirty_state_changed(&self, uri: &str, is_dirty: bool) -> Result<()> {
		self.notify("$acceptDirtyStateChanged", (uri, is_dirty))
			.await
	}

	pub async fn accept_model_mode_changed(
		&self,
		uri: &str,
		old_mode_id: &str,
		new_mode_id: &str,
	) -> Result<()> {
		self.notify("$acceptModelModeChanged", (uri, old_mode_id, new_mode_id))
			.await
	}

	/// Participants may answer with edits to apply before the save proceeds.
	pub async fn accept_model_will_save(
		&self,
		uri: &str,
		reason: SaveReason,
		timeout_ms: u64,
	) -> Result<Vec<SingleEditOperation>> {
		self.rpc
			.call::<_, Option<Vec<SingleEditOperation>>>(
				Self::IDENTIFIER,
				"$acceptModelWillSave",
				(uri, reason, timeout_ms),
			)
			.await
			.map(Option::unwrap_or_default)
			.map_err(Into::into)
	}
}

/// Editor services the documents mirror works through.
#[derive(Clone)]
pub struct DocumentCollaborators {
	pub models: Arc<dyn ModelService>,
	pub editors: Arc<dyn EditorManager>,
	pub openers: Arc<dyn OpenerService>,
	pub shell: Arc<dyn ApplicationShell>,
	pub untitled: Arc<dyn UntitledResources>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentsConfig {
	pub will_save_timeout: Duration,
	pub cache_max_age: Duration,
	pub cache_max_bytes: usize,
}

impl Default for DocumentsConfig {
	fn default() -> Self {
		Self {
			will_save_timeout: DEFAULT_WILL_SAVE_TIMEOUT,
			cache_max_age: DEFAULT_MAX_AGE,
			cache_max_bytes: DEFAULT_MAX_BYTES,
		}
	}
}

/// Host side document life-cycle, as fed to [`DocumentsMain::start_event_loop`].
pub enum DocumentEvent {
	Added(Arc<dyn TextModel>),
	Removed(String),
	ModeChanged {
		model: Arc<dyn TextModel>,
		old_mode_id: String,
	},
	Saved(String),
	WillSave {
		uri: String,
		reason: SaveReason,
		respond_to: oneshot::Sender<Result<Vec<SingleEditOperation>>>,
	},
	DirtyChanged(Arc<dyn TextModel>),
}

/// Model reference held by the open-document cache.
struct CachedModel {
	reference: Box<dyn ModelReference>,
	size: usize,
}

impl CachedModel {
	fn new(reference: Box<dyn ModelReference>) -> Self {
		let size = reference.model().map_or(0, |model| model.value_length());
		Self { reference, size }
	}
}

impl OwnedResource for CachedModel {
	fn size(&self) -> usize {
		self.size
	}

	fn release(self) {
		self.reference.release();
	}
}

/// Keeps plugin side document mirrors in sync with the editor's text models.
pub struct DocumentsMain {
	proxy: DocumentsExtProxy,
	collaborators: DocumentCollaborators,
	config: DocumentsConfig,
	/// uri -> task forwarding content changes; presence means "synced".
	synced: Mutex<HashMap<String, JoinHandle<()>>>,
	model_cache: ResourceSyncCache<CachedModel>,
	last_untitled: AtomicU32,
	event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl DocumentsMain {
	#[must_use]
	pub fn new(
		proxy: DocumentsExtProxy,
		collaborators: DocumentCollaborators,
		config: DocumentsConfig,
	) -> Self {
		Self {
			proxy,
			collaborators,
			model_cache: ResourceSyncCache::new(config.cache_max_age, config.cache_max_bytes),
			config,
			synced: Mutex::default(),
			last_untitled: AtomicU32::new(0),
			event_loop: Mutex::new(None),
		}
	}

	/// Creates the documents mirror for `rpc` and exposes its `$` surface to the plugin host.
	pub fn register(
		rpc: &RpcProtocol,
		collaborators: DocumentCollaborators,
		config: DocumentsConfig,
	) -> Result<Arc<Self>> {
		let documents = Arc::new(Self::new(rpc.get_proxy(), collaborators, config));

		let service = LocalService::builder(plugin_context::DOCUMENTS_MAIN, documents)
			.method(
				"$tryCreateDocument",
				|documents: Arc<Self>, (options,): (Option<CreateDocumentOptions>,)| async move {
					Ok::<_, Infallible>(documents.try_create_document(options))
				},
			)
			.method(
				"$tryShowDocument",
				|documents: Arc<Self>,
				 (uri, options): (String, Option<TextDocumentShowOptions>)| async move {
					documents.try_show_document(&uri, options.as_ref()).await
				},
			)
			.method(
				"$trySaveDocument",
				|documents: Arc<Self>, (uri,): (String,)| async move {
					documents.try_save_document(&uri).await
				},
			)
			.method(
				"$tryOpenDocument",
				|documents: Arc<Self>, (uri,): (String,)| async move {
					documents.try_open_document(&uri).await
				},
			)
			.method(
				"$tryCloseDocument",
				|documents: Arc<Self>, (uri,): (String,)| async move {
					documents.try_close_document(&uri).await
				},
			)
			.build()?;

		Ok(rpc.set(service)?)
	}

	#[must_use]
	pub fn is_synced(&self, uri: &str) -> bool {
		self.synced
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.contains_key(uri)
	}

	#[must_use]
	pub fn cached_models(&self) -> usize {
		self.model_cache.len()
	}

	pub fn on_model_added(&self, model: Arc<dyn TextModel>) {
		let uri = model.uri();
		let mut synced = self.synced.lock().unwrap_or_else(PoisonError::into_inner);

		if synced.contains_key(&uri) {
			return;
		}

		let changes = model.subscribe_content_changes();
		let forward = spawn(forward_changes(
			self.proxy.clone(),
			uri.clone(),
			model,
			changes,
		));

		debug!(%uri, "Document synced");
		synced.insert(uri, forward);
	}

	pub fn on_model_removed(&self, uri: &str) {
		if let Some(forward) = self
			.synced
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(uri)
		{
			forward.abort();
			debug!(%uri, "Document no longer synced");
		}
	}

	pub async fn on_model_mode_changed(&self, model: &dyn TextModel, old_mode_id: &str) {
		let uri = model.uri();
		if !self.is_synced(&uri) {
			return;
		}

		if let Err(e) = self
			.proxy
			.accept_model_mode_changed(&uri, old_mode_id, &model.language_id())
			.await
		{
			error!(%uri, ?e, "Failed to forward language mode change");
		}
	}

	pub async fn on_model_saved(&self, uri: &str) {
		if let Err(e) = self.proxy.accept_model_saved(uri).await {
			error!(%uri, ?e, "Failed to forward document save");
		}
	}

	pub async fn on_model_dirty_changed(&self, model: &dyn TextModel) {
		let uri = model.uri();
		if let Err(e) = self
			.proxy
			.accept_dirty_state_changed(&uri, model.is_dirty())
			.await
		{
			error!(%uri, ?e, "Failed to forward dirty state");
		}
	}

	/// Asks will-save participants for edits, giving up once the configured deadline passes.
	#[instrument(skip(self))]
	pub async fn on_model_will_save(
		&self,
		uri: &str,
		reason: SaveReason,
	) -> Result<Vec<SingleEditOperation>> {
		let deadline = self.config.will_save_timeout;
		let timeout_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);

		timeout(
			deadline,
			self.proxy.accept_model_will_save(uri, reason, timeout_ms),
		)
		.await
		.unwrap_or_else(|_| {
			warn!(%uri, timeout_ms, "Will-save participants did not answer in time");
			Err(Error::WillSaveTimeout {
				uri: uri.to_string(),
				timeout_ms,
			})
		})
	}

	pub fn try_create_document(&self, options: Option<CreateDocumentOptions>) -> String {
		let n = self.last_untitled.fetch_add(1, Ordering::Relaxed) + 1;
		let uri = format!("untitled:/Untitled-{n}");
		let CreateDocumentOptions { language, content } = options.unwrap_or_default();

		self.collaborators.untitled.create(&uri, content, language);

		uri
	}

	pub async fn try_show_document(
		&self,
		uri: &str,
		options: Option<&TextDocumentShowOptions>,
	) -> Result<()> {
		let options = to_editor_opener_options(self.collaborators.shell.as_ref(), options);

		self.collaborators
			.openers
			.get_opener(uri, Some(&options))
			.await?
			.open(uri, Some(&options))
			.await
	}

	/// Returns whether an open editor was found for `uri`.
	pub async fn try_save_document(&self, uri: &str) -> Result<bool> {
		let Some(editor) = self.collaborators.editors.get_by_uri(uri).await else {
			return Ok(false);
		};

		editor.save().await?;
		Ok(true)
	}

	/// Loads `uri` as a text model, kept alive by the bounded cache instead of the caller.
	pub async fn try_open_document(&self, uri: &str) -> Result<bool> {
		let reference = self.collaborators.models.create_model_reference(uri).await?;

		if reference.model().is_none() {
			reference.release();
			return Ok(false);
		}

		self.model_cache.add(CachedModel::new(reference));
		trace!(%uri, cached = self.model_cache.len(), "Document opened for plugin host");

		Ok(true)
	}

	pub async fn try_close_document(&self, uri: &str) -> Result<bool> {
		let Some(editor) = self.collaborators.editors.get_by_uri(uri).await else {
			return Ok(false);
		};

		editor.save().await?;
		editor.close();
		Ok(true)
	}

	/// Feeds host document events into this mirror until the stream ends or the mirror is dropped.
	pub fn start_event_loop<S>(self: &Arc<Self>, events: S)
	where
		S: Stream<Item = DocumentEvent> + Send + 'static,
	{
		let documents = Arc::downgrade(self);

		let handle = spawn(async move {
			let mut events = pin!(events);

			while let Some(event) = events.next().await {
				let Some(documents) = documents.upgrade() else {
					break;
				};

				documents.handle_event(event).await;
			}

			trace!("Document event loop finished");
		});

		if let Some(previous) = self
			.event_loop
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.replace(handle)
		{
			previous.abort();
		}
	}

	async fn handle_event(self: Arc<Self>, event: DocumentEvent) {
		match event {
			DocumentEvent::Added(model) => self.on_model_added(model),
			DocumentEvent::Removed(uri) => self.on_model_removed(&uri),
			DocumentEvent::ModeChanged { model, old_mode_id } => {
				self.on_model_mode_changed(model.as_ref(), &old_mode_id)
					.await;
			}
			DocumentEvent::Saved(uri) => self.on_model_saved(&uri).await,
			DocumentEvent::DirtyChanged(model) => {
				self.on_model_dirty_changed(model.as_ref()).await;
			}
			DocumentEvent::WillSave {
				uri,
				reason,
				respond_to,
			} => {
				// Saves of other documents must not queue behind a slow participant
				spawn(async move {
					let res = self.on_model_will_save(&uri, reason).await;
					if respond_to.send(res).is_err() {
						trace!(%uri, "Save no longer waiting for will-save edits");
					}
				});
			}
		}
	}

	/// Drops every change subscription and releases every cached model reference.
	pub fn dispose(&self) {
		if let Some(event_loop) = self
			.event_loop
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take()
		{
			event_loop.abort();
		}

		for (_, forward) in self
			.synced
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.drain()
		{
			forward.abort();
		}

		self.model_cache.dispose();
	}
}

async fn forward_changes(
	proxy: DocumentsExtProxy,
	uri: String,
	model: Arc<dyn TextModel>,
	mut changes: tokio::sync::broadcast::Receiver<ModelChangedEvent>,
) {
	loop {
		match changes.recv().await {
			Ok(event) => {
				if let Err(e) = proxy
					.accept_model_changed(&uri, &event, model.is_dirty())
					.await
				{
					if matches!(&e, Error::Rpc(e) if e.is_channel_closed()) {
						break;
					}
					error!(%uri, version_id = event.version_id, ?e, "Failed to forward document change");
				}
			}
			Err(RecvError::Lagged(skipped)) => {
				warn!(%uri, skipped, "Document change subscription lagged behind");
			}
			Err(RecvError::Closed) => break,
		}
	}
}

/// Translates a plugin's show request into the editor's opener options.
///
/// Selections arrive 1-based and leave 0-based. A view column below 1, or none at all, targets the
/// active group; a positive column targets that split when it exists and a new split to the right
/// otherwise.
#[must_use]
pub fn to_editor_opener_options(
	shell: &dyn ApplicationShell,
	options: Option<&TextDocumentShowOptions>,
) -> EditorOpenerOptions {
	let Some(options) = options else {
		return EditorOpenerOptions {
			selection: None,
			mode: OpenMode::Activate,
			preview: None,
			widget_options: None,
		};
	};

	let widget_options = options
		.view_column
		.filter(|column| *column > 0)
		.map(|column| {
			usize::try_from(column - 1)
				.ok()
				.and_then(|index| shell.main_area_tab_bar_owner(index))
				.map_or(WidgetPlacement::SplitRight, WidgetPlacement::Ref)
		});

	EditorOpenerOptions {
		selection: options.selection.map(Into::into),
		mode: if options.preserve_focus.unwrap_or(false) {
			OpenMode::Reveal
		} else {
			OpenMode::Activate
		},
		preview: options.preview,
		widget_options,
	}
}
