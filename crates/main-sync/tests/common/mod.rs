#![allow(dead_code)]

use ph_main_sync::{
	ApplicationShell, DocumentCollaborators, DocumentsConfig, DocumentsMain, EditorManager,
	EditorOpenerOptions, EditorWidget, ModelChangedEvent, ModelContentChange, ModelReference,
	ModelService, Opener, OpenerService, Range, Result, SaveReason, SingleEditOperation,
	TextModel, UntitledResources,
};
use ph_rpc::{main_context, Channel, LocalService, RpcProtocol};

use std::{
	collections::HashMap,
	convert::Infallible,
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use async_trait::async_trait;
use tokio::{
	sync::{broadcast, Notify},
	time::{sleep, timeout},
};

pub struct FakeModel {
	pub uri: String,
	pub language: Mutex<String>,
	pub dirty: AtomicBool,
	pub length: usize,
	pub subscriptions: AtomicUsize,
	changes: broadcast::Sender<ModelChangedEvent>,
}

impl FakeModel {
	pub fn new(uri: &str, length: usize) -> Arc<Self> {
		Arc::new(Self {
			uri: uri.to_string(),
			language: Mutex::new("plaintext".to_string()),
			dirty: AtomicBool::new(false),
			length,
			subscriptions: AtomicUsize::new(0),
			changes: broadcast::channel(64).0,
		})
	}

	/// Inserts `text` at the start of the document as version `version_id`.
	pub fn edit(&self, version_id: u64, text: &str) {
		self.dirty.store(true, Ordering::SeqCst);
		self.changes
			.send(ModelChangedEvent {
				eol: "\n".to_string(),
				version_id,
				changes: vec![ModelContentChange {
					range: Range {
						start_line_number: 1,
						start_column: 1,
						end_line_number: 1,
						end_column: 1,
					},
					range_offset: 0,
					range_length: 0,
					text: text.to_string(),
				}],
			})
			.ok();
	}
}

impl TextModel for FakeModel {
	fn uri(&self) -> String {
		self.uri.clone()
	}

	fn language_id(&self) -> String {
		self.language.lock().unwrap().clone()
	}

	fn is_dirty(&self) -> bool {
		self.dirty.load(Ordering::SeqCst)
	}

	fn value_length(&self) -> usize {
		self.length
	}

	fn subscribe_content_changes(&self) -> broadcast::Receiver<ModelChangedEvent> {
		self.subscriptions.fetch_add(1, Ordering::SeqCst);
		self.changes.subscribe()
	}
}

struct FakeReference {
	model: Option<Arc<FakeModel>>,
	released: Arc<AtomicUsize>,
}

impl ModelReference for FakeReference {
	fn model(&self) -> Option<Arc<dyn TextModel>> {
		self.model
			.clone()
			.map(|model| model as Arc<dyn TextModel>)
	}

	fn release(self: Box<Self>) {
		self.released.fetch_add(1, Ordering::SeqCst);
	}
}

/// Resolves every uri to a text model, except those under `binary:`.
#[derive(Default)]
pub struct FakeModels {
	pub created: AtomicUsize,
	pub released: Arc<AtomicUsize>,
}

#[async_trait]
impl ModelService for FakeModels {
	async fn create_model_reference(&self, uri: &str) -> Result<Box<dyn ModelReference>> {
		self.created.fetch_add(1, Ordering::SeqCst);
		Ok(Box::new(FakeReference {
			model: (!uri.starts_with("binary:")).then(|| FakeModel::new(uri, 1024)),
			released: Arc::clone(&self.released),
		}))
	}
}

#[derive(Default)]
pub struct FakeEditor {
	pub saves: AtomicUsize,
	pub closed: AtomicBool,
}

#[async_trait]
impl EditorWidget for FakeEditor {
	async fn save(&self) -> Result<()> {
		self.saves.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	fn close(&self) {
		self.closed.store(true, Ordering::SeqCst);
	}
}

#[derive(Default)]
pub struct FakeEditors {
	pub open: Mutex<HashMap<String, Arc<FakeEditor>>>,
}

impl FakeEditors {
	pub fn open(&self, uri: &str) -> Arc<FakeEditor> {
		Arc::clone(
			self.open
				.lock()
				.unwrap()
				.entry(uri.to_string())
				.or_default(),
		)
	}
}

#[async_trait]
impl EditorManager for FakeEditors {
	async fn get_by_uri(&self, uri: &str) -> Option<Arc<dyn EditorWidget>> {
		self.open
			.lock()
			.unwrap()
			.get(uri)
			.map(|editor| Arc::clone(editor) as Arc<dyn EditorWidget>)
	}
}

#[derive(Default)]
pub struct FakeOpeners {
	pub opened: Arc<Mutex<Vec<(String, Option<EditorOpenerOptions>)>>>,
}

struct RecordingOpener {
	opened: Arc<Mutex<Vec<(String, Option<EditorOpenerOptions>)>>>,
}

#[async_trait]
impl Opener for RecordingOpener {
	async fn open(&self, uri: &str, options: Option<&EditorOpenerOptions>) -> Result<()> {
		self.opened
			.lock()
			.unwrap()
			.push((uri.to_string(), options.cloned()));
		Ok(())
	}
}

#[async_trait]
impl OpenerService for FakeOpeners {
	async fn get_opener(
		&self,
		_uri: &str,
		_options: Option<&EditorOpenerOptions>,
	) -> Result<Arc<dyn Opener>> {
		Ok(Arc::new(RecordingOpener {
			opened: Arc::clone(&self.opened),
		}))
	}
}

pub struct TwoSplits;

impl ApplicationShell for TwoSplits {
	fn main_area_tab_bar_owner(&self, index: usize) -> Option<String> {
		["left-editor", "right-editor"]
			.get(index)
			.map(ToString::to_string)
	}
}

#[derive(Default)]
pub struct FakeUntitled {
	pub created: Mutex<Vec<(String, Option<String>, Option<String>)>>,
}

impl UntitledResources for FakeUntitled {
	fn create(&self, uri: &str, content: Option<String>, language: Option<String>) {
		self.created
			.lock()
			.unwrap()
			.push((uri.to_string(), content, language));
	}
}

/// Plugin side document mirror, recording what the host application sent.
pub struct FakeDocumentsExt {
	pub changes: Mutex<Vec<(String, u64, bool)>>,
	pub saved: Mutex<Vec<String>>,
	pub dirty: Mutex<Vec<(String, bool)>>,
	pub modes: Mutex<Vec<(String, String, String)>>,
	pub will_save_edits: Mutex<Vec<SingleEditOperation>>,
	pub stall_will_save: AtomicBool,
	pub will_save_released: Notify,
}

impl Default for FakeDocumentsExt {
	fn default() -> Self {
		Self {
			changes: Mutex::default(),
			saved: Mutex::default(),
			dirty: Mutex::default(),
			modes: Mutex::default(),
			will_save_edits: Mutex::default(),
			stall_will_save: AtomicBool::new(false),
			will_save_released: Notify::new(),
		}
	}
}

impl FakeDocumentsExt {
	fn service(self: Arc<Self>) -> LocalService<Self> {
		LocalService::builder(main_context::DOCUMENTS_EXT, self)
			.method(
				"$acceptModelChanged",
				|ext: Arc<Self>, (uri, event, dirty): (String, ModelChangedEvent, bool)| async move {
					ext.changes
						.lock()
						.unwrap()
						.push((uri, event.version_id, dirty));
					Ok::<_, Infallible>(())
				},
			)
			.method(
				"$acceptModelSaved",
				|ext: Arc<Self>, (uri,): (String,)| async move {
					ext.saved.lock().unwrap().push(uri);
					Ok::<_, Infallible>(())
				},
			)
			.method(
				"$acceptDirtyStateChanged",
				|ext: Arc<Self>, (uri, dirty): (String, bool)| async move {
					ext.dirty.lock().unwrap().push((uri, dirty));
					Ok::<_, Infallible>(())
				},
			)
			.method(
				"$acceptModelModeChanged",
				|ext: Arc<Self>, (uri, old, new): (String, String, String)| async move {
					ext.modes.lock().unwrap().push((uri, old, new));
					Ok::<_, Infallible>(())
				},
			)
			.method(
				"$acceptModelWillSave",
				|ext: Arc<Self>, (_uri, _reason, _timeout_ms): (String, SaveReason, u64)| async move {
					if ext.stall_will_save.load(Ordering::SeqCst) {
						ext.will_save_released.notified().await;
					}
					Ok::<_, Infallible>(ext.will_save_edits.lock().unwrap().clone())
				},
			)
			.build()
			.unwrap()
	}
}

pub struct DocumentsFixture {
	pub documents: Arc<DocumentsMain>,
	pub ext: Arc<FakeDocumentsExt>,
	pub plugin_rpc: RpcProtocol,
	pub models: Arc<FakeModels>,
	pub editors: Arc<FakeEditors>,
	pub openers: Arc<FakeOpeners>,
	pub untitled: Arc<FakeUntitled>,
}

pub fn documents_fixture(config: DocumentsConfig) -> DocumentsFixture {
	let (main_side, plugin_side) = Channel::memory_pair();
	let main_rpc = RpcProtocol::new("plugin-host", main_side);
	let plugin_rpc = RpcProtocol::new("main", plugin_side);

	let ext = plugin_rpc
		.set(Arc::new(FakeDocumentsExt::default()).service())
		.unwrap();

	let models = Arc::new(FakeModels::default());
	let editors = Arc::new(FakeEditors::default());
	let openers = Arc::new(FakeOpeners::default());
	let untitled = Arc::new(FakeUntitled::default());

	let documents = DocumentsMain::register(
		&main_rpc,
		DocumentCollaborators {
			models: Arc::clone(&models) as _,
			editors: Arc::clone(&editors) as _,
			openers: Arc::clone(&openers) as _,
			shell: Arc::new(TwoSplits),
			untitled: Arc::clone(&untitled) as _,
		},
		config,
	)
	.unwrap();

	DocumentsFixture {
		documents,
		ext,
		plugin_rpc,
		models,
		editors,
		openers,
		untitled,
	}
}

/// Polls `condition` until it holds, failing the test after a few seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
	timeout(Duration::from_secs(5), async {
		while !condition() {
			sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("condition never became true");
}
