//! Editor side contracts and the document shapes exchanged with plugin hosts.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::error::Result;

/// 1-based range, as plugin hosts speak it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
	pub start_line_number: u32,
	pub start_column: u32,
	pub end_line_number: u32,
	pub end_column: u32,
}

/// 0-based position, as the editor speaks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
	pub line: u32,
	pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorRange {
	pub start: Position,
	pub end: Position,
}

impl From<Range> for EditorRange {
	fn from(range: Range) -> Self {
		Self {
			start: Position {
				line: range.start_line_number.saturating_sub(1),
				character: range.start_column.saturating_sub(1),
			},
			end: Position {
				line: range.end_line_number.saturating_sub(1),
				character: range.end_column.saturating_sub(1),
			},
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelContentChange {
	pub range: Range,
	pub range_offset: u32,
	pub range_length: u32,
	pub text: String,
}

/// Content delta of a text model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelChangedEvent {
	pub eol: String,
	pub version_id: u64,
	pub changes: Vec<ModelContentChange>,
}

/// Edit returned by will-save participants, applied before the save proceeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleEditOperation {
	pub range: Range,
	#[serde(default)]
	pub text: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub force_move_markers: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveReason {
	Manual,
	AfterDelay,
	FocusOut,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentOptions {
	#[serde(default)]
	pub language: Option<String>,
	#[serde(default)]
	pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentShowOptions {
	#[serde(default)]
	pub selection: Option<Range>,
	#[serde(default)]
	pub preserve_focus: Option<bool>,
	#[serde(default)]
	pub preview: Option<bool>,
	#[serde(default)]
	pub view_column: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
	/// Show without taking focus.
	Reveal,
	Activate,
}

/// Where a newly opened editor goes, when not in the active group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetPlacement {
	SplitRight,
	/// Next to the widget with this id.
	Ref(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorOpenerOptions {
	pub selection: Option<EditorRange>,
	pub mode: OpenMode,
	pub preview: Option<bool>,
	/// `None` means the currently active group.
	pub widget_options: Option<WidgetPlacement>,
}

/// Live text model owned by the editor.
pub trait TextModel: Send + Sync + 'static {
	fn uri(&self) -> String;

	fn language_id(&self) -> String;

	fn is_dirty(&self) -> bool;

	fn value_length(&self) -> usize;

	fn subscribe_content_changes(&self) -> broadcast::Receiver<ModelChangedEvent>;
}

/// Counted reference keeping a text model loaded.
pub trait ModelReference: Send + 'static {
	/// `None` if the resource could not be loaded as a text model.
	fn model(&self) -> Option<Arc<dyn TextModel>>;

	fn release(self: Box<Self>);
}

#[async_trait]
pub trait ModelService: Send + Sync + 'static {
	async fn create_model_reference(&self, uri: &str) -> Result<Box<dyn ModelReference>>;
}

#[async_trait]
pub trait EditorWidget: Send + Sync + 'static {
	async fn save(&self) -> Result<()>;

	fn close(&self);
}

#[async_trait]
pub trait EditorManager: Send + Sync + 'static {
	async fn get_by_uri(&self, uri: &str) -> Option<Arc<dyn EditorWidget>>;
}

#[async_trait]
pub trait Opener: Send + Sync + 'static {
	async fn open(&self, uri: &str, options: Option<&EditorOpenerOptions>) -> Result<()>;
}

#[async_trait]
pub trait OpenerService: Send + Sync + 'static {
	async fn get_opener(
		&self,
		uri: &str,
		options: Option<&EditorOpenerOptions>,
	) -> Result<Arc<dyn Opener>>;
}

pub trait ApplicationShell: Send + Sync + 'static {
	/// Id of the current widget in the main area tab bar at `index`, if that split exists.
	fn main_area_tab_bar_owner(&self, index: usize) -> Option<String>;
}

pub trait UntitledResources: Send + Sync + 'static {
	fn create(&self, uri: &str, content: Option<String>, language: Option<String>);
}
