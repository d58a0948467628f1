//!
//! # Main Side Synchronization
//!
//! Objects living in the host application that keep plugin side mirrors in sync:
//!
//! - [`DocumentsMain`] forwards text model life-cycle to the plugin host and serves its document
//!   requests, keeping plugin opened models in a bounded [`ph_cache::ResourceSyncCache`];
//! - [`DebugMain`] mirrors debug sessions and breakpoints;
//! - [`TreeViewsMain`] bridges plugin tree data providers and the host view layer.
//!
//! Each object registers its `$` surface on one [`ph_rpc::RpcProtocol`] and talks back through
//! the matching client stub.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod debug;
mod documents;
mod editor;
mod error;
mod tree_views;

pub use debug::{
	Breakpoint, DebugConfiguration, DebugExtProxy, DebugMain, DebugSessionManager,
	DebuggerDescription, NameOrConfiguration, WorkspaceFolder,
};
pub use documents::{
	to_editor_opener_options, DocumentCollaborators, DocumentEvent, DocumentsConfig,
	DocumentsExtProxy, DocumentsMain, DEFAULT_WILL_SAVE_TIMEOUT,
};
pub use editor::{
	ApplicationShell, CreateDocumentOptions, EditorManager, EditorOpenerOptions, EditorRange,
	EditorWidget, ModelChangedEvent, ModelContentChange, ModelReference, ModelService, OpenMode,
	Opener, OpenerService, Position, Range, SaveReason, SingleEditOperation,
	TextDocumentShowOptions, TextModel, UntitledResources, WidgetPlacement,
};
pub use error::{Error, Result};
pub use tree_views::{
	CollapsibleState, TreeViewItem, TreeViewsExtProxy, TreeViewsMain, ViewRegistry,
};
