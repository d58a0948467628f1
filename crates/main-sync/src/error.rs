use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Rpc(#[from] ph_rpc::Error),
	#[error("aborted will-save participants after {timeout_ms}ms <uri='{uri}'>")]
	WillSaveTimeout { uri: String, timeout_ms: u64 },
	#[error("no tree view registered <tree_view_id='{0}'>")]
	UnknownTreeView(String),
	#[error("editor operation failed: {0}")]
	Editor(String),
	#[error("document not found <uri='{0}'>")]
	NoSuchDocument(String),
}

pub type Result<T> = std::result::Result<T, Error>;
