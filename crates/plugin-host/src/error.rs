use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Rpc(#[from] ph_rpc::Error),
	#[error("failed to gather plugin initialization data: {0}")]
	Gathering(String),
	#[error("failed to open plugin host channel <host='{host}'>: {reason}")]
	Channel { host: String, reason: String },
	#[error("activation failed <host='{host}', event='{event}'>: {source}")]
	Activation {
		host: String,
		event: String,
		#[source]
		source: ph_rpc::Error,
	},
	#[error("activation task aborted <event='{event}'>: {reason}")]
	ActivationAborted { event: String, reason: String },
	#[error("command handler registrations stopped before handler arrived <command_id='{0}'>")]
	CommandHandlerSignalClosed(String),

	#[error("failed to read plugin file <path='{}'>: {source}", .path.display())]
	ManifestIo {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to parse plugin file <path='{}'>: {source}", .path.display())]
	ManifestParse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
	#[error("metadata scanner rejected plugin <path='{}'>: {reason}", .path.display())]
	Scan { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
