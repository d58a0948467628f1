use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("rpc channel closed <host='{host}'>")]
	ChannelClosed { host: String },
	#[error("remote invocation failed <rpc_id='{rpc_id}', method='{method}'>: {message}")]
	RemoteInvocation {
		rpc_id: String,
		method: String,
		message: String,
		stack: Option<String>,
	},
	#[error("identifier already registered <rpc_id='{0}'>")]
	DuplicateRegistration(String),
	#[error("remote methods must be prefixed with '$' <rpc_id='{rpc_id}', method='{method}'>")]
	InvalidMethodName { rpc_id: String, method: String },
	#[error("method declared twice <rpc_id='{rpc_id}', method='{method}'>")]
	DuplicateMethod { rpc_id: String, method: String },

	#[error("failed to (de)serialize rpc payload: {0}")]
	Serialization(#[from] serde_json::Error),
	#[error("rpc transport I/O error: {0}")]
	Io(#[from] std::io::Error),
}

impl Error {
	#[must_use]
	pub const fn is_channel_closed(&self) -> bool {
		matches!(self, Self::ChannelClosed { .. })
	}
}

pub type Result<T> = std::result::Result<T, Error>;
