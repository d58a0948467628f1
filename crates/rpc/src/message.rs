use serde::{
	de::{Deserializer, Visitor},
	forward_to_deserialize_any, Deserialize, Serialize,
};
use serde_json::Value;

use super::error::Result;

/// Correlation id of an outbound call, unique for the lifetime of one protocol instance.
pub type CallId = u64;

/// Envelope exchanged over a [`Channel`](crate::Channel).
///
/// Requests address a registered local object by its identifier key; replies are
/// matched to their request solely by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcMessage {
	Request {
		id: CallId,
		rpc_id: String,
		method: String,
		#[serde(default)]
		args: Vec<Value>,
	},
	Reply {
		id: CallId,
		#[serde(default)]
		result: Value,
	},
	ReplyErr {
		id: CallId,
		err: RemoteError,
	},
}

impl RpcMessage {
	#[must_use]
	pub const fn call_id(&self) -> CallId {
		match self {
			Self::Request { id, .. } | Self::Reply { id, .. } | Self::ReplyErr { id, .. } => *id,
		}
	}

	pub fn encode(&self) -> Result<String> {
		serde_json::to_string(self).map_err(Into::into)
	}

	pub fn decode(raw: &str) -> Result<Self> {
		serde_json::from_str(raw).map_err(Into::into)
	}
}

/// Failure reported by the remote side while executing a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

impl RemoteError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			name: None,
			stack: None,
		}
	}
}

/// Arguments travel as a positional array; tuples map onto it naturally and `()` means "no args".
pub(crate) fn encode_args(args: impl Serialize) -> Result<Vec<Value>> {
	Ok(match serde_json::to_value(args)? {
		Value::Array(values) => values,
		Value::Null => Vec::new(),
		single => vec![single],
	})
}

pub(crate) fn args_value(args: Vec<Value>) -> Value {
	if args.is_empty() {
		Value::Null
	} else {
		Value::Array(args)
	}
}

/// Positional arguments decoded into a handler's argument tuple.
///
/// Missing trailing arguments read as `null` and extra ones are dropped, so callers may omit
/// optional parameters.
pub(crate) struct PositionalArgs(pub(crate) Vec<Value>);

type JsonResult<T> = std::result::Result<T, serde_json::Error>;

impl<'de> Deserializer<'de> for PositionalArgs {
	type Error = serde_json::Error;

	fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> JsonResult<V::Value> {
		args_value(self.0).deserialize_any(visitor)
	}

	fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> JsonResult<V::Value> {
		visitor.visit_unit()
	}

	fn deserialize_tuple<V: Visitor<'de>>(mut self, len: usize, visitor: V) -> JsonResult<V::Value> {
		self.0.resize(len, Value::Null);
		Value::Array(self.0).deserialize_tuple(len, visitor)
	}

	forward_to_deserialize_any! {
		bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
		bytes byte_buf option unit_struct newtype_struct seq tuple_struct
		map struct enum identifier ignored_any
	}
}
