use std::{
	collections::{hash_map::Entry, HashMap},
	panic::AssertUnwindSafe,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc, Mutex, PoisonError, RwLock, Weak,
	},
};

use async_channel as chan;
use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::{spawn, sync::oneshot, task::JoinHandle};
use tracing::{debug, error, instrument, trace, warn};

use super::{
	channel::{Channel, MessageSink},
	error::{Error, Result},
	message::{encode_args, CallId, RemoteError, RpcMessage},
	service::{HandlerTable, LocalService},
	RpcIdentifier,
};

type ReplySender = oneshot::Sender<std::result::Result<Value, RemoteError>>;

/// Typed client stub for an object living on the other side of a [`RpcProtocol`].
pub trait RpcProxy: Sized {
	const IDENTIFIER: RpcIdentifier;

	fn from_rpc(rpc: RpcProtocol) -> Self;
}

/// One bidirectional RPC endpoint bound to a single [`Channel`].
///
/// Outbound calls are correlated with their replies by a monotonically increasing call id,
/// so replies may arrive in any order. Inbound requests are dispatched to the objects
/// registered with [`set`](Self::set), each in its own task. Once the channel ends, every
/// outstanding call fails with [`Error::ChannelClosed`] and no new call is accepted.
#[derive(Clone)]
pub struct RpcProtocol {
	inner: Arc<Inner>,
}

struct Inner {
	host: String,
	sink: Arc<dyn MessageSink>,
	last_call_id: AtomicU64,
	calls: Mutex<CallState>,
	locals: RwLock<HashMap<String, Arc<HandlerTable>>>,
	reader: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct CallState {
	closed: bool,
	pending: HashMap<CallId, ReplySender>,
}

impl RpcProtocol {
	/// Must be called from within a tokio runtime, the inbound reader is spawned right away.
	pub fn new(host: impl Into<String>, channel: Channel) -> Self {
		let (sink, inbound) = channel.into_parts();

		let inner = Arc::new(Inner {
			host: host.into(),
			sink,
			last_call_id: AtomicU64::new(0),
			calls: Mutex::new(CallState::default()),
			locals: RwLock::new(HashMap::new()),
			reader: Mutex::new(None),
		});

		let handle = spawn(read_messages(Arc::downgrade(&inner), inbound));
		*inner
			.reader
			.lock()
			.unwrap_or_else(PoisonError::into_inner) = Some(handle);

		Self { inner }
	}

	#[must_use]
	pub fn host(&self) -> &str {
		&self.inner.host
	}

	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.inner
			.calls
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.closed
	}

	/// Invokes `method` on the remote object named by `rpc_id`.
	///
	/// `args` is serialized as a positional array: pass a tuple, or `()` for no arguments.
	/// Dropping the returned future forgets the call; a late reply is then ignored.
	pub async fn call<A, R>(&self, rpc_id: RpcIdentifier, method: &str, args: A) -> Result<R>
	where
		A: Serialize,
		R: DeserializeOwned,
	{
		let args = encode_args(args)?;
		let id = self.inner.last_call_id.fetch_add(1, Ordering::Relaxed) + 1;

		let reply_rx = {
			let mut calls = self
				.inner
				.calls
				.lock()
				.unwrap_or_else(PoisonError::into_inner);

			if calls.closed {
				return Err(self.inner.closed_error());
			}

			let (reply_tx, reply_rx) = oneshot::channel();
			calls.pending.insert(id, reply_tx);
			reply_rx
		};

		let _guard = PendingCallGuard {
			inner: &self.inner,
			id,
		};

		let request = RpcMessage::Request {
			id,
			rpc_id: rpc_id.key(),
			method: method.to_string(),
			args,
		}
		.encode()?;

		trace!(host = %self.inner.host, %rpc_id, method, id, "Sending rpc request");

		if let Err(e) = self.inner.sink.send(request) {
			warn!(host = %self.inner.host, ?e, "Failed to send rpc request, closing protocol");
			self.inner.close();
			return Err(self.inner.closed_error());
		}

		match reply_rx.await {
			Ok(Ok(value)) => serde_json::from_value(value).map_err(Into::into),
			Ok(Err(RemoteError { message, stack, .. })) => Err(Error::RemoteInvocation {
				rpc_id: rpc_id.key(),
				method: method.to_string(),
				message,
				stack,
			}),
			Err(_) => Err(self.inner.closed_error()),
		}
	}

	/// Registers a local object so the remote side can call its `$` methods.
	pub fn set<S: Send + Sync + 'static>(&self, service: LocalService<S>) -> Result<Arc<S>> {
		let rpc_id = service.rpc_id().to_string();
		let (target, table) = service.into_parts();

		match self
			.inner
			.locals
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.entry(rpc_id)
		{
			Entry::Occupied(entry) => Err(Error::DuplicateRegistration(entry.key().clone())),
			Entry::Vacant(entry) => {
				debug!(host = %self.inner.host, rpc_id = %entry.key(), "Registered local rpc object");
				entry.insert(Arc::new(table));
				Ok(target)
			}
		}
	}

	#[must_use]
	pub fn get_proxy<P: RpcProxy>(&self) -> P {
		P::from_rpc(self.clone())
	}

	/// Closes the channel, fails all outstanding calls and drops every registered object.
	#[instrument(skip(self), fields(host = %self.inner.host))]
	pub fn dispose(&self) {
		self.inner.sink.close();

		if let Some(handle) = self
			.inner
			.reader
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.take()
		{
			handle.abort();
		}

		self.inner.close();

		self.inner
			.locals
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.clear();
	}
}

impl Inner {
	fn closed_error(&self) -> Error {
		Error::ChannelClosed {
			host: self.host.clone(),
		}
	}

	fn close(&self) {
		let pending = {
			let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
			if calls.closed {
				return;
			}
			calls.closed = true;
			std::mem::take(&mut calls.pending)
		};

		debug!(
			host = %self.host,
			outstanding = pending.len(),
			"Rpc protocol closed, failing outstanding calls"
		);

		// Dropping the senders wakes every waiter with a closed channel
		drop(pending);
	}

	fn take_pending(&self, id: CallId) -> Option<ReplySender> {
		self.calls
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.pending
			.remove(&id)
	}

	fn complete(&self, id: CallId, result: std::result::Result<Value, RemoteError>) {
		if let Some(reply_tx) = self.take_pending(id) {
			// The caller may have gone away in the meantime
			reply_tx.send(result).ok();
		} else {
			trace!(host = %self.host, id, "Ignoring reply to a forgotten call");
		}
	}

	fn handle_request(&self, id: CallId, rpc_id: String, method: String, args: Vec<Value>) {
		let table = self
			.locals
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(&rpc_id)
			.cloned();

		let sink = Arc::clone(&self.sink);
		let host = self.host.clone();

		spawn(async move {
			let result = if let Some(table) = table {
				AssertUnwindSafe(async { table.invoke(&method, args).await })
					.catch_unwind()
					.await
					.unwrap_or_else(|_| {
						error!(%host, %rpc_id, %method, "Rpc handler panicked");
						Err(RemoteError::new(format!("handler for '{method}' panicked")))
					})
			} else {
				Err(RemoteError::new(format!("unknown rpc object '{rpc_id}'")))
			};

			let reply = match result {
				Ok(result) => RpcMessage::Reply { id, result },
				Err(err) => RpcMessage::ReplyErr { id, err },
			};

			match reply.encode() {
				Ok(raw) => {
					if let Err(e) = sink.send(raw) {
						debug!(%host, ?e, id, "Dropping rpc reply, channel is gone");
					}
				}
				Err(e) => error!(%host, ?e, id, "Failed to encode rpc reply"),
			}
		});
	}
}

impl Drop for Inner {
	fn drop(&mut self) {
		if let Some(handle) = self
			.reader
			.get_mut()
			.unwrap_or_else(PoisonError::into_inner)
			.take()
		{
			handle.abort();
		}
	}
}

struct PendingCallGuard<'a> {
	inner: &'a Inner,
	id: CallId,
}

impl Drop for PendingCallGuard<'_> {
	fn drop(&mut self) {
		self.inner.take_pending(self.id);
	}
}

async fn read_messages(inner: Weak<Inner>, inbound: chan::Receiver<String>) {
	while let Ok(raw) = inbound.recv().await {
		let Some(inner) = inner.upgrade() else {
			return;
		};

		match RpcMessage::decode(&raw) {
			Ok(RpcMessage::Request {
				id,
				rpc_id,
				method,
				args,
			}) => inner.handle_request(id, rpc_id, method, args),
			Ok(RpcMessage::Reply { id, result }) => inner.complete(id, Ok(result)),
			Ok(RpcMessage::ReplyErr { id, err }) => inner.complete(id, Err(err)),
			Err(e) => warn!(host = %inner.host, ?e, "Discarding malformed rpc message"),
		}
	}

	if let Some(inner) = inner.upgrade() {
		inner.close();
	}
}
