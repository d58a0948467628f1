use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use futures::future::{self, BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::{
	error::{Error, Result},
	message::{PositionalArgs, RemoteError},
	RpcIdentifier,
};

type BoxedHandler =
	Box<dyn Fn(Vec<Value>) -> BoxFuture<'static, std::result::Result<Value, RemoteError>> + Send + Sync>;

/// Type erased `$method -> handler` table of one registered local object.
pub(crate) struct HandlerTable {
	rpc_id: String,
	handlers: HashMap<&'static str, BoxedHandler>,
}

impl HandlerTable {
	pub(crate) fn invoke(
		&self,
		method: &str,
		args: Vec<Value>,
	) -> BoxFuture<'static, std::result::Result<Value, RemoteError>> {
		match self.handlers.get(method) {
			Some(handler) => handler(args),
			None => future::ready(Err(RemoteError::new(format!(
				"unknown method '{method}' on '{}'",
				self.rpc_id
			))))
			.boxed(),
		}
	}

	#[cfg(test)]
	pub(crate) fn methods(&self) -> Vec<&'static str> {
		let mut methods = self.handlers.keys().copied().collect::<Vec<_>>();
		methods.sort_unstable();
		methods
	}
}

/// A local object together with the remote methods it serves.
pub struct LocalService<S> {
	target: Arc<S>,
	table: HandlerTable,
}

impl<S: Send + Sync + 'static> LocalService<S> {
	pub fn builder(identifier: RpcIdentifier, target: Arc<S>) -> LocalServiceBuilder<S> {
		LocalServiceBuilder {
			rpc_id: identifier.key(),
			target,
			handlers: HashMap::new(),
			error: None,
		}
	}

	pub(crate) fn rpc_id(&self) -> &str {
		&self.table.rpc_id
	}

	pub(crate) fn into_parts(self) -> (Arc<S>, HandlerTable) {
		(self.target, self.table)
	}
}

/// Declares the typed handlers of a [`LocalService`].
///
/// Arguments are decoded from the positional array of the request into the handler's
/// argument tuple, omitted trailing arguments reading as `null`. Results are encoded back to
/// JSON. Method names are validated when
/// declared and reported by [`build`](Self::build).
pub struct LocalServiceBuilder<S> {
	rpc_id: String,
	target: Arc<S>,
	handlers: HashMap<&'static str, BoxedHandler>,
	error: Option<Error>,
}

impl<S: Send + Sync + 'static> LocalServiceBuilder<S> {
	#[must_use]
	pub fn method<A, R, E, F, Fut>(mut self, name: &'static str, handler: F) -> Self
	where
		A: DeserializeOwned + Send + 'static,
		R: Serialize + Send + 'static,
		E: fmt::Display + Send + 'static,
		F: Fn(Arc<S>, A) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
	{
		if self.error.is_some() {
			return self;
		}

		if !name.starts_with('$') {
			self.error = Some(Error::InvalidMethodName {
				rpc_id: self.rpc_id.clone(),
				method: name.to_string(),
			});
			return self;
		}

		if self.handlers.contains_key(name) {
			self.error = Some(Error::DuplicateMethod {
				rpc_id: self.rpc_id.clone(),
				method: name.to_string(),
			});
			return self;
		}

		let target = Arc::clone(&self.target);
		self.handlers.insert(
			name,
			Box::new(move |args| {
				match A::deserialize(PositionalArgs(args)) {
					Ok(args) => handler(Arc::clone(&target), args)
						.map(|res| {
							res.map_err(|e| RemoteError::new(e.to_string()))
								.and_then(|value| {
									serde_json::to_value(value).map_err(|e| {
										RemoteError::new(format!("failed to encode result: {e}"))
									})
								})
						})
						.boxed(),
					Err(e) => future::ready(Err(RemoteError::new(format!(
						"invalid arguments for '{name}': {e}"
					))))
					.boxed(),
				}
			}),
		);

		self
	}

	pub fn build(self) -> Result<LocalService<S>> {
		if let Some(e) = self.error {
			return Err(e);
		}

		Ok(LocalService {
			target: self.target,
			table: HandlerTable {
				rpc_id: self.rpc_id,
				handlers: self.handlers,
			},
		})
	}
}
