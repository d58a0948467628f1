//!
//! # Plugin Host RPC
//!
//! Symmetric request/response protocol spoken between the host application and each of its
//! plugin hosts. Every side registers local objects under a compile-time [`RpcIdentifier`] and
//! calls the objects of the other side through typed proxies:
//!
//! ```ignore
//! let rpc = RpcProtocol::new("worker", channel);
//!
//! rpc.set(
//!     LocalService::builder(plugin_context::DOCUMENTS_MAIN, Arc::clone(&documents))
//!         .method("$trySaveDocument", |documents, (uri,): (String,)| async move {
//!             documents.try_save(&uri).await
//!         })
//!         .build()?,
//! )?;
//!
//! let manager = rpc.get_proxy::<PluginManagerExtProxy>();
//! ```
//!
//! Messages travel over a [`Channel`]: either an in-process pair or newline delimited JSON
//! over any async byte stream.

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

mod channel;
mod error;
mod identifier;
mod message;
mod protocol;
mod service;

pub use channel::{Channel, MessageSink};
pub use error::{Error, Result};
pub use identifier::{main_context, plugin_context, RpcIdentifier, Side};
pub use message::{CallId, RemoteError, RpcMessage};
pub use protocol::{RpcProtocol, RpcProxy};
pub use service::{LocalService, LocalServiceBuilder};
