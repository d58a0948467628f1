//!
//! # Plugin Host Session
//!
//! Wires the hosted plugin runtime together for a host application:
//!
//! - [`HostConfig`] is read from `plugin-host.json` in the data directory, created on first run;
//! - [`logging::init`] installs the stdout and rolling file tracing layers;
//! - [`MainApi`] registers the documents, debug and tree view objects on every plugin host
//!   connection the lifecycle manager opens;
//! - [`Session`] owns the lifecycle manager and the main API for one run.

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

pub mod config;
pub mod logging;
mod main_api;
mod session;

pub use config::{default_data_dir, HostConfig};
pub use main_api::{HostObjects, MainApi, MainApiCollaborators};
pub use session::Session;
