//!
//! # Hosted Plugin Lifecycle
//!
//! Deploys plugin metadata to plugin hosts and activates plugin code lazily:
//!
//! - [`PluginReader`] turns unpacked plugin directories into [`PluginMetadata`], never failing
//!   on a single broken plugin;
//! - [`HostedPluginSupport`] groups plugins by target host, opens one RPC protocol per host and
//!   sends each host its `$init`;
//! - [`ActivationTracker`] records fired activation events and broadcasts them to every
//!   connected host exactly once;
//! - [`HostedPluginSupport::ensure_command_handler_registration`] holds command execution back
//!   until the plugin owning the command registered its handler.

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

mod activation;
mod error;
mod manager;
mod metadata;
mod reader;
mod services;
mod support;

pub use activation::ActivationTracker;
pub use error::{Error, Result};
pub use manager::{
	ExtPluginApi, FrontendExtApi, HostEnvironment, HostPaths, KeysToKeysToAnyValue,
	PluginManagerExtProxy, PluginManagerInitParams,
};
pub use metadata::{
	LanguageContribution, PluginCommand, PluginContribution, PluginEngine, PluginEntryPoint,
	PluginHost, PluginId, PluginMetadata, PluginModel, PluginPackage, ViewContribution,
};
pub use reader::{MetadataProcessor, MetadataScanner, PluginReader};
pub use services::{
	ChannelFactory, CommandRegistry, ContributionHandler, HostedPluginServer,
	MainPluginApiProvider, PluginPathsProvider, PreferenceProvider, WorkspaceProvider,
	WorkspaceRoot,
};
pub use support::{HostedPluginSupport, LifecycleState, PluginHostServices, PluginsInitData};
