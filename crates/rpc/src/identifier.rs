use std::fmt;

/// Which side of the host/plugin boundary owns the object an identifier addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
	/// Lives in the host application, called by plugin hosts.
	Main,
	/// Lives in a plugin host, called by the host application.
	Ext,
}

impl Side {
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Main => "main",
			Self::Ext => "ext",
		}
	}
}

/// Compile-time name of a remotely addressable API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RpcIdentifier {
	side: Side,
	name: &'static str,
}

impl RpcIdentifier {
	#[must_use]
	pub const fn main(name: &'static str) -> Self {
		Self {
			side: Side::Main,
			name,
		}
	}

	#[must_use]
	pub const fn ext(name: &'static str) -> Self {
		Self {
			side: Side::Ext,
			name,
		}
	}

	#[must_use]
	pub const fn side(&self) -> Side {
		self.side
	}

	#[must_use]
	pub const fn name(&self) -> &'static str {
		self.name
	}

	/// Key used on the wire and in the local registry.
	#[must_use]
	pub fn key(&self) -> String {
		format!("{}:{}", self.side.as_str(), self.name)
	}
}

impl fmt::Display for RpcIdentifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.side.as_str(), self.name)
	}
}

/// Objects living in plugin hosts, proxied by the host application.
pub mod main_context {
	use super::RpcIdentifier;

	pub const HOSTED_PLUGIN_MANAGER_EXT: RpcIdentifier =
		RpcIdentifier::ext("HostedPluginManagerExt");
	pub const DOCUMENTS_EXT: RpcIdentifier = RpcIdentifier::ext("DocumentsExt");
	pub const DEBUG_EXT: RpcIdentifier = RpcIdentifier::ext("DebugExt");
	pub const TREE_VIEWS_EXT: RpcIdentifier = RpcIdentifier::ext("TreeViewsExt");
}

/// Objects living in the host application, proxied by plugin hosts.
pub mod plugin_context {
	use super::RpcIdentifier;

	pub const DOCUMENTS_MAIN: RpcIdentifier = RpcIdentifier::main("DocumentsMain");
	pub const DEBUG_MAIN: RpcIdentifier = RpcIdentifier::main("DebugMain");
	pub const TREE_VIEWS_MAIN: RpcIdentifier = RpcIdentifier::main("TreeViewsMain");
}
