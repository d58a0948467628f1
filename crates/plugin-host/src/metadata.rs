use std::{collections::HashMap, fmt, path::PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable plugin identity, `publisher.name@version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
	#[must_use]
	pub fn new(publisher: &str, name: &str, version: &str) -> Self {
		Self(format!("{publisher}.{name}@{version}"))
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for PluginId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Execution context a plugin is deployed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PluginHost {
	/// In-process worker of the host application.
	Frontend,
	/// Opaque id of an external host process.
	External(String),
}

const FRONTEND_HOST: &str = "frontend";

impl From<String> for PluginHost {
	fn from(host: String) -> Self {
		if host == FRONTEND_HOST {
			Self::Frontend
		} else {
			Self::External(host)
		}
	}
}

impl From<PluginHost> for String {
	fn from(host: PluginHost) -> Self {
		match host {
			PluginHost::Frontend => FRONTEND_HOST.to_string(),
			PluginHost::External(id) => id,
		}
	}
}

impl fmt::Display for PluginHost {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Frontend => f.write_str(FRONTEND_HOST),
			Self::External(id) => f.write_str(id),
		}
	}
}

/// Per host kind module paths, relative to the package until the reader resolves them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginEntryPoint {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frontend: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub backend: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub webworker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginEngine {
	#[serde(rename = "type")]
	pub kind: String,
	pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginCommand {
	pub command: String,
	pub title: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageContribution {
	pub id: String,
	#[serde(default)]
	pub extensions: Vec<String>,
	#[serde(default)]
	pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewContribution {
	pub id: String,
	pub name: String,
}

/// Contribution points declared by a plugin. Points this layer doesn't interpret are kept
/// verbatim in `other` for the contribution handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginContribution {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub commands: Vec<PluginCommand>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub languages: Vec<LanguageContribution>,
	#[serde(default, skip_serializing_if = "HashMap::is_empty")]
	pub views: HashMap<String, Vec<ViewContribution>>,
	#[serde(flatten)]
	pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginModel {
	pub id: PluginId,
	pub name: String,
	pub publisher: String,
	pub version: String,
	#[serde(default)]
	pub display_name: String,
	#[serde(default)]
	pub description: String,
	pub engine: PluginEngine,
	pub entry_point: PluginEntryPoint,
	pub package_path: PathBuf,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub activation_events: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub contributes: Option<PluginContribution>,
}

impl PluginModel {
	/// Key identifying the plugin on external host channels and in file lookups:
	/// `publisher_name` with every non-word character replaced by `_`.
	#[must_use]
	pub fn routing_key(&self) -> String {
		format!("{}_{}", self.publisher, self.name)
			.chars()
			.map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
			.collect()
	}
}

/// Raw manifest of a plugin package, after localization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginPackage {
	pub package_path: PathBuf,
	pub manifest: Value,
}

/// Everything the lifecycle manager knows about one deployed plugin. Immutable once deployed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
	pub host: PluginHost,
	pub source: PluginPackage,
	pub model: PluginModel,
}

impl PluginMetadata {
	/// A frontend entry point forces the in-process worker, whatever host was declared.
	#[must_use]
	pub fn target_host(&self) -> PluginHost {
		if self.model.entry_point.frontend.is_some() {
			PluginHost::Frontend
		} else {
			self.host.clone()
		}
	}
}
