use std::{
	collections::HashMap,
	io,
	path::{Component, Path, PathBuf},
	sync::{Arc, PoisonError, RwLock},
};

use futures_concurrency::future::TryJoin;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, error, instrument};

use super::{
	error::{Error, Result},
	metadata::{PluginMetadata, PluginPackage},
};

const MANIFEST_FILE: &str = "package.json";
const TRANSLATIONS_FILE: &str = "package.nls.json";

static NLS_REGEX: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"(?i)^%([\w\d.-]+)%$").expect("NLS placeholder pattern must compile")
});

/// Turns a localized manifest into plugin metadata. Schema knowledge lives here.
pub trait MetadataScanner: Send + Sync + 'static {
	fn scan(&self, package: PluginPackage) -> Result<PluginMetadata>;
}

/// Post-processing hook applied to every successfully scanned plugin.
pub trait MetadataProcessor: Send + Sync + 'static {
	fn process(&self, metadata: &mut PluginMetadata);
}

/// Loads plugin metadata from unpacked plugin directories.
///
/// Reading never fails: one broken plugin must not keep the others from deploying, so any error
/// is logged with the offending path and the plugin is reported as having no metadata.
pub struct PluginReader {
	scanner: Arc<dyn MetadataScanner>,
	processors: Vec<Arc<dyn MetadataProcessor>>,
	package_paths: RwLock<HashMap<String, PathBuf>>,
}

impl PluginReader {
	pub fn new(scanner: Arc<dyn MetadataScanner>) -> Self {
		Self {
			scanner,
			processors: Vec::new(),
			package_paths: RwLock::new(HashMap::new()),
		}
	}

	#[must_use]
	pub fn with_processor(mut self, processor: Arc<dyn MetadataProcessor>) -> Self {
		self.processors.push(processor);
		self
	}

	#[instrument(skip_all, fields(path = %plugin_path.as_ref().display()))]
	pub async fn get_plugin_metadata(&self, plugin_path: impl AsRef<Path>) -> Option<PluginMetadata> {
		let plugin_path = plugin_path.as_ref();

		match self.load_plugin_metadata(plugin_path).await {
			Ok(metadata) => Some(metadata),
			Err(e) => {
				error!(?e, "Failed to load plugin metadata");
				None
			}
		}
	}

	/// Resolves a file shipped inside a plugin package, by routing key.
	///
	/// Paths escaping the package directory are refused.
	#[must_use]
	pub fn resolve_plugin_file(&self, routing_key: &str, file: impl AsRef<Path>) -> Option<PathBuf> {
		let file = file.as_ref();

		if file
			.components()
			.any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
		{
			return None;
		}

		self.package_paths
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(routing_key)
			.map(|package_path| package_path.join(file))
	}

	async fn load_plugin_metadata(&self, plugin_path: &Path) -> Result<PluginMetadata> {
		let manifest = load_manifest(plugin_path).await?;

		let mut metadata = self.scanner.scan(PluginPackage {
			package_path: plugin_path.to_path_buf(),
			manifest,
		})?;

		if let Some(backend) = metadata.model.entry_point.backend.take() {
			metadata.model.entry_point.backend =
				Some(plugin_path.join(backend).to_string_lossy().into_owned());
		}

		for processor in &self.processors {
			processor.process(&mut metadata);
		}

		let routing_key = metadata.model.routing_key();
		debug!(plugin_id = %metadata.model.id, %routing_key, "Loaded plugin metadata");

		self.package_paths
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(routing_key, plugin_path.to_path_buf());

		Ok(metadata)
	}
}

async fn load_manifest(plugin_path: &Path) -> Result<Value> {
	let (manifest, translations) = (
		read_json(plugin_path.join(MANIFEST_FILE)),
		load_translations(plugin_path),
	)
		.try_join()
		.await?;

	Ok(if translations.is_empty() {
		manifest
	} else {
		localize(manifest, &translations)
	})
}

async fn load_translations(plugin_path: &Path) -> Result<Map<String, Value>> {
	match read_json(plugin_path.join(TRANSLATIONS_FILE)).await {
		Ok(Value::Object(translations)) => Ok(translations),
		Ok(_) => Ok(Map::new()),
		Err(Error::ManifestIo { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
			Ok(Map::new())
		}
		Err(e) => Err(e),
	}
}

async fn read_json(path: PathBuf) -> Result<Value> {
	let bytes = match fs::read(&path).await {
		Ok(bytes) => bytes,
		Err(source) => return Err(Error::ManifestIo { path, source }),
	};

	serde_json::from_slice(&bytes).map_err(|source| Error::ManifestParse { path, source })
}

/// Replaces every `%key%` string, at any depth, with its translation when one exists.
fn localize(value: Value, translations: &Map<String, Value>) -> Value {
	match value {
		Value::String(text) => {
			let translated = NLS_REGEX
				.captures(&text)
				.and_then(|captures| translations.get(&captures[1]))
				.and_then(Value::as_str)
				.map(str::to_string);

			Value::String(translated.unwrap_or(text))
		}
		Value::Array(items) => Value::Array(
			items
				.into_iter()
				.map(|item| localize(item, translations))
				.collect(),
		),
		Value::Object(fields) => Value::Object(
			fields
				.into_iter()
				.map(|(key, field)| (key, localize(field, translations)))
				.collect(),
		),
		other => other,
	}
}
