use std::{
	fs,
	path::Path,
	sync::{Once, PoisonError, RwLock},
};

use anyhow::{anyhow, Result};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_NAME: &str = "plugin-host.log";

static INIT: Once = Once::new();
static INIT_ERROR: RwLock<Option<String>> = RwLock::new(None);

/// Initialize tracing with stdout output and a daily rolling file in `{data_dir}/logs`.
///
/// `RUST_LOG` wins over `fallback_filter`. Only the first call installs anything; later calls
/// report whatever the first one ran into.
pub fn init(data_dir: &Path, fallback_filter: &str) -> Result<()> {
	INIT.call_once(|| {
		if let Err(e) = install(data_dir, fallback_filter) {
			*INIT_ERROR.write().unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
		}
	});

	INIT_ERROR
		.read()
		.unwrap_or_else(PoisonError::into_inner)
		.as_ref()
		.map_or(Ok(()), |e| Err(anyhow!("Failed to initialize tracing: {e}")))
}

fn install(data_dir: &Path, fallback_filter: &str) -> Result<()> {
	let logs_dir = data_dir.join("logs");
	fs::create_dir_all(&logs_dir)?;

	let file_appender = RollingFileAppender::new(Rotation::DAILY, logs_dir, LOG_FILE_NAME);

	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(fallback_filter))?)
		.with(
			fmt::layer()
				.with_target(true)
				.with_thread_ids(true)
				.with_writer(std::io::stdout),
		)
		.with(
			fmt::layer()
				.with_target(true)
				.with_thread_ids(true)
				.with_ansi(false)
				.with_writer(file_appender),
		)
		.try_init()?;

	Ok(())
}
