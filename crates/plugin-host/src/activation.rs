use std::{
	collections::HashSet,
	mem,
	sync::{Mutex, PoisonError},
};

use futures_concurrency::future::Join;
use tracing::{debug, instrument};

use super::{
	error::{Error, Result},
	manager::PluginManagerExtProxy,
};

/// Session-wide record of fired activation events and of the plugin managers they are
/// broadcast to.
///
/// Firing is monotonic: an event is broadcast at most once per session. Managers retained after
/// an event fired learn about it through the catch-up list handed out by
/// [`retain_manager`](Self::retain_manager), never through a replay.
#[derive(Default)]
pub struct ActivationTracker {
	state: Mutex<TrackerState>,
}

#[derive(Default)]
struct TrackerState {
	fired: Vec<String>,
	fired_set: HashSet<String>,
	managers: Vec<PluginManagerExtProxy>,
}

impl ActivationTracker {
	/// Retains `manager` for future broadcasts and returns the events fired so far, both under
	/// the same lock so no event falls in between.
	pub fn retain_manager(&self, manager: PluginManagerExtProxy) -> Vec<String> {
		let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
		state.managers.push(manager);
		state.fired.clone()
	}

	#[must_use]
	pub fn fired_events(&self) -> Vec<String> {
		self.state
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.fired
			.clone()
	}

	#[must_use]
	pub fn has_fired(&self, event: &str) -> bool {
		self.state
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.fired_set
			.contains(event)
	}

	#[must_use]
	pub fn managers(&self) -> Vec<PluginManagerExtProxy> {
		self.state
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.managers
			.clone()
	}

	/// Records `event` and broadcasts it to every retained manager, resolving once all of them
	/// acknowledged. Already fired events resolve immediately.
	///
	/// Every manager is awaited even if one fails; the first failure is returned.
	#[instrument(skip(self))]
	pub async fn activate_by_event(&self, event: &str) -> Result<()> {
		let managers = {
			let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
			if !state.fired_set.insert(event.to_string()) {
				return Ok(());
			}
			state.fired.push(event.to_string());
			state.managers.clone()
		};

		debug!(hosts = managers.len(), "Broadcasting activation event");

		managers
			.iter()
			.map(|manager| async move {
				manager
					.activate_by_event(event)
					.await
					.map_err(|source| Error::Activation {
						host: manager.host().to_string(),
						event: event.to_string(),
						source,
					})
			})
			.collect::<Vec<_>>()
			.join()
			.await
			.into_iter()
			.collect()
	}

	/// Forgets every event and manager, returning the managers that were retained.
	pub fn clear(&self) -> Vec<PluginManagerExtProxy> {
		let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
		state.fired.clear();
		state.fired_set.clear();
		mem::take(&mut state.managers)
	}
}
