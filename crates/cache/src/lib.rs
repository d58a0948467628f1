//!
//! # Resource Sync Cache
//!
//! Keeps externally owned resource handles alive for a bounded time and within a bounded total
//! size, so mirrors requested by a remote side don't pin host memory forever.
//!
//! Every entry has its own expiry timer; on top of that, whenever the total tracked size goes
//! over the ceiling the oldest entries are evicted first, regardless of their size. Each handle
//! is released exactly once: whichever trigger removes the entry from the index owns it.

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

use std::{
	collections::VecDeque,
	mem,
	sync::{Arc, Mutex, PoisonError, Weak},
	time::Duration,
};

use tokio::{spawn, task::JoinHandle, time::sleep};
use tracing::{debug, trace};

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3 * 60);
pub const DEFAULT_MAX_BYTES: usize = 80 * 1024 * 1024;

/// A handle whose release must happen exactly once. Ownership enforces it: releasing consumes
/// the handle.
pub trait OwnedResource: Send + 'static {
	/// Domain specific weight, e.g. the content length of a text model.
	fn size(&self) -> usize;

	fn release(self);
}

pub struct ResourceSyncCache<R: OwnedResource> {
	shared: Arc<Shared<R>>,
}

struct Shared<R> {
	max_age: Duration,
	max_bytes: usize,
	state: Mutex<State<R>>,
}

struct State<R> {
	entries: VecDeque<Entry<R>>,
	total_size: usize,
	next_key: u64,
	disposed: bool,
}

struct Entry<R> {
	key: u64,
	size: usize,
	resource: R,
	expiry: JoinHandle<()>,
}

impl<R: OwnedResource> Entry<R> {
	fn release(self) {
		self.expiry.abort();
		self.resource.release();
	}
}

impl<R: OwnedResource> Default for ResourceSyncCache<R> {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_AGE, DEFAULT_MAX_BYTES)
	}
}

impl<R: OwnedResource> ResourceSyncCache<R> {
	#[must_use]
	pub fn new(max_age: Duration, max_bytes: usize) -> Self {
		Self {
			shared: Arc::new(Shared {
				max_age,
				max_bytes,
				state: Mutex::new(State {
					entries: VecDeque::new(),
					total_size: 0,
					next_key: 0,
					disposed: false,
				}),
			}),
		}
	}

	/// Tracks `resource` until it expires or is pushed out by newer entries.
	///
	/// Must be called from within a tokio runtime, each entry spawns its expiry timer.
	/// After [`dispose`](Self::dispose) the resource is released right away.
	pub fn add(&self, resource: R) {
		let size = resource.size();

		let mut state = self.shared.lock();
		if state.disposed {
			drop(state);
			resource.release();
			return;
		}

		let key = state.next_key;
		state.next_key += 1;

		let expiry = spawn(expire_after(
			Arc::downgrade(&self.shared),
			key,
			self.shared.max_age,
		));

		state.entries.push_back(Entry {
			key,
			size,
			resource,
			expiry,
		});
		state.total_size += size;

		let evicted = state.cleanup(self.shared.max_bytes);
		drop(state);

		if !evicted.is_empty() {
			debug!(
				evicted = evicted.len(),
				max_bytes = self.shared.max_bytes,
				"Evicting oldest cached resources over size ceiling"
			);
		}

		evicted.into_iter().for_each(Entry::release);
	}

	/// Releases every remaining entry. Calling it again is a no-op.
	pub fn dispose(&self) {
		let entries = {
			let mut state = self.shared.lock();
			if state.disposed {
				return;
			}
			state.disposed = true;
			state.total_size = 0;
			mem::take(&mut state.entries)
		};

		entries.into_iter().for_each(Entry::release);
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.shared.lock().entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	#[must_use]
	pub fn total_size(&self) -> usize {
		self.shared.lock().total_size
	}
}

impl<R: OwnedResource> Drop for ResourceSyncCache<R> {
	fn drop(&mut self) {
		self.dispose();
	}
}

impl<R: OwnedResource> Shared<R> {
	fn lock(&self) -> std::sync::MutexGuard<'_, State<R>> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn expire(&self, key: u64) {
		let expired = {
			let mut state = self.lock();
			let idx = state.entries.iter().position(|entry| entry.key == key);
			let expired = idx.and_then(|idx| state.entries.remove(idx));
			if let Some(entry) = &expired {
				state.total_size -= entry.size;
			}
			expired
		};

		if let Some(Entry { resource, .. }) = expired {
			trace!(key, "Cached resource expired");
			// We are the expiry task, nothing left to abort
			resource.release();
		}
	}
}

impl<R: OwnedResource> State<R> {
	fn cleanup(&mut self, max_bytes: usize) -> Vec<Entry<R>> {
		let mut evicted = Vec::new();

		while self.total_size > max_bytes {
			let Some(oldest) = self.entries.pop_front() else {
				break;
			};
			self.total_size -= oldest.size;
			evicted.push(oldest);
		}

		evicted
	}
}

async fn expire_after<R: OwnedResource>(shared: Weak<Shared<R>>, key: u64, max_age: Duration) {
	sleep(max_age).await;

	if let Some(shared) = shared.upgrade() {
		shared.expire(key);
	}
}
