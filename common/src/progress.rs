// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

use std::sync::{
	atomic::{AtomicU32, AtomicUsize, Ordering},
	Arc,
};

/// Tracks whether an actor is making progress, for the benefit of the heartbeat
/// watchdog that decides whether to kill a stalled actor.
///
/// Every observable unit of work an actor performs should call
/// [`Progress::record_progress`]. An actor that expects to block for a long
/// but legitimate amount of time (e.g. waiting on an external service) should
/// hold a [`ProtectedZoneGuard`] for the duration of the wait: as long as one
/// guard is alive, [`Progress::has_changed`] reports `true` regardless of
/// whether new progress was recorded.
#[derive(Clone, Default)]
pub struct Progress {
	inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
	value: AtomicU32,
	num_protected_zones: AtomicUsize,
}

impl Progress {
	pub fn record_progress(&self) {
		self.inner.value.fetch_add(1, Ordering::Relaxed);
	}

	pub fn protect_zone(&self) -> ProtectedZoneGuard {
		self.inner.num_protected_zones.fetch_add(1, Ordering::Release);
		ProtectedZoneGuard { progress: self.clone() }
	}

	/// Returns true if and only if progress has been made since the last call
	/// to `has_changed()`, or if a protected zone is currently held.
	///
	/// This method has side effects, as it implicitly updates the state of the
	/// `Progress` object: calling it twice in a row without progress in
	/// between will return `true` then `false`.
	pub fn has_changed(&self) -> bool {
		if self.num_protected_zones() > 0 {
			return true;
		}
		self.inner.value.swap(0, Ordering::Relaxed) > 0
	}

	fn num_protected_zones(&self) -> usize {
		self.inner.num_protected_zones.load(Ordering::Acquire)
	}
}

/// RAII guard marking a protected zone. As long as this guard is alive, the
/// `Progress` it was created from reports `has_changed() == true`, shielding
/// the actor from the heartbeat watchdog even if it does not call
/// `record_progress()`.
pub struct ProtectedZoneGuard {
	progress: Progress,
}

impl Drop for ProtectedZoneGuard {
	fn drop(&mut self) {
		self.progress.inner.num_protected_zones.fetch_sub(1, Ordering::Release);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_progress_no_activity() {
		let progress = Progress::default();
		assert!(!progress.has_changed());
	}

	#[test]
	fn test_progress_record_progress() {
		let progress = Progress::default();
		progress.record_progress();
		assert!(progress.has_changed());
		assert!(!progress.has_changed());
	}

	#[test]
	fn test_progress_protect_zone() {
		let progress = Progress::default();
		assert!(!progress.has_changed());
		let guard1 = progress.protect_zone();
		let guard2 = progress.protect_zone();
		assert!(progress.has_changed());
		assert!(progress.has_changed());
		std::mem::drop(guard1);
		assert!(progress.has_changed());
		std::mem::drop(guard2);
		assert!(!progress.has_changed());
	}
}
