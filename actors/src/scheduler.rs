// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! The scheduler is the actor runtime's notion of a clock.
//!
//! In production it is a thin wrapper around Tokio's own timer: `sleep` and `schedule_event`
//! are backed by `tokio::time::sleep`. In tests, [`SchedulerClient::accelerate_time`] pauses the
//! Tokio clock (`tokio::time::pause`), which makes it auto fast-forward to the next scheduled
//! timer whenever every task in the runtime is idle. This lets tests that schedule minutes or
//! hours of delayed self-messages (see [`crate::ActorContext::schedule_self_msg`]) run in a few
//! milliseconds of wall-clock time.
//!
//! [`NoAdvanceTimeGuard`] tracks the number of in-flight operations (message delivery,
//! actor initialization) that should not be mistaken by a reader for idle time: while one is
//! held, the actor performing the operation is doing real work, even though from the clock's
//! perspective nothing is "scheduled".

use std::{
	future::Future,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

/// A lightweight, cloneable handle onto the runtime's clock.
#[derive(Clone)]
pub struct SchedulerClient {
	inner: Arc<Inner>,
}

struct Inner {
	no_advance_time: AtomicUsize,
}

impl SchedulerClient {
	pub(crate) fn new() -> SchedulerClient {
		SchedulerClient { inner: Arc::new(Inner { no_advance_time: AtomicUsize::new(0) }) }
	}

	/// Pauses the Tokio clock so that `sleep`/`schedule_event` calls fast-forward instead of
	/// waiting in real time.
	///
	/// Only meaningful in tests: calling this outside of a paused Tokio runtime has no effect
	/// beyond what `tokio::time::pause` itself documents.
    #[cfg(any(test, feature = "testsuite"))]
	pub fn accelerate_time(&self) {
		tokio::time::pause();
	}

	/// Acts as a drop-in replacement for `tokio::time::sleep`.
	///
	/// It is deliberately just that: fast-forwarding under a paused clock is entirely handled
	/// by Tokio itself, as long as the sleeping task is the only thing the runtime is waiting
	/// on.
	pub async fn sleep(&self, duration: Duration) {
		tokio::time::sleep(duration).await;
	}

	/// Schedules `callback` to run once `timeout` has elapsed.
	///
	/// The callback runs on a dedicated Tokio task, so it must be short: it is typically just
	/// enqueuing a message into a mailbox (see [`crate::ActorContext::schedule_self_msg`]).
	pub fn schedule_event<F: FnOnce() + Send + Sync + 'static>(&self, callback: F, timeout: Duration) {
		tokio::task::spawn(async move {
			tokio::time::sleep(timeout).await;
			callback();
		});
	}

	/// Returns a RAII guard marking an in-flight operation that should not be mistaken for
	/// idle time by anyone inspecting [`SchedulerClient::has_pending_work`].
	pub fn no_advance_time_guard(&self) -> NoAdvanceTimeGuard {
		self.inc_no_advance_time();
		NoAdvanceTimeGuard { scheduler_client: self.clone() }
	}

	pub(crate) fn inc_no_advance_time(&self) {
		self.inner.no_advance_time.fetch_add(1, Ordering::Release);
	}

	pub(crate) fn dec_no_advance_time(&self) {
		self.inner.no_advance_time.fetch_sub(1, Ordering::Release);
	}

	/// True if some operation is currently holding a [`NoAdvanceTimeGuard`].
	pub fn has_pending_work(&self) -> bool {
		self.inner.no_advance_time.load(Ordering::Acquire) > 0
	}

	/// Runs `fut` to completion, bookkeeping it as pending work for the duration of the call.
	pub async fn protect<Fut: Future>(&self, fut: Fut) -> Fut::Output {
		let _guard = self.no_advance_time_guard();
		fut.await
	}
}

/// Starts a fresh [`SchedulerClient`]. Every [`crate::Runtime`] owns exactly one.
pub fn start_scheduler() -> SchedulerClient {
	SchedulerClient::new()
}

/// RAII guard returned by [`SchedulerClient::no_advance_time_guard`].
pub struct NoAdvanceTimeGuard {
	scheduler_client: SchedulerClient,
}

impl Drop for NoAdvanceTimeGuard {
	fn drop(&mut self) {
		self.scheduler_client.dec_no_advance_time();
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	};

	use super::*;

	#[tokio::test]
	async fn test_scheduler_sleep() {
		let scheduler_client = start_scheduler();
		scheduler_client.sleep(Duration::from_millis(1)).await;
	}

	#[tokio::test]
	async fn test_scheduler_schedule_event() {
		let scheduler_client = start_scheduler();
		let fired = Arc::new(AtomicBool::new(false));
		let fired_clone = fired.clone();
		scheduler_client
			.schedule_event(move || fired_clone.store(true, Ordering::SeqCst), Duration::from_millis(1));
		tokio::time::sleep(Duration::from_millis(50)).await;
		assert!(fired.load(Ordering::SeqCst));
	}

	#[tokio::test]
	async fn test_no_advance_time_guard() {
		let scheduler_client = start_scheduler();
		assert!(!scheduler_client.has_pending_work());
		let guard = scheduler_client.no_advance_time_guard();
		assert!(scheduler_client.has_pending_work());
		drop(guard);
		assert!(!scheduler_client.has_pending_work());
	}

	#[tokio::test(start_paused = true)]
	async fn test_accelerated_sleep_fast_forwards() {
		let scheduler_client = start_scheduler();
		scheduler_client.accelerate_time();
		let start = tokio::time::Instant::now();
		scheduler_client.sleep(Duration::from_secs(3600)).await;
		assert!(start.elapsed() >= Duration::from_secs(3600));
	}
}
