// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! The dedicated timer service backing `(when, sender, receiver, id, payload)` delayed sends
//! and receive-timeout self-sends (§4.8).
//!
//! A single background thread owns a min-heap of scheduled fires ordered by deadline, parking on
//! a condvar until the nearest one is due. Receive timeouts are armed as an ordinary scheduled
//! action that performs a `(sync_timeout, id)` self-send; the `id` is compared against the
//! actor's current `pending_timeout` counter by [`crate::receive_policy::pre_dispatch`], so a
//! timeout superseded by a newer `become` self-filters instead of firing twice.

use std::{
	cmp::{Ordering, Reverse},
	collections::BinaryHeap,
	sync::{Arc, Condvar, Mutex},
	thread::{self, JoinHandle},
	time::{Duration, Instant},
};

type Action = Box<dyn FnOnce() + Send>;

struct TimedEntry {
	when: Instant,
	sequence: u64,
	action: Action,
}

impl PartialEq for TimedEntry {
	fn eq(&self, other: &Self) -> bool {
		self.when == other.when && self.sequence == other.sequence
	}
}
impl Eq for TimedEntry {}

impl PartialOrd for TimedEntry {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for TimedEntry {
	fn cmp(&self, other: &Self) -> Ordering {
		self.when.cmp(&other.when).then_with(|| self.sequence.cmp(&other.sequence))
	}
}

struct Inner {
	heap: BinaryHeap<Reverse<TimedEntry>>,
	next_sequence: u64,
	shutdown: bool,
}

struct Shared {
	state: Mutex<Inner>,
	condvar: Condvar,
}

/// A handle onto a scheduled action. Currently used only to identify entries for bookkeeping;
/// cancellation is left to the caller's own `pending_timeout` comparison (§4.8).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimerHandle(u64);

impl TimerHandle {
	pub fn sequence(&self) -> u64 {
		self.0
	}
}

/// A background thread that fires scheduled actions at their deadline.
pub struct TimerService {
	shared: Arc<Shared>,
	worker: Option<JoinHandle<()>>,
}

impl Default for TimerService {
	fn default() -> Self {
		TimerService::new()
	}
}

impl TimerService {
	pub fn new() -> TimerService {
		let shared = Arc::new(Shared {
			state: Mutex::new(Inner { heap: BinaryHeap::new(), next_sequence: 0, shutdown: false }),
			condvar: Condvar::new(),
		});
		let worker = {
			let shared = shared.clone();
			thread::spawn(move || worker_loop(&shared))
		};
		TimerService { shared, worker: Some(worker) }
	}

	/// Schedules `action` to run at `when`. `action` typically performs the asynchronous send
	/// equivalent, e.g. enqueuing a `(sync_timeout, id)` or ordinary envelope into a mailbox.
	pub fn schedule_at<F>(&self, when: Instant, action: F) -> TimerHandle
	where
		F: FnOnce() + Send + 'static,
	{
		let mut state = self.shared.state.lock().unwrap();
		let sequence = state.next_sequence;
		state.next_sequence += 1;
		state.heap.push(Reverse(TimedEntry { when, sequence, action: Box::new(action) }));
		drop(state);
		self.shared.condvar.notify_all();
		TimerHandle(sequence)
	}

	pub fn schedule_after<F>(&self, delay: Duration, action: F) -> TimerHandle
	where
		F: FnOnce() + Send + 'static,
	{
		self.schedule_at(Instant::now() + delay, action)
	}

	pub fn pending_count(&self) -> usize {
		self.shared.state.lock().unwrap().heap.len()
	}
}

impl Drop for TimerService {
	fn drop(&mut self) {
		self.shared.state.lock().unwrap().shutdown = true;
		self.shared.condvar.notify_all();
		if let Some(worker) = self.worker.take() {
			let _ = worker.join();
		}
	}
}

fn worker_loop(shared: &Shared) {
	loop {
		let mut state = shared.state.lock().unwrap();
		loop {
			if state.shutdown {
				return;
			}
			match state.heap.peek() {
				None => {
					state = shared.condvar.wait(state).unwrap();
				},
				Some(Reverse(entry)) => {
					let now = Instant::now();
					if entry.when <= now {
						break;
					}
					let (new_state, _timed_out) =
						shared.condvar.wait_timeout(state, entry.when - now).unwrap();
					state = new_state;
				},
			}
		}
		if state.shutdown {
			return;
		}
		let Reverse(entry) = state.heap.pop().expect("peeked entry is due");
		drop(state);
		(entry.action)();
	}
}
