// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! A process-wide (or per-runtime) count of live, non-hidden actors, and a blocking wait for
//! quiescence (§4.9). Hidden actors (system services) never touch this counter.

use std::sync::{Condvar, Mutex};

/// Tracks how many non-hidden actors are currently alive and lets a caller block until the rest
/// have finished.
#[derive(Default)]
pub struct QuiescenceCounter {
	count: Mutex<usize>,
	condvar: Condvar,
}

impl QuiescenceCounter {
	pub fn new() -> QuiescenceCounter {
		QuiescenceCounter::default()
	}

	pub fn spawned(&self) {
		*self.count.lock().unwrap() += 1;
	}

	pub fn despawned(&self) {
		let mut count = self.count.lock().unwrap();
		*count = count.saturating_sub(1);
		if *count <= 1 {
			self.condvar.notify_all();
		}
	}

	pub fn count(&self) -> usize {
		*self.count.lock().unwrap()
	}

	/// Blocks until at most one non-hidden actor (the caller itself, if it counts itself) is
	/// left alive.
	pub fn await_all_others_done(&self) {
		let mut count = self.count.lock().unwrap();
		while *count > 1 {
			count = self.condvar.wait(count).unwrap();
		}
	}

	/// Blocks until every non-hidden actor, including the caller's own registration if any, has
	/// finished.
	pub fn await_all_done(&self) {
		let mut count = self.count.lock().unwrap();
		while *count > 0 {
			count = self.condvar.wait(count).unwrap();
		}
	}
}
