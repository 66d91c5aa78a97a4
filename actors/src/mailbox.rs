// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! The blocking mailbox used by thread-backed actors (see [`crate::ActorVariant::ThreadBacked`]).
//!
//! This is a different beast from [`crate::channel_with_priority`]: that one is an async, Tokio
//! channel shared by every ambient-runtime actor. This one is a condvar-backed queue for actors
//! that own a plain OS thread and park on it directly, matching the explicit
//! `open`/`blocked`/`about_to_block`/`closed` state machine.

use std::{
	collections::VecDeque,
	sync::{Condvar, Mutex},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
	Open,
	AboutToBlock,
	Blocked,
	Closed,
}

struct Inner<T> {
	queue: VecDeque<T>,
	state: State,
}

/// An intrusive, single-reader mailbox with an explicit parking protocol.
pub struct Mailbox<T> {
	inner: Mutex<Inner<T>>,
	condvar: Condvar,
}

impl<T> Default for Mailbox<T> {
	fn default() -> Self {
		Mailbox::new()
	}
}

impl<T> Mailbox<T> {
	pub fn new() -> Mailbox<T> {
		Mailbox {
			inner: Mutex::new(Inner { queue: VecDeque::new(), state: State::Open }),
			condvar: Condvar::new(),
		}
	}

	/// Appends `item`. Returns `Ok(true)` if the queue transitioned from empty/blocked to
	/// non-empty (the caller must wake a parked reader, or reschedule the actor), `Ok(false)`
	/// if it was already non-empty and open, or `Err(item)` handing the item back if the
	/// mailbox is closed.
	pub fn push(&self, item: T) -> Result<bool, T> {
		let mut inner = self.inner.lock().unwrap();
		if inner.state == State::Closed {
			return Err(item);
		}
		let was_blocked = matches!(inner.state, State::Blocked | State::AboutToBlock);
		let first_enqueued = was_blocked || inner.queue.is_empty();
		inner.queue.push_back(item);
		if was_blocked {
			inner.state = State::Open;
		}
		drop(inner);
		if was_blocked {
			self.condvar.notify_one();
		}
		Ok(first_enqueued)
	}

	/// Non-blocking pop. Consumer-only.
	pub fn try_pop(&self) -> Option<T> {
		self.inner.lock().unwrap().queue.pop_front()
	}

	/// Marks the reader as about to park: a racing `push` that observes this state knows it
	/// must notify rather than rely on the reader noticing the new item on its own.
	pub fn about_to_block(&self) {
		let mut inner = self.inner.lock().unwrap();
		if inner.state == State::Open && inner.queue.is_empty() {
			inner.state = State::AboutToBlock;
		}
	}

	/// Blocks until an item is available or the mailbox is closed.
	///
	/// Must be called after [`Mailbox::about_to_block`]; if a `push` raced the call and
	/// already delivered an item, this returns immediately without truly parking.
	pub fn block(&self) -> Option<T> {
		let mut inner = self.inner.lock().unwrap();
		loop {
			if let Some(item) = inner.queue.pop_front() {
				if inner.state == State::AboutToBlock {
					inner.state = State::Open;
				}
				return Some(item);
			}
			match inner.state {
				State::Closed => return None,
				State::AboutToBlock => inner.state = State::Blocked,
				_ => {},
			}
			inner = self.condvar.wait(inner).unwrap();
		}
	}

	/// Seals the mailbox. Every envelope still queued is drained through `bouncer`, which is
	/// responsible for answering request-kind envelopes with a synthetic error carrying the
	/// exit reason. A closed mailbox never reopens.
	pub fn close(&self, mut bouncer: impl FnMut(T)) {
		let mut inner = self.inner.lock().unwrap();
		inner.state = State::Closed;
		while let Some(item) = inner.queue.pop_front() {
			bouncer(item);
		}
		drop(inner);
		self.condvar.notify_all();
	}

	pub fn is_closed(&self) -> bool {
		self.inner.lock().unwrap().state == State::Closed
	}

	pub fn is_empty(&self) -> bool {
		self.inner.lock().unwrap().queue.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use std::{sync::Arc, thread, time::Duration};

	use super::*;

	#[test]
	fn test_push_try_pop() {
		let mailbox: Mailbox<u32> = Mailbox::new();
		assert_eq!(mailbox.push(1), Ok(true));
		assert_eq!(mailbox.push(2), Ok(false));
		assert_eq!(mailbox.try_pop(), Some(1));
		assert_eq!(mailbox.try_pop(), Some(2));
		assert_eq!(mailbox.try_pop(), None);
	}

	#[test]
	fn test_close_bounces_pending() {
		let mailbox: Mailbox<u32> = Mailbox::new();
		mailbox.push(1).unwrap();
		mailbox.push(2).unwrap();
		let mut bounced = Vec::new();
		mailbox.close(|item| bounced.push(item));
		assert_eq!(bounced, vec![1, 2]);
		assert!(mailbox.is_closed());
		assert_eq!(mailbox.push(3), Err(3));
	}

	#[test]
	fn test_block_wakes_on_push() {
		let mailbox = Arc::new(Mailbox::<u32>::new());
		let reader = {
			let mailbox = mailbox.clone();
			thread::spawn(move || {
				mailbox.about_to_block();
				mailbox.block()
			})
		};
		thread::sleep(Duration::from_millis(20));
		mailbox.push(42).unwrap();
		assert_eq!(reader.join().unwrap(), Some(42));
	}

	#[test]
	fn test_block_returns_none_on_close() {
		let mailbox = Arc::new(Mailbox::<u32>::new());
		let reader = {
			let mailbox = mailbox.clone();
			thread::spawn(move || {
				mailbox.about_to_block();
				mailbox.block()
			})
		};
		thread::sleep(Duration::from_millis(20));
		mailbox.close(|_: u32| panic!("nothing was queued"));
		assert_eq!(reader.join().unwrap(), None);
	}
}
