// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! Spawn-time options and the actor variant they select (§4.6).
//!
//! All three variants share the mailbox, behavior stack, and receive policy; they differ only in
//! how the actor suspends while waiting for its next message. Only the option set is modeled
//! here — each variant's actual run loop lives where it's used ([`crate::Mailbox`] for the
//! thread-backed loop, [`crate::scheduler_pool`] for the pool that drives it).

/// Which of the three suspension strategies an actor uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ActorVariant {
	/// Owns an OS thread, blocks on [`crate::Mailbox`]'s condvar.
	ThreadBacked,
	/// Owns a private stack (fiber) and yields back to the worker pool on an empty mailbox.
	///
	/// The teacher's dependency stack carries no fiber/coroutine crate, and none may be
	/// introduced to simulate one (see `DESIGN.md`). This variant is therefore implemented as a
	/// degenerate case of `ThreadBacked`: a full-blown stackful-cooperative scheduler with true
	/// stack switching is out of scope, but the nestable receive mode it requires is still
	/// provided by the receive policy (`crate::receive_policy`) / [`crate::DeferredCache`].
	StackfulCooperative,
	/// No private stack; driven purely by [`crate::BehaviorStack`] dispatch in sequential
	/// receive mode.
	EventBased,
}

/// The spawn-time option set from which [`ActorVariant`] is derived.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SpawnOptions {
	/// Forces [`ActorVariant::ThreadBacked`] regardless of the other options.
	pub detached: bool,
	/// Excludes the actor from [`crate::QuiescenceCounter`].
	pub hidden: bool,
	/// Requests free-form, blocking-style user code; selects
	/// [`ActorVariant::StackfulCooperative`] unless `detached` already forced thread-backed.
	pub blocking_api: bool,
	/// Enables the per-actor high/low [`crate::PriorityQueue`] split during mailbox drains.
	pub priority_aware: bool,
}

impl SpawnOptions {
	pub fn variant(&self) -> ActorVariant {
		if self.detached {
			ActorVariant::ThreadBacked
		} else if self.blocking_api {
			ActorVariant::StackfulCooperative
		} else {
			ActorVariant::EventBased
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_detached_forces_thread_backed() {
		let options = SpawnOptions { detached: true, blocking_api: true, ..Default::default() };
		assert_eq!(options.variant(), ActorVariant::ThreadBacked);
	}

	#[test]
	fn test_blocking_api_selects_stackful_cooperative() {
		let options = SpawnOptions { blocking_api: true, ..Default::default() };
		assert_eq!(options.variant(), ActorVariant::StackfulCooperative);
	}

	#[test]
	fn test_default_is_event_based() {
		assert_eq!(SpawnOptions::default().variant(), ActorVariant::EventBased);
	}
}
