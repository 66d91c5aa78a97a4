// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! The dynamic core's dispatch loop: the pre-dispatch filter table (§4.4) and the two receive
//! modes (nestable vs. sequential) that decide what happens to a message a behavior didn't match.
//!
//! Nestable actors (thread-backed, stackful) may re-enter their own receive loop from inside a
//! handler, so an unmatched envelope is simply set aside and re-offered once a new behavior is
//! installed. Sequential actors (event-based) never re-enter; the cache plays the same role but
//! is only ever drained between top-level dispatches.

use std::{any::TypeId, collections::VecDeque};

use crate::{dyn_registry::ActorId, BehaviorStack, ExitReason, Message, MessageId, PendingSyncTable};

/// Marker slot 0 of an `(exit_signal, reason)` envelope.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExitSignal;

/// Marker slot 0 of a `(sync_timeout, id)` envelope.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SyncTimeoutMarker;

/// The two-level priority a `priority_aware` actor sorts its mailbox drain by (§4.6, §6).
/// Ignored by actors spawned without that option, which drain strictly FIFO.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Priority {
	Low,
	High,
}

impl Default for Priority {
	fn default() -> Priority {
		Priority::Low
	}
}

/// A mailbox element: the message proper plus routing metadata.
///
/// `sender` is a resolvable handle, not a bare id: the dynamic core resolves it through a
/// [`crate::DynRegistry`] to deliver a reply or a bounced response back to a live actor (§3).
#[derive(Clone)]
pub struct Envelope {
	pub sender: Option<ActorId>,
	pub message_id: MessageId,
	pub message: Message,
	pub priority: Priority,
}

impl Envelope {
	pub fn new(sender: Option<ActorId>, message_id: MessageId, message: Message) -> Envelope {
		Envelope { sender, message_id, message, priority: Priority::default() }
	}

	#[must_use]
	pub fn with_priority(mut self, priority: Priority) -> Envelope {
		self.priority = priority;
		self
	}
}

fn exit_signal_reason(message: &Message) -> Option<ExitReason> {
	(message.size() == 2 && message.type_at(0) == Some(TypeId::of::<ExitSignal>()))
		.then(|| *message.get_as::<ExitReason>(1).expect("exit_signal carries a reason"))
}

fn sync_timeout_id(message: &Message) -> Option<u64> {
	(message.size() == 2 && message.type_at(0) == Some(TypeId::of::<SyncTimeoutMarker>()))
		.then(|| *message.get_as::<u64>(1).expect("sync_timeout carries a request sequence"))
}

/// Shared, mutable state the pre-dispatch filter consults: whether the actor traps exits and
/// which, if any, receive-timeout fire is currently awaited.
pub struct PreDispatchState<'a> {
	pub trap_exit: bool,
	pub pending_timeout_id: Option<u64>,
	pub pending_sync: &'a PendingSyncTable,
}

/// The result of running the pre-dispatch filter over one envelope.
pub enum PreDispatchOutcome {
	/// Consumed here; nothing more to do (a resolved sync response, a dropped stale envelope,
	/// a dropped normal exit signal with `trap_exit == false`).
	Consumed,
	/// The actor should cascade-quit with this reason (`trap_exit == false`, non-normal exit
	/// signal).
	Quit(ExitReason),
	/// A receive-timeout fire that matches the currently awaited id; the caller should run the
	/// installed behavior's timeout handler.
	TimeoutFired,
	/// Not filtered; hand to the behavior stack for ordinary pattern dispatch.
	Proceed(Envelope),
}

/// Runs the §4.4 pre-dispatch filter table over one envelope.
pub fn pre_dispatch(envelope: Envelope, state: &PreDispatchState) -> PreDispatchOutcome {
	if envelope.message_id.is_response() {
		return if state.pending_sync.is_pending(envelope.message_id) {
			state.pending_sync.resolve(envelope.message_id, envelope.message);
			PreDispatchOutcome::Consumed
		} else {
			PreDispatchOutcome::Consumed
		};
	}
	if let Some(reason) = exit_signal_reason(&envelope.message) {
		return if state.trap_exit {
			PreDispatchOutcome::Proceed(envelope)
		} else if reason.is_normal() {
			PreDispatchOutcome::Consumed
		} else {
			PreDispatchOutcome::Quit(reason)
		};
	}
	if let Some(id) = sync_timeout_id(&envelope.message) {
		return if state.pending_timeout_id == Some(id) {
			PreDispatchOutcome::TimeoutFired
		} else {
			PreDispatchOutcome::Consumed
		};
	}
	PreDispatchOutcome::Proceed(envelope)
}

/// The outcome of offering an envelope to the current top-of-stack behavior.
pub enum DispatchResult {
	/// A clause matched; the handler ran and produced this reply (if the envelope was a
	/// request and the handler returned one — otherwise the return value is discarded
	/// silently).
	Handled(Option<Message>),
	/// No clause matched (or no behavior is installed); the envelope was cached for
	/// reconsideration under a future behavior.
	Deferred,
}

/// Holds envelopes no installed behavior has matched yet, replayed on each new installation.
#[derive(Default)]
pub struct DeferredCache {
	envelopes: VecDeque<Envelope>,
}

impl DeferredCache {
	pub fn new() -> DeferredCache {
		DeferredCache::default()
	}

	pub fn len(&self) -> usize {
		self.envelopes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.envelopes.is_empty()
	}

	/// Offers one envelope to the current top of `stack`, caching it on a miss.
	pub fn dispatch(&mut self, stack: &mut BehaviorStack, envelope: Envelope) -> DispatchResult {
		let Some(behavior) = stack.top_mut() else {
			self.envelopes.push_back(envelope);
			return DispatchResult::Deferred;
		};
		match behavior.dispatch(&envelope.message) {
			crate::behavior::DispatchOutcome::Handled(reply) => DispatchResult::Handled(reply),
			crate::behavior::DispatchOutcome::Unmatched => {
				self.envelopes.push_back(envelope);
				DispatchResult::Deferred
			},
		}
	}

	/// Re-offers every cached envelope to the (presumably just-changed) top of `stack`, in
	/// original arrival order. Envelopes that still don't match stay cached, in the same
	/// relative order; matched ones are removed and returned paired with their reply and
	/// original sender so the caller can route responses.
	pub fn sweep(&mut self, stack: &mut BehaviorStack) -> Vec<(Envelope, Option<Message>)> {
		let mut handled = Vec::new();
		let mut still_deferred = VecDeque::with_capacity(self.envelopes.len());
		for envelope in self.envelopes.drain(..) {
			let Some(behavior) = stack.top_mut() else {
				still_deferred.push_back(envelope);
				continue;
			};
			match behavior.dispatch(&envelope.message) {
				crate::behavior::DispatchOutcome::Handled(reply) => {
					handled.push((envelope, reply));
				},
				crate::behavior::DispatchOutcome::Unmatched => still_deferred.push_back(envelope),
			}
		}
		self.envelopes = still_deferred;
		handled
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{make_message, message_shape, Behavior, Clause, Mode};

	fn state(pending_sync: &PendingSyncTable) -> PreDispatchState<'_> {
		PreDispatchState { trap_exit: false, pending_timeout_id: None, pending_sync }
	}

	#[test]
	fn test_ordinary_envelope_proceeds() {
		let table = PendingSyncTable::new();
		let envelope = Envelope::new(None, MessageId::UNCORRELATED, make_message!(1u32));
		assert!(matches!(pre_dispatch(envelope, &state(&table)), PreDispatchOutcome::Proceed(_)));
	}

	#[test]
	fn test_exit_signal_without_trap_cascades_quit() {
		let table = PendingSyncTable::new();
		let envelope = Envelope::new(
			None,
			MessageId::UNCORRELATED,
			make_message!(ExitSignal, ExitReason::KILLED),
		);
		match pre_dispatch(envelope, &state(&table)) {
			PreDispatchOutcome::Quit(reason) => assert_eq!(reason, ExitReason::KILLED),
			_ => panic!("expected a cascading quit"),
		}
	}

	#[test]
	fn test_normal_exit_signal_without_trap_is_dropped() {
		let table = PendingSyncTable::new();
		let envelope =
			Envelope::new(None, MessageId::UNCORRELATED, make_message!(ExitSignal, ExitReason::NORMAL));
		assert!(matches!(pre_dispatch(envelope, &state(&table)), PreDispatchOutcome::Consumed));
	}

	#[test]
	fn test_exit_signal_with_trap_proceeds_as_ordinary_message() {
		let table = PendingSyncTable::new();
		let mut trapping_state = state(&table);
		trapping_state.trap_exit = true;
		let envelope =
			Envelope::new(None, MessageId::UNCORRELATED, make_message!(ExitSignal, ExitReason::KILLED));
		assert!(matches!(pre_dispatch(envelope, &trapping_state), PreDispatchOutcome::Proceed(_)));
	}

	#[test]
	fn test_response_envelope_resolves_pending_sync() {
		let table = PendingSyncTable::new();
		let handle = table.begin(|_msg| None);
		let response_id = handle.request_id.response_id();
		let envelope = Envelope::new(None, response_id, make_message!(1u32));
		assert!(matches!(pre_dispatch(envelope, &state(&table)), PreDispatchOutcome::Consumed));
		assert!(!table.is_pending(handle.request_id));
	}

	#[test]
	fn test_unmatched_sync_timeout_is_dropped() {
		let table = PendingSyncTable::new();
		let envelope =
			Envelope::new(None, MessageId::UNCORRELATED, make_message!(SyncTimeoutMarker, 7u64));
		assert!(matches!(pre_dispatch(envelope, &state(&table)), PreDispatchOutcome::Consumed));
	}

	#[test]
	fn test_awaited_sync_timeout_fires() {
		let table = PendingSyncTable::new();
		let mut awaiting = state(&table);
		awaiting.pending_timeout_id = Some(7);
		let envelope =
			Envelope::new(None, MessageId::UNCORRELATED, make_message!(SyncTimeoutMarker, 7u64));
		assert!(matches!(pre_dispatch(envelope, &awaiting), PreDispatchOutcome::TimeoutFired));
	}

	#[test]
	fn test_cache_sweep_replays_in_order_on_new_behavior() {
		let mut stack = BehaviorStack::with_initial(Behavior::builder().build());
		let mut cache = DeferredCache::new();
		for n in 0..3u32 {
			let envelope = Envelope::new(None, MessageId::UNCORRELATED, make_message!(n));
			assert!(matches!(cache.dispatch(&mut stack, envelope), DispatchResult::Deferred));
		}
		assert_eq!(cache.len(), 3);
		stack.install(
			Behavior::builder().on(Clause::new(message_shape![u32], |msg| Some(msg.clone()))).build(),
			Mode::Replace,
		);
		let handled = cache.sweep(&mut stack);
		assert_eq!(handled.len(), 3);
		assert!(cache.is_empty());
		for (index, (_, reply)) in handled.iter().enumerate() {
			assert_eq!(reply.as_ref().unwrap().get_as::<u32>(0), Some(&(index as u32)));
		}
	}
}
