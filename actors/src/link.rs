// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! Links, monitors, and mailbox bouncing on exit (§4.4, §4.9).
//!
//! A link is bidirectional and cascades: when a linked actor exits, its peers receive an
//! `(exit_signal, reason)` envelope, handled by [`crate::receive_policy::pre_dispatch`] per the
//! trap_exit rule. A monitor is one-directional and never cascades a failure onto the observer;
//! it simply learns the reason.
//!
//! [`close_mailbox_bouncer`] is the other exit-time delivery path: it turns every request still
//! sitting in a closed mailbox into a synthetic error reply for its sender.

use std::sync::Arc;

use tracing::debug;

use crate::{dyn_registry::DynRegistry, make_message, receive_policy::Envelope, ExitReason};

/// The peers an actor is linked to: each entry delivers an `(exit_signal, reason)` envelope to
/// one linked peer when this actor exits.
#[derive(Default)]
pub struct LinkSet {
	peers: std::sync::Mutex<Vec<Box<dyn Fn(ExitReason) + Send + Sync>>>,
}

impl LinkSet {
	pub fn new() -> LinkSet {
		LinkSet::default()
	}

	pub fn link<F>(&self, deliver_exit_signal: F)
	where
		F: Fn(ExitReason) + Send + Sync + 'static,
	{
		self.peers.lock().unwrap().push(Box::new(deliver_exit_signal));
	}

	/// Delivers `reason` to every linked peer. Called once, on this actor's cleanup.
	pub fn cascade_exit(&self, reason: ExitReason) {
		for peer in self.peers.lock().unwrap().iter() {
			peer(reason);
		}
	}

	pub fn len(&self) -> usize {
		self.peers.lock().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// One-directional observers notified of an actor's exit reason without being asked to die
/// themselves.
#[derive(Default)]
pub struct MonitorSet {
	observers: std::sync::Mutex<Vec<Box<dyn FnMut(ExitReason) + Send>>>,
}

impl MonitorSet {
	pub fn new() -> MonitorSet {
		MonitorSet::default()
	}

	pub fn attach<F>(&self, observer: F)
	where
		F: FnMut(ExitReason) + Send + 'static,
	{
		self.observers.lock().unwrap().push(Box::new(observer));
	}

	pub fn notify_all(&self, reason: ExitReason) {
		for observer in self.observers.lock().unwrap().iter_mut() {
			observer(reason);
		}
	}

	pub fn len(&self) -> usize {
		self.observers.lock().unwrap().len()
	}
}

/// Builds the bouncer [`crate::Mailbox::close`] runs over every envelope still queued when an
/// actor's mailbox seals. Request-kind envelopes are answered with a synthetic error reply
/// carrying `reason`, delivered to the sender resolved through `registry` (§4.2/§7); anything
/// that isn't a request, or whose sender can no longer be resolved, is dropped silently.
pub fn close_mailbox_bouncer(reason: ExitReason, registry: Arc<DynRegistry>) -> impl FnMut(Envelope) {
	move |envelope: Envelope| {
		if !envelope.message_id.is_request() {
			return;
		}
		let response_id = envelope.message_id.response_id();
		match envelope.sender.and_then(|sender_id| registry.resolve(sender_id)) {
			Some(sender) => {
				let reply = Envelope::new(None, response_id, make_message!(reason));
				if sender.send(reply).is_err() {
					debug!(reason = reason.0, "bounced request's sender had already closed its own mailbox");
				}
			},
			None => {
				debug!(
					request_id = ?envelope.message_id,
					reason = reason.0,
					"bounced request had no resolvable sender to reply to"
				);
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{Arc, Mutex};

	use super::*;

	#[test]
	fn test_link_cascades_to_every_peer() {
		let links = LinkSet::new();
		let seen = Arc::new(Mutex::new(Vec::new()));
		for _ in 0..3 {
			let seen = seen.clone();
			links.link(move |reason| seen.lock().unwrap().push(reason));
		}
		links.cascade_exit(ExitReason::KILLED);
		assert_eq!(seen.lock().unwrap().len(), 3);
		assert!(seen.lock().unwrap().iter().all(|reason| *reason == ExitReason::KILLED));
	}

	#[test]
	fn test_monitor_sees_reason_without_dying() {
		let monitors = MonitorSet::new();
		let seen = Arc::new(Mutex::new(None));
		let seen_clone = seen.clone();
		monitors.attach(move |reason| *seen_clone.lock().unwrap() = Some(reason));
		monitors.notify_all(ExitReason::NORMAL);
		assert_eq!(*seen.lock().unwrap(), Some(ExitReason::NORMAL));
	}

	#[test]
	fn test_bouncer_does_not_panic_on_ordinary_message() {
		use crate::MessageId;
		let mut bouncer = close_mailbox_bouncer(ExitReason::KILLED, Arc::new(DynRegistry::new()));
		bouncer(Envelope::new(None, MessageId::UNCORRELATED, make_message!(1u32)));
	}

	#[test]
	fn test_bouncer_drops_request_with_unresolvable_sender() {
		use crate::MessageId;
		let mut bouncer = close_mailbox_bouncer(ExitReason::KILLED, Arc::new(DynRegistry::new()));
		let request_id = MessageId::new_request(1);
		// No sender was attached, and the registry is empty either way: this must not panic and
		// must not attempt delivery.
		bouncer(Envelope::new(None, request_id, make_message!(1u32)));
	}

	#[test]
	fn test_bouncer_delivers_synthetic_reply_to_resolvable_sender() {
		use std::sync::Mutex as StdMutex;

		use crate::{dyn_registry::ActorId, message_shape, Behavior, Clause, DynActor, DynEnv, MessageId};

		let registry = Arc::new(DynRegistry::new());
		let received = Arc::new(StdMutex::new(None));
		let received_clone = received.clone();
		let behavior = Behavior::builder()
			.on(Clause::new(message_shape![ExitReason], move |msg| {
				*received_clone.lock().unwrap() = msg.get_as::<ExitReason>(0).copied();
				None
			}))
			.build();
		let caller = Arc::new(DynActor::new(ActorId(1), behavior, DynEnv::for_test()));
		registry.register(ActorId(1), &caller);

		let mut bouncer = close_mailbox_bouncer(ExitReason::KILLED, registry);
		let request_id = MessageId::new_request(7);
		bouncer(Envelope::new(Some(ActorId(1)), request_id, make_message!(1u32)));

		assert_eq!(caller.resume(), None);
		assert_eq!(*received.lock().unwrap(), Some(ExitReason::KILLED));
	}
}
