// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

use std::sync::Mutex;

use tokio::sync::watch;

use crate::{
	command::Observe, messagebus::Priority, registry::ActorJoinHandle, Actor, ActorContext,
	ActorExitStatus, ActorState, Command, MessageBus, Observation, ObservationType, OBSERVE_TIMEOUT,
};

/// Coarse-grained health of an actor, as seen from the outside.
///
/// This is what [`crate::Supervisor`] polls on a heartbeat to decide whether an actor needs to
/// be restarted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Health {
	/// The actor is alive and has made progress (or exited successfully).
	Healthy,
	/// The actor exited successfully. Distinct from `Healthy` so a supervisor can stop
	/// supervising instead of restarting.
	Success,
	/// The actor panicked, errored out, or did not record any progress within `HEARTBEAT`.
	FailureOrUnhealthy,
}

/// A type-erased health check, so that code aggregating the health of many different actor
/// types (e.g. an admin `/healthz` endpoint) does not need to be generic over `A`.
pub trait Healthz: Send + Sync {
	fn actor_instance_id(&self) -> &str;
	fn check_health(&self, check_for_progress: bool) -> Health;
}

/// Everything a [`crate::Supervisor`] needs from an actor handle, type-erased over the actor's
/// concrete type.
pub trait Supervisable: Healthz {
	fn pause(&self);
	fn resume(&self);
}

/// A handle onto a spawned actor.
///
/// It is the caller-facing counterpart of [`MessageBus`]: where a `MessageBus` lets anyone
/// *send* the actor messages, an `ActorHandle` lets its owner observe the actor's state, check
/// its health, and wait for (or force) its termination.
pub struct ActorHandle<A: Actor> {
	actor_context: ActorContext<A>,
	last_state: Mutex<watch::Receiver<A::ObservableState>>,
	join_handle: ActorJoinHandle,
}

impl<A: Actor> ActorHandle<A> {
	pub(crate) fn new(
		state_rx: watch::Receiver<A::ObservableState>,
		join_handle: ActorJoinHandle,
		actor_context: ActorContext<A>,
	) -> Self {
		ActorHandle { actor_context, last_state: Mutex::new(state_rx), join_handle }
	}

	pub fn messagebus(&self) -> &MessageBus<A> {
		self.actor_context.messagebus()
	}

	pub fn actor_instance_id(&self) -> &str {
		self.actor_context.actor_instance_id()
	}

	pub fn state(&self) -> ActorState {
		self.actor_context.state()
	}

	/// Returns the last observed state, without trying to trigger a fresh observation.
	pub fn last_observation(&self) -> A::ObservableState {
		self.last_state.lock().unwrap().borrow().clone()
	}

	/// Asks the actor to snapshot its state as soon as it can, ahead of whatever is currently
	/// queued in its low priority mailbox.
	///
	/// If the actor is too busy to reply within `OBSERVE_TIMEOUT`, the last known state is
	/// returned with [`ObservationType::Timeout`].
	pub async fn observe(&self) -> Observation<A::ObservableState> {
		self.observe_with_priority(Priority::High).await
	}

	/// Asks the actor to snapshot its state once it has processed everything that was queued
	/// ahead of this call in its low priority mailbox.
	pub async fn process_pending_and_observe(&self) -> Observation<A::ObservableState> {
		self.observe_with_priority(Priority::Low).await
	}

	async fn observe_with_priority(&self, priority: Priority) -> Observation<A::ObservableState> {
		match self.actor_context.messagebus().send_message_with_priority(Observe, priority).await {
			Ok(response_rx) => match tokio::time::timeout(OBSERVE_TIMEOUT, response_rx).await {
				Ok(Ok(state)) => Observation { obs_type: ObservationType::Alive, state },
				Ok(Err(_)) | Err(_) => self.stale_observation(),
			},
			Err(_) => Observation { obs_type: ObservationType::PostMortem, state: self.last_observation() },
		}
	}

	fn stale_observation(&self) -> Observation<A::ObservableState> {
		let obs_type =
			if self.state().is_exit() { ObservationType::PostMortem } else { ObservationType::Timeout };
		Observation { obs_type, state: self.last_observation() }
	}

	/// Pauses the actor.
	///
	/// A paused actor only looks at its high priority mailbox: commands and scheduled
	/// messages still get through, but regular messages accumulate until [`Self::resume`] is
	/// called.
	pub fn pause(&self) {
		self.actor_context.pause();
		self.nudge();
	}

	/// Resumes a paused actor. A no-op if the actor was not paused.
	pub fn resume(&self) {
		self.actor_context.resume();
		self.nudge();
	}

	fn nudge(&self) {
		let _ = self.actor_context.messagebus().send_message_with_high_priority(Command::Nudge);
	}

	/// Checks whether the actor is making progress.
	///
	/// `check_for_progress` should be `false` right after the actor was observed or sent a
	/// message, to give it a chance to report progress again before being declared unhealthy.
	pub fn check_health(&self, check_for_progress: bool) -> Health {
		let state = self.state();
		if state.is_exit() {
			return if state == ActorState::Success { Health::Success } else { Health::FailureOrUnhealthy };
		}
		if check_for_progress && !self.actor_context.progress().has_changed() {
			return Health::FailureOrUnhealthy;
		}
		Health::Healthy
	}

	/// Forces a fresh observation to be queued, unless one is already pending.
	///
	/// Used by the supervisor heartbeat: it is not worth blocking on a full `observe()` at
	/// every tick, but we do want the actor's observable state to be kept reasonably fresh.
	pub fn refresh_observe(&self) {
		if self.actor_context.set_observe_enqueued_and_return_previous() {
			return;
		}
		let _ = self.actor_context.messagebus().send_message_with_high_priority(Observe);
	}

	/// Waits for the actor to terminate and returns its exit status along with its
	/// post-mortem observable state.
	pub async fn join(&self) -> (ActorExitStatus, A::ObservableState) {
		let exit_status = self.join_handle.join().await;
		(exit_status, self.last_observation())
	}

	/// Asks the actor to gracefully quit, then waits for it to terminate.
	pub async fn quit(&self) -> (ActorExitStatus, A::ObservableState) {
		let _ = self.actor_context.messagebus().send_message_with_high_priority(Command::Quit);
		self.join().await
	}

	/// Forcefully kills the actor (and every other actor sharing its terminate signal), then
	/// waits for it to terminate.
	pub async fn kill(&self) -> (ActorExitStatus, A::ObservableState) {
		self.actor_context.terminate_sig().kill();
		self.nudge();
		self.join().await
	}
}

impl<A: Actor> Healthz for ActorHandle<A> {
	fn actor_instance_id(&self) -> &str {
		ActorHandle::actor_instance_id(self)
	}

	fn check_health(&self, check_for_progress: bool) -> Health {
		ActorHandle::check_health(self, check_for_progress)
	}
}

impl<A: Actor> Supervisable for ActorHandle<A> {
	fn pause(&self) {
		ActorHandle::pause(self)
	}

	fn resume(&self) {
		ActorHandle::resume(self)
	}
}
