// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
	messagebus::Inbox, Actor, ActorContext, ActorExitStatus, ActorHandle, ActorState, Handler,
	Health, Supervisable,
};

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
pub struct SupervisorMetrics {
	pub num_panics: usize,
	pub num_errors: usize,
	pub num_kills: usize,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct SupervisorState<S> {
	pub metrics: SupervisorMetrics,
	pub state_opt: Option<S>,
}

impl<S> Default for SupervisorState<S> {
	fn default() -> Self {
		SupervisorState { metrics: Default::default(), state_opt: None }
	}
}

pub struct Supervisor<A: Actor> {
	actor_name: String,
	actor_factory: Box<dyn Fn() -> A + Send>,
	inbox: Inbox<A>,
	handle_opt: Option<ActorHandle<A>>,
	metrics: SupervisorMetrics,
}

#[derive(Debug, Copy, Clone)]
struct SuperviseLoop;

#[async_trait]
impl<A: Actor> Actor for Supervisor<A> {
	type ObservableState = SupervisorState<A::ObservableState>;

	fn observable_state(&self) -> Self::ObservableState {
		let state_opt: Option<A::ObservableState> =
			self.handle_opt.as_ref().map(|handle| handle.last_observation());
		SupervisorState { metrics: self.metrics, state_opt }
	}

	fn name(&self) -> String {
		format!("Supervisor({})", self.actor_name)
	}

	fn queue_capacity(&self) -> crate::QueueCapacity {
		crate::QueueCapacity::Unbounded
	}

	async fn initialize(&mut self, ctx: &ActorContext<Self>) -> Result<(), ActorExitStatus> {
		ctx.schedule_self_msg(*crate::HEARTBEAT, SuperviseLoop);
		Ok(())
	}

	async fn finalize(
		&mut self,
		exit_status: &ActorExitStatus,
		_ctx: &ActorContext<Self>,
	) -> anyhow::Result<()> {
		match exit_status {
			ActorExitStatus::Quit =>
				if let Some(handle) = self.handle_opt.take() {
					handle.quit().await;
				},
			ActorExitStatus::Killed =>
				if let Some(handle) = self.handle_opt.take() {
					handle.kill().await;
				},
			ActorExitStatus::Failure(_) |
			ActorExitStatus::Success |
			ActorExitStatus::DownstreamClosed => {},
			ActorExitStatus::Panicked => {},
		}

		Ok(())
	}
}

impl<A: Actor> Supervisor<A> {
	pub(crate) fn new(
		actor_name: String,
		actor_factory: Box<dyn Fn() -> A + Send>,
		inbox: Inbox<A>,
		handle: ActorHandle<A>,
	) -> Self {
		Supervisor {
			actor_name,
			actor_factory,
			inbox,
			handle_opt: Some(handle),
			metrics: Default::default(),
		}
	}

	async fn supervise(
		&mut self,
		ctx: &ActorContext<Supervisor<A>>,
	) -> Result<(), ActorExitStatus> {
		let handle_ref = self.handle_opt.as_ref().expect("The actor handle should always be set.");
		match handle_ref.check_health(true) {
			Health::Healthy => {
				handle_ref.refresh_observe();
				return Ok(());
			},
			Health::FailureOrUnhealthy => {},
			Health::Success => {
				return Err(ActorExitStatus::Success);
			},
		}
		warn!("unhealthy-actor");
		// The actor is failing we need to restart it.
		let actor_handle = self.handle_opt.take().unwrap();
		let actor_messagebus = actor_handle.messagebus().clone();
		let (actor_exit_status, _last_state) = if actor_handle.state() == ActorState::Processing {
			// The actor is probably frozen.
			// Let's kill it.
			warn!("killing");
			actor_handle.kill().await
		} else {
			actor_handle.join().await
		};
		match actor_exit_status {
			ActorExitStatus::Success => {
				return Err(ActorExitStatus::Success);
			},
			ActorExitStatus::Quit => {
				return Err(ActorExitStatus::Quit);
			},
			ActorExitStatus::DownstreamClosed => {
				return Err(ActorExitStatus::DownstreamClosed);
			},
			ActorExitStatus::Killed => {
				self.metrics.num_kills += 1;
			},
			ActorExitStatus::Failure(_err) => {
				self.metrics.num_errors += 1;
			},
			ActorExitStatus::Panicked => {
				self.metrics.num_panics += 1;
			},
		}
		info!("respawning-actor");
		let (_, actor_handle) = ctx
			.spawn_actor()
			.set_messagebuses(actor_messagebus, self.inbox.clone())
			.set_terminate_sig(ctx.terminate_sig().child())
			.spawn((*self.actor_factory)());
		self.handle_opt = Some(actor_handle);
		Ok(())
	}
}

#[async_trait]
impl<A: Actor> Handler<SuperviseLoop> for Supervisor<A> {
	type Reply = ();

	async fn handle(
		&mut self,
		_msg: SuperviseLoop,
		ctx: &ActorContext<Self>,
	) -> Result<Self::Reply, ActorExitStatus> {
		self.supervise(ctx).await?;
		ctx.schedule_self_msg(*crate::HEARTBEAT, SuperviseLoop);
		Ok(())
	}
}
