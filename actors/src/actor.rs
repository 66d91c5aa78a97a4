// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

use std::{any::type_name, fmt, sync::Arc};

use async_trait::async_trait;

use crate::{ActorContext, QueueCapacity, SendError};

/// The actor exit status represents the outcome of the execution of an actor,
/// after the end of the execution.
///
/// It is in many ways, similar to the exit status code of a program.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ActorExitStatus {
	/// The actor successfully exited.
	///
	/// It happens either because:
	/// - all of the existing messagebuses were dropped and the actor message queue was
	///   exhausted. No new message could ever arrive to the actor. (This exit is triggered by the
	///   framework.) or
	/// - the actor's handler returned `Err(ActorExitStatus::Success)`. (This exit is triggered by
	///   the actor implementer.)
	///
	/// Note that this is not really an error.
	#[error("success")]
	Success,

	/// The actor was asked to gracefully shutdown.
	///
	/// Semantically equivalent to SIGINT/Ctrl-C.
	#[error("quit")]
	Quit,

	/// The actor tried to send a message to a downstream actor and failed.
	/// The logic ruled that the actor should be killed.
	///
	/// Semantically equivalent to SIGPIPE.
	#[error("downstream actor exited")]
	DownstreamClosed,

	/// The actor was killed.
	///
	/// It can happen because:
	/// - it received `Command::Quit` and someone is waiting on `kill()` specifically.
	/// - its terminate signal was activated, by itself, a sibling actor, or its supervisor's
	///   heartbeat watchdog.
	///
	/// Semantically equivalent to SIGKILL.
	#[error("killed")]
	Killed,

	/// An unexpected error happened while processing a message.
	#[error("failure(cause={0:?})")]
	Failure(Arc<anyhow::Error>),

	/// The thread or the task executing the actor loop panicked.
	#[error("panicked")]
	Panicked,
}

impl From<anyhow::Error> for ActorExitStatus {
	fn from(err: anyhow::Error) -> Self {
		ActorExitStatus::Failure(Arc::new(err))
	}
}

impl From<SendError> for ActorExitStatus {
	fn from(_: SendError) -> Self {
		ActorExitStatus::DownstreamClosed
	}
}

impl ActorExitStatus {
	pub fn is_success(&self) -> bool {
		matches!(self, ActorExitStatus::Success)
	}
}

/// An actor has an internal state and processes a stream of messages.
/// Each actor has a messagebus where the messages are enqueued before being processed.
///
/// While processing a message, the actor typically
/// - updates its state;
/// - emits one or more messages to other actors.
#[async_trait]
pub trait Actor: Send + Sync + Sized + 'static {
	/// Piece of state that can be copied for assert in unit test, admin, etc.
	type ObservableState: Send + Sync + Clone + serde::Serialize + fmt::Debug;

	/// A name identifying the type of actor.
	///
	/// It does not need to be "instance-unique" and can be the name of the actor
	/// implementation.
	fn name(&self) -> String {
		type_name::<Self>().to_string()
	}

	/// The runtime on which the actor loop is spawned.
	///
	/// Actors whose handlers may block for more than a few dozen microseconds should
	/// override this to return the handle of a dedicated blocking runtime (see
	/// `common::RuntimeType::Blocking`).
	fn runtime_handle(&self) -> tokio::runtime::Handle {
		tokio::runtime::Handle::current()
	}

	/// If set to true, the actor will yield after every single message.
	///
	/// For actors that are mostly waiting on `.await` points already, returning `false`
	/// can yield better throughput since the scheduler drains the mailbox without giving
	/// other tasks a chance to run in between.
	fn yield_after_each_message(&self) -> bool {
		true
	}

	/// The actor's incoming mailbox queue capacity. It is set when the actor is spawned.
	fn queue_capacity(&self) -> QueueCapacity {
		QueueCapacity::Unbounded
	}

	/// Extracts an observable state. Useful for unit tests, and admin UI.
	///
	/// This function should return quickly.
	fn observable_state(&self) -> Self::ObservableState;

	/// Called before the actor starts processing messages.
	///
	/// This function is useful, for instance, to schedule an initial self-message in a
	/// looping actor. It can be thought of as an implicit first message.
	///
	/// Returning an `ActorExitStatus` here has the same effect as returning it from a
	/// handler: the actor stops, `finalize` is called, and the terminate signal may be
	/// activated.
	async fn initialize(&mut self, _ctx: &ActorContext<Self>) -> Result<(), ActorExitStatus> {
		Ok(())
	}

	/// Called once the mailbox has been fully drained and no more messages are
	/// immediately available.
	///
	/// This is a natural place for an actor to go "idle" on purpose, e.g. schedule its
	/// next wake-up.
	async fn on_drained_messages(&mut self, _ctx: &ActorContext<Self>) -> Result<(), ActorExitStatus> {
		Ok(())
	}

	/// Hook called exactly once, regardless of why the actor exited.
	///
	/// The exit status is passed so that the actor can act conditionally on it &mdash; for
	/// instance, doing as little work as possible when `exit_status` is `Killed`.
	async fn finalize(
		&mut self,
		_exit_status: &ActorExitStatus,
		_ctx: &ActorContext<Self>,
	) -> anyhow::Result<()> {
		Ok(())
	}
}

/// `Handler<M>` is the trait implemented by an actor to process messages of type `M`.
///
/// An actor can implement `Handler<M>` for several different `M` types.
#[async_trait]
pub trait Handler<M>: Actor {
	type Reply: Send + 'static;

	/// Processes a message.
	///
	/// If an exit status is returned as an error, the actor will exit: it stops processing
	/// further messages, `finalize` is called, and its exit status is the one carried by the
	/// error.
	async fn handle(
		&mut self,
		message: M,
		ctx: &ActorContext<Self>,
	) -> Result<Self::Reply, ActorExitStatus>;
}

/// `DeferableReplyHandler<M>` decouples "processing a message" from "producing a reply
/// through a given channel".
///
/// It exists so that the mailbox's envelope machinery does not need to know anything
/// about `oneshot` channels: it only needs to hand the actor a message and a callback to
/// invoke with the reply. Every `Handler<M>` gets a blanket implementation that simply
/// calls `handle` and forwards its result to the callback.
#[async_trait]
pub trait DeferableReplyHandler<M>: Actor {
	type Reply: Send + 'static;

	async fn handle_message(
		&mut self,
		message: M,
		reply: impl FnOnce(Self::Reply) + Send + 'static,
		ctx: &ActorContext<Self>,
	) -> Result<(), ActorExitStatus>;
}

#[async_trait]
impl<A, M> DeferableReplyHandler<M> for A
where
	A: Handler<M>,
	M: Send + 'static,
{
	type Reply = <A as Handler<M>>::Reply;

	async fn handle_message(
		&mut self,
		message: M,
		reply: impl FnOnce(Self::Reply) + Send + 'static,
		ctx: &ActorContext<Self>,
	) -> Result<(), ActorExitStatus> {
		let response = self.handle(message, ctx).await?;
		reply(response);
		Ok(())
	}
}
