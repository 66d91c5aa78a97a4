// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

#![deny(clippy::disallowed_methods)]

//! actors is an in-process actor-model runtime.
//!
//! It provides:
//! - a typed mailbox + scheduler layer (`Actor` / `Handler<M>` / `ActorContext`) where sync and
//!   async tasks communicate as supervised, observable, testable units;
//! - a dynamically typed core (`Message`, `Behavior`, `BehaviorStack`, `receive_policy`) for actors
//!   that pattern-match on an evolving set of handlers, `become`/`unbecome`, and exchange
//!   correlated synchronous requests;
//! - thread-backed, stackful-cooperative and event-based actor variants selected at spawn time.

use std::{fmt, num::NonZeroU64};

use once_cell::sync::Lazy;
use tokio::time::Duration;
mod actor;
mod actor_context;
mod actor_handle;
mod actor_state;
mod behavior;
mod behavior_stack;
#[doc(hidden)]
pub mod channel_with_priority;
mod command;
mod dyn_actor;
mod dyn_registry;
mod dyn_runtime;
mod envelope;
mod exit_reason;
mod link;
mod mailbox;
mod message;
mod messagebus;
mod observation;
mod quiescence;
mod receive_policy;
mod registry;
pub(crate) mod scheduler;
mod scheduler_pool;
mod spawn_builder;
mod supervisor;
mod sync;
mod timer;
mod variant;

pub use scheduler::{start_scheduler, SchedulerClient};

mod runtime;
#[cfg(test)]
pub(crate) mod tests;

pub use actor::{Actor, ActorExitStatus, DeferableReplyHandler, Handler};
pub use actor_handle::{ActorHandle, Health, Healthz, Supervisable};
pub use command::{Command, Observe};
use common::{ServiceError, ServiceErrorCode, TerimateSignal};
pub use observation::{Observation, ObservationType};
pub use runtime::Runtime;
pub use spawn_builder::SpawnContext;
use thiserror::Error;
use tracing::{info, warn};

pub use self::{
	actor_context::ActorContext,
	actor_state::ActorState,
	behavior::{Behavior, BehaviorBuilder, Clause},
	behavior_stack::{BehaviorStack, Mode},
	channel_with_priority::{QueueCapacity, RecvError, SendError, TrySendError},
	dyn_actor::DynActor,
	dyn_registry::{ActorId, DynRegistry},
	dyn_runtime::{DynEnv, DynHandle, DynRuntime},
	exit_reason::ExitReason,
	link::{close_mailbox_bouncer, LinkSet, MonitorSet},
	mailbox::Mailbox,
	message::{Message, MessageElement, MessageId},
	messagebus::{Inbox, MessageBus, WeakMessagebus},
	quiescence::QuiescenceCounter,
	receive_policy::{
		DeferredCache, DispatchResult, Envelope, ExitSignal, Priority, PreDispatchOutcome,
		PreDispatchState, SyncTimeoutMarker,
	},
	registry::ActorObservation,
	scheduler_pool::{Job, PriorityQueue, WorkerPool},
	supervisor::{Supervisor, SupervisorMetrics, SupervisorState},
	sync::{PendingSyncHandle, PendingSyncTable},
	timer::{TimerHandle, TimerService},
	variant::{ActorVariant, SpawnOptions},
};
pub use self::receive_policy::pre_dispatch;

/// Heartbeat used to verify that actors are progressing.
///
/// If an actor does not advertise a progress within an interval of duration `HEARTBEAT`,
/// its supervisor will consider it as blocked and will proceed to kill it, as well
/// as all of the actors all the actors that share the terimatesignal.
pub static HEARTBEAT: Lazy<Duration> = Lazy::new(heartbeat_from_env_or_default);

/// Returns the actor's heartbeat duration:
/// - Derived from `ACTORS_HEARTBEAT_SECS` if set and valid.
/// - Defaults to 30 seconds or 500ms for tests.
fn heartbeat_from_env_or_default() -> Duration {
	if cfg!(any(test, feature = "testsuite")) {
		// Right now some unit test end when we detect that a
		// pipeline has terminated, which can require waiting
		// for a heartbeat.
		//
		// We use a shorter heartbeat to reduce the time running unit tests.
		return Duration::from_millis(30000);
	}
	match std::env::var("ACTORS_HEARTBEAT_SECS") {
		Ok(actor_hearbeat_secs_str) => {
			if let Ok(actor_hearbeat_secs) = actor_hearbeat_secs_str.parse::<NonZeroU64>() {
				info!("set the actor heartbeat to {actor_hearbeat_secs} seconds");
				return Duration::from_secs(actor_hearbeat_secs.get());
			} else {
				warn!(
					"failed to parse `ACTORS_HEARTBEAT_SECS={actor_hearbeat_secs_str}` in \
                     seconds > 0, using default heartbeat (30 seconds)"
				);
			};
		},
		Err(std::env::VarError::NotUnicode(os_str)) => {
			warn!(
				"failed to parse `ACTORS_HEARTBEAT_SECS={os_str:?}` in a valid unicode string, \
                 using default heartbeat (30 seconds)"
			);
		},
		Err(std::env::VarError::NotPresent) => {},
	}
	Duration::from_secs(30)
}

/// Time we accept to wait for a new observation.
///
/// Once this time is elapsed, we just return the last observation.
const OBSERVE_TIMEOUT: Duration = Duration::from_secs(3);

/// Error that occurred while calling `ActorContext::ask(..)` or `Runtime::ask`
#[derive(Error, Debug)]
pub enum AskError<E: fmt::Debug> {
	#[error("message could not be delivered")]
	MessageNotDelivered,
	#[error("error while the message was being processed")]
	ProcessMessageError,
	#[error("the handler returned an error: `{0:?}`")]
	ErrorReply(#[from] E),
}

impl<E: fmt::Debug + ServiceError> ServiceError for AskError<E> {
	fn error_code(&self) -> ServiceErrorCode {
		match self {
			AskError::MessageNotDelivered => ServiceErrorCode::Internal,
			AskError::ProcessMessageError => ServiceErrorCode::Internal,
			AskError::ErrorReply(err) => err.error_code(),
		}
	}
}
