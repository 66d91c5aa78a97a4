// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! The dynamic core's composition root (§6): `DynRuntime::spawn(options, init)` wires a
//! [`DynActor`] to a [`DynRegistry`] entry, a [`QuiescenceCounter`] registration, and either a
//! dedicated OS thread or the shared [`WorkerPool`], depending on the [`ActorVariant`]
//! [`SpawnOptions`] selects — the same role [`crate::spawn_builder::SpawnBuilder`] plays for the
//! ambient, typed `Actor` layer, expressed for actors that are spawned and addressed
//! dynamically instead of by Rust type.

use std::{
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	thread,
	time::Duration,
};

use crate::{
	dyn_registry::{ActorId, DynRegistry},
	receive_policy::Envelope,
	scheduler_pool::Job,
	ActorVariant, Behavior, DynActor, ExitReason, LinkSet, MonitorSet, QuiescenceCounter,
	SpawnOptions, TimerService, WorkerPool,
};

/// The shared handles every [`DynActor`] is spawned with: where to resolve senders, where to
/// schedule timers, and (for event-based actors only) which pool resumes it.
#[derive(Clone)]
pub struct DynEnv {
	registry: Arc<DynRegistry>,
	timers: Arc<TimerService>,
	pool: Option<Arc<WorkerPool>>,
}

impl DynEnv {
	pub(crate) fn new(
		registry: Arc<DynRegistry>,
		timers: Arc<TimerService>,
		pool: Option<Arc<WorkerPool>>,
	) -> DynEnv {
		DynEnv { registry, timers, pool }
	}

	pub(crate) fn registry(&self) -> Arc<DynRegistry> {
		self.registry.clone()
	}

	pub(crate) fn timers(&self) -> &TimerService {
		&self.timers
	}

	pub(crate) fn pool(&self) -> Option<&Arc<WorkerPool>> {
		self.pool.as_ref()
	}

	/// A standalone environment for tests that only need one isolated [`DynActor`] and don't
	/// exercise cross-actor routing or scheduling.
	#[cfg(test)]
	pub(crate) fn for_test() -> DynEnv {
		DynEnv::new(Arc::new(DynRegistry::new()), Arc::new(TimerService::new()), None)
	}
}

/// The job a worker-pool-backed actor resubmits itself as on wake-up. `resume` already drains the
/// mailbox internally, so there is no follow-up job to chain.
pub(crate) struct ResumeJob(pub Arc<DynActor>);

impl Job for ResumeJob {
	fn run(self: Box<Self>) -> Option<Box<dyn Job>> {
		self.0.resume();
		None
	}
}

/// A handle onto a spawned dynamic-core actor: the composition `DynRuntime::spawn` hands back in
/// place of the raw `Arc<DynActor>`.
pub struct DynHandle {
	actor: Arc<DynActor>,
	thread: Option<thread::JoinHandle<()>>,
}

impl DynHandle {
	pub fn id(&self) -> ActorId {
		self.actor.id
	}

	pub fn actor(&self) -> &Arc<DynActor> {
		&self.actor
	}

	pub fn send(&self, envelope: Envelope) -> Result<bool, Envelope> {
		self.actor.send(envelope)
	}

	pub fn links(&self) -> &LinkSet {
		self.actor.links()
	}

	pub fn monitors(&self) -> &MonitorSet {
		self.actor.monitors()
	}

	pub fn set_trap_exit(&self, trap: bool) {
		self.actor.set_trap_exit(trap)
	}

	pub fn exit_reason(&self) -> ExitReason {
		self.actor.exit_reason()
	}

	pub fn is_exited(&self) -> bool {
		self.actor.is_exited()
	}

	/// Links this actor bidirectionally to `peer` (§4.5/§7): a non-normal exit on either side
	/// cascades an `(exit_signal, reason)` send to the other.
	pub fn link(&self, peer: &DynHandle) {
		let this_weak = Arc::downgrade(&self.actor);
		peer.actor.links().link(move |reason| {
			if reason.is_normal() {
				return;
			}
			if let Some(actor) = this_weak.upgrade() {
				let _ = actor.send(Envelope::new(
					None,
					crate::MessageId::UNCORRELATED,
					crate::make_message!(crate::ExitSignal, reason),
				));
			}
		});
		let peer_weak = Arc::downgrade(&peer.actor);
		self.actor.links().link(move |reason| {
			if reason.is_normal() {
				return;
			}
			if let Some(actor) = peer_weak.upgrade() {
				let _ = actor.send(Envelope::new(
					None,
					crate::MessageId::UNCORRELATED,
					crate::make_message!(crate::ExitSignal, reason),
				));
			}
		});
	}

	/// Blocks the calling thread until the actor exits. Thread-backed actors join their owning
	/// OS thread directly; event-based ones have none, so this polls `is_exited` instead.
	pub fn await_exit(mut self) -> ExitReason {
		if let Some(thread) = self.thread.take() {
			let _ = thread.join();
		} else {
			while !self.actor.is_exited() {
				thread::sleep(Duration::from_millis(1));
			}
		}
		self.actor.exit_reason()
	}
}

/// Owns the shared worker pool, timer service, registry and quiescence counter every dynamic-core
/// actor spawned through it is composed with.
pub struct DynRuntime {
	pool: Arc<WorkerPool>,
	timers: Arc<TimerService>,
	quiescence: Arc<QuiescenceCounter>,
	registry: Arc<DynRegistry>,
	next_id: AtomicU64,
}

impl Default for DynRuntime {
	fn default() -> Self {
		DynRuntime::new()
	}
}

impl DynRuntime {
	pub fn new() -> DynRuntime {
		DynRuntime {
			pool: Arc::new(WorkerPool::new(WorkerPool::default_size())),
			timers: Arc::new(TimerService::new()),
			quiescence: Arc::new(QuiescenceCounter::new()),
			registry: Arc::new(DynRegistry::new()),
			next_id: AtomicU64::new(1),
		}
	}

	pub fn quiescence(&self) -> &QuiescenceCounter {
		&self.quiescence
	}

	pub fn registry(&self) -> &DynRegistry {
		&self.registry
	}

	/// Creates an actor of the variant `options` selects, running `init` to build its first
	/// behavior, and returns a handle to it (§6). The actor is registered for reply/bounce
	/// routing and, unless `options.hidden`, counted by the runtime's quiescence counter for the
	/// rest of its life; both registrations are torn down automatically on exit via a monitor.
	pub fn spawn<F>(&self, options: SpawnOptions, init: F) -> DynHandle
	where
		F: FnOnce() -> Behavior,
	{
		let id = ActorId(self.next_id.fetch_add(1, Ordering::Relaxed));
		let variant = options.variant();
		let pool = matches!(variant, ActorVariant::EventBased).then(|| self.pool.clone());
		let env = DynEnv::new(self.registry.clone(), self.timers.clone(), pool);
		let mut actor = DynActor::new(id, init(), env);
		if options.priority_aware {
			actor = actor.with_priority_aware();
		}
		let actor = Arc::new(actor);
		actor.attach_self(Arc::downgrade(&actor));
		self.registry.register(id, &actor);
		if !options.hidden {
			self.quiescence.spawned();
		}

		let registry = self.registry.clone();
		let quiescence = self.quiescence.clone();
		let hidden = options.hidden;
		actor.monitors().attach(move |_reason| {
			registry.unregister(id);
			if !hidden {
				quiescence.despawned();
			}
		});

		let thread = match variant {
			ActorVariant::ThreadBacked | ActorVariant::StackfulCooperative => {
				let thread_actor = actor.clone();
				Some(thread::spawn(move || {
					thread_actor.run_blocking();
				}))
			},
			ActorVariant::EventBased => None,
		};

		DynHandle { actor, thread }
	}

	/// Stops accepting new submissions and joins every worker thread. Fails silently (leaking
	/// the pool) if other handles into it are still outstanding, which should only happen if a
	/// spawned actor is still alive.
	pub fn shutdown(self) {
		if let Ok(pool) = Arc::try_unwrap(self.pool) {
			pool.shutdown();
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{mpsc, Arc, Mutex as StdMutex};

	use super::*;
	use crate::{make_message, message_shape, Behavior, Clause, ExitSignal, Message};

	fn echo_behavior() -> Behavior {
		Behavior::builder().on(Clause::new(message_shape![u32], |msg| Some(msg.clone()))).build()
	}

	/// Builds a standalone actor sharing `env`'s registry/timers but never pool-scheduled, so a
	/// test drives it by calling `resume()` itself instead of racing a background worker.
	fn manual_actor(env: &DynEnv, id: u64, behavior: Behavior) -> Arc<DynActor> {
		let actor = Arc::new(DynActor::new(ActorId(id), behavior, env.clone()));
		actor.attach_self(Arc::downgrade(&actor));
		env.registry().register(ActorId(id), &actor);
		actor
	}

	#[test]
	fn test_spawn_registers_and_quiescence_tracks_it() {
		let runtime = DynRuntime::new();
		assert_eq!(runtime.quiescence().count(), 0);
		let handle = runtime.spawn(SpawnOptions::default(), echo_behavior);
		assert_eq!(runtime.quiescence().count(), 1);
		assert!(runtime.registry().resolve(handle.id()).is_some());
		handle.actor().quit(ExitReason::NORMAL);
		assert_eq!(runtime.quiescence().count(), 0);
		assert!(runtime.registry().resolve(handle.id()).is_none());
	}

	#[test]
	fn test_hidden_spawn_is_not_counted() {
		let runtime = DynRuntime::new();
		let options = SpawnOptions { hidden: true, ..Default::default() };
		let _handle = runtime.spawn(options, echo_behavior);
		assert_eq!(runtime.quiescence().count(), 0);
	}

	/// Ping/Pong (§8): two event-based actors exchange a synchronous request and the reply
	/// actually arrives back at the caller's pending-sync table.
	#[test]
	fn test_ping_pong_request_reply_round_trip() {
		let runtime = DynRuntime::new();
		let pong = runtime.spawn(SpawnOptions::default(), || {
			Behavior::builder()
				.on(Clause::new(message_shape![u32], |msg| {
					let n = *msg.get_as::<u32>(0).unwrap();
					Some(make_message!(n + 1))
				}))
				.build()
		});
		let (tx, rx) = mpsc::channel();
		let ping = runtime.spawn(SpawnOptions::default(), || Behavior::builder().build());
		ping.actor().request(pong.actor(), make_message!(41u32), move |reply| {
			let _ = tx.send(reply.get_as::<u32>(0).copied());
			None
		});
		let reply = rx.recv_timeout(Duration::from_secs(1)).expect("pong should have replied");
		assert_eq!(reply, Some(42));
	}

	/// Request timeout (§8): the callee never answers, so the requester's timeout handler fires
	/// instead, with the entry removed from the pending-sync table.
	#[test]
	fn test_request_times_out_when_callee_never_replies() {
		let runtime = DynRuntime::new();
		let silent = runtime.spawn(SpawnOptions::default(), || Behavior::builder().build());
		let caller = runtime.spawn(SpawnOptions::default(), || Behavior::builder().build());
		let (tx, rx) = mpsc::channel();
		let request_id = caller.actor().request_with_timeout(
			silent.actor(),
			make_message!(1u32),
			Duration::from_millis(20),
			|_reply| None,
			move || {
				let _ = tx.send(());
			},
		);
		rx.recv_timeout(Duration::from_secs(1)).expect("the timeout handler should have fired");
		assert!(!caller.actor().pending_sync().is_pending(request_id));
	}

	/// Trap exit cascade (§8): a linked, trapping actor receives the peer's exit reason as an
	/// ordinary message instead of dying itself.
	///
	/// Both actors are constructed directly rather than through `DynRuntime::spawn`, so nothing
	/// pool-schedules them and the test's own `resume()` calls are the only thing driving
	/// dispatch — exercising the same link/monitor/mailbox wiring deterministically.
	#[test]
	fn test_linked_trapping_actor_receives_exit_signal_instead_of_dying() {
		let env = DynEnv::new(Arc::new(DynRegistry::new()), Arc::new(TimerService::new()), None);
		let seen = Arc::new(StdMutex::new(None));
		let seen_clone = seen.clone();
		let survivor = manual_actor(
			&env,
			1,
			Behavior::builder()
				.on(Clause::new(message_shape![ExitSignal, ExitReason], move |msg| {
					*seen_clone.lock().unwrap() = msg.get_as::<ExitReason>(1).copied();
					None
				}))
				.build(),
		);
		survivor.set_trap_exit(true);
		let doomed = manual_actor(&env, 2, Behavior::builder().build());
		let survivor_weak = Arc::downgrade(&survivor);
		doomed.links().link(move |reason| {
			if reason.is_normal() {
				return;
			}
			if let Some(actor) = survivor_weak.upgrade() {
				let _ = actor.send(Envelope::new(
					None,
					crate::MessageId::UNCORRELATED,
					crate::make_message!(ExitSignal, reason),
				));
			}
		});
		doomed.quit(ExitReason::KILLED);
		assert_eq!(survivor.resume(), None);
		assert_eq!(*seen.lock().unwrap(), Some(ExitReason::KILLED));
		assert!(!survivor.is_exited());
	}

	/// Chained `.then()` (§8): both continuation stages run in order against one response.
	#[test]
	fn test_chained_then_runs_every_stage_on_one_reply() {
		let env = DynEnv::new(Arc::new(DynRegistry::new()), Arc::new(TimerService::new()), None);
		let responder = manual_actor(
			&env,
			1,
			Behavior::builder().on(Clause::new(message_shape![u32], |msg| Some(msg.clone()))).build(),
		);
		let caller = manual_actor(&env, 2, Behavior::builder().build());
		let log = Arc::new(StdMutex::new(Vec::new()));
		let log1 = log.clone();
		let log2 = log.clone();
		caller
			.request(&responder, make_message!(1u32), move |msg| {
				log1.lock().unwrap().push("stage1".to_string());
				msg.get_as::<u32>(0).map(|n| make_message!(n + 1))
			})
			.then(move |msg: Message| {
				log2.lock().unwrap().push("stage2".to_string());
				msg.get_as::<u32>(0).map(|n| make_message!(n + 1))
			});
		assert_eq!(responder.resume(), None);
		assert_eq!(*log.lock().unwrap(), vec!["stage1", "stage2"]);
	}

	/// Mailbox close bounces requests (§8): a request sent to an actor that quits before
	/// dequeuing it gets a synthetic error reply carrying the exit reason, not silence.
	#[test]
	fn test_mailbox_close_bounces_outstanding_request_to_caller() {
		let env = DynEnv::new(Arc::new(DynRegistry::new()), Arc::new(TimerService::new()), None);
		let callee = manual_actor(&env, 1, Behavior::builder().build());
		let caller = manual_actor(&env, 2, Behavior::builder().build());
		let (tx, rx) = mpsc::channel();
		caller.request(&callee, make_message!(1u32), move |reply| {
			let _ = tx.send(reply.get_as::<ExitReason>(0).copied());
			None
		});
		// The request is still sitting in callee's mailbox, undispatched.
		callee.quit(ExitReason::user_defined(0x10007));
		assert_eq!(caller.resume(), None);
		let reason = rx.try_recv().expect("the bounce should have arrived");
		assert_eq!(reason, Some(ExitReason::user_defined(0x10007)));
	}
}
