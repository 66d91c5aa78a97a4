// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! Composes the dynamic core's primitives ([`Mailbox`], [`BehaviorStack`], [`DeferredCache`],
//! [`PendingSyncTable`], [`LinkSet`], [`MonitorSet`]) into one resumable unit implementing the
//! §4.7 resume contract.
//!
//! `resume` is deliberately synchronous and caller-driven: a thread-backed actor calls it in a
//! loop from its own OS thread (blocking via [`Mailbox::block`] between resumes), while a pool
//! worker ([`crate::scheduler_pool`]) calls it once per [`crate::scheduler_pool::Job`] and
//! re-submits the actor if it returns `None` with more work already queued — see
//! [`crate::dyn_runtime`] for the composition that wires a [`DynActor`] to its registry, worker
//! pool and timer service.
//!
//! A handler's reply is routed back to `envelope.sender` by resolving it through the
//! [`crate::DynRegistry`] every `DynActor` is spawned with, then pushing the reply onto the
//! resolved actor's own mailbox (§4.4 "the heart of the core").

use std::sync::{
	atomic::{AtomicBool, AtomicU64, Ordering},
	Mutex, Weak,
};

use once_cell::sync::OnceCell;

use crate::{
	dyn_registry::ActorId,
	dyn_runtime::DynEnv,
	link::close_mailbox_bouncer,
	receive_policy::{
		pre_dispatch, DeferredCache, DispatchResult, Envelope, Priority, PreDispatchOutcome,
		PreDispatchState,
	},
	Behavior, BehaviorStack, ExitReason, LinkSet, Mailbox, Message, Mode, MonitorSet, PendingSyncHandle,
	PendingSyncTable, PriorityQueue,
};

/// A dynamically dispatched actor: identity plus the full set of §3 "Actor state" components.
pub struct DynActor {
	pub id: ActorId,
	mailbox: Mailbox<Envelope>,
	behaviors: Mutex<BehaviorStack>,
	cache: Mutex<DeferredCache>,
	pending_sync: PendingSyncTable,
	links: LinkSet,
	monitors: MonitorSet,
	trap_exit: AtomicBool,
	pending_timeout_id: Mutex<Option<u64>>,
	exit_reason: Mutex<ExitReason>,
	priority_aware: bool,
	epoch: Mutex<PriorityQueue<Envelope>>,
	env: DynEnv,
	self_weak: OnceCell<Weak<DynActor>>,
	next_request_timeout_id: AtomicU64,
}

impl DynActor {
	pub fn new(id: ActorId, initial_behavior: Behavior, env: DynEnv) -> DynActor {
		DynActor {
			id,
			mailbox: Mailbox::new(),
			behaviors: Mutex::new(BehaviorStack::with_initial(initial_behavior)),
			cache: Mutex::new(DeferredCache::new()),
			pending_sync: PendingSyncTable::new(),
			links: LinkSet::new(),
			monitors: MonitorSet::new(),
			trap_exit: AtomicBool::new(false),
			pending_timeout_id: Mutex::new(None),
			exit_reason: Mutex::new(ExitReason::NOT_EXITED),
			priority_aware: false,
			epoch: Mutex::new(PriorityQueue::new()),
			env,
			self_weak: OnceCell::new(),
			next_request_timeout_id: AtomicU64::new(0),
		}
	}

	/// Records this actor's own `Weak` handle so it can resubmit itself to a worker pool on
	/// wake-up and arm timers against itself. Called exactly once, right after the actor is
	/// wrapped in its owning `Arc` (see `crate::dyn_runtime::DynRuntime::spawn`).
	pub(crate) fn attach_self(&self, weak: Weak<DynActor>) {
		let _ = self.self_weak.set(weak);
	}

	/// Enables the `priority_aware` spawn option (§4.6, §6): each scheduling epoch, the whole
	/// mailbox is drained into a [`PriorityQueue`] and handled high-priority-first, rather than
	/// strictly in arrival order. Intended to be called once, right after [`DynActor::new`].
	#[must_use]
	pub fn with_priority_aware(mut self) -> DynActor {
		self.priority_aware = true;
		self
	}

	pub fn set_trap_exit(&self, trap: bool) {
		self.trap_exit.store(trap, Ordering::SeqCst);
	}

	pub fn pending_sync(&self) -> &PendingSyncTable {
		&self.pending_sync
	}

	pub fn links(&self) -> &LinkSet {
		&self.links
	}

	pub fn monitors(&self) -> &MonitorSet {
		&self.monitors
	}

	/// Arms a fresh receive-timeout id, superseding any previously armed one (which will then
	/// self-filter per §4.4 when it eventually fires).
	pub fn arm_timeout(&self, id: u64) {
		*self.pending_timeout_id.lock().unwrap() = Some(id);
	}

	pub fn disarm_timeout(&self) {
		*self.pending_timeout_id.lock().unwrap() = None;
	}

	/// Enqueues an envelope. Returns `Err(envelope)` if the actor has already exited. A push that
	/// wakes a blocked/empty mailbox resubmits this actor to its worker pool, if it has one
	/// (event-based actors; thread-backed ones are woken directly by the mailbox's condvar).
	pub fn send(&self, envelope: Envelope) -> Result<bool, Envelope> {
		let woke = self.mailbox.push(envelope)?;
		if woke {
			self.reschedule();
		}
		Ok(woke)
	}

	fn reschedule(&self) {
		let Some(pool) = self.env.pool() else { return };
		let Some(weak) = self.self_weak.get() else { return };
		let Some(strong) = weak.upgrade() else { return };
		pool.submit(Box::new(crate::dyn_runtime::ResumeJob(strong)));
	}

	/// Sends `message` to `receiver` as a synchronous request from this actor, installing
	/// `on_reply` as the first continuation stage (§4.4/§4.5). Further stages can be chained via
	/// the returned handle's `.then(..)`.
	pub fn request<F>(&self, receiver: &DynActor, message: Message, on_reply: F) -> PendingSyncHandle<'_>
	where
		F: FnOnce(Message) -> Option<Message> + Send + 'static,
	{
		let handle = self.pending_sync.begin(on_reply);
		let envelope = Envelope::new(Some(self.id), handle.request_id, message);
		let _ = receiver.send(envelope);
		handle
	}

	/// Like [`DynActor::request`], but also arms a timer that expires the request after
	/// `timeout` by calling `pending_sync.timeout(..)` directly — no mailbox round trip is
	/// needed since the pending-sync table is its own synchronization point (§4.5).
	pub fn request_with_timeout<F, T>(
		&self,
		receiver: &DynActor,
		message: Message,
		timeout: std::time::Duration,
		on_reply: F,
		on_timeout: T,
	) -> crate::MessageId
	where
		F: FnOnce(Message) -> Option<Message> + Send + 'static,
		T: FnOnce() + Send + 'static,
	{
		let handle = self.pending_sync.begin(on_reply).with_timeout(on_timeout);
		let request_id = handle.request_id;
		let envelope = Envelope::new(Some(self.id), request_id, message);
		let _ = receiver.send(envelope);
		if let Some(weak) = self.self_weak.get().cloned() {
			self.env.timers().schedule_after(timeout, move || {
				if let Some(actor) = weak.upgrade() {
					actor.pending_sync.timeout(request_id);
				}
			});
		}
		request_id
	}

	/// Arms a fresh receive-timeout (§4.3/§4.8): schedules a delayed `(sync_timeout, id)`
	/// self-send whose `id` matches the one just armed via [`DynActor::arm_timeout`]. A
	/// superseding `arm_receive_timeout`/`disarm_timeout` call makes the scheduled fire stale,
	/// so it self-filters in `pre_dispatch` instead of firing twice.
	pub fn arm_receive_timeout(&self, duration: std::time::Duration) {
		let id = self.next_request_timeout_id.fetch_add(1, Ordering::Relaxed);
		self.arm_timeout(id);
		let Some(weak) = self.self_weak.get().cloned() else { return };
		self.env.timers().schedule_after(duration, move || {
			if let Some(actor) = weak.upgrade() {
				let _ = actor.send(Envelope::new(
					None,
					crate::MessageId::UNCORRELATED,
					crate::make_message!(crate::SyncTimeoutMarker, id),
				));
			}
		});
	}

	fn route_reply(&self, sender: Option<ActorId>, response_id: crate::MessageId, message: Message) {
		let Some(sender_id) = sender else {
			tracing::debug!("reply produced for a request with no sender handle to route to");
			return;
		};
		let Some(sender) = self.env.registry().resolve(sender_id) else {
			tracing::debug!("reply's original sender has already exited; dropping the reply");
			return;
		};
		let reply = Envelope::new(None, response_id, message);
		if sender.send(reply).is_err() {
			tracing::debug!("reply's original sender had already closed its own mailbox");
		}
	}

	/// Installs a new behavior and re-offers every cached, previously unmatched envelope to it.
	pub fn install(&self, behavior: Behavior, mode: Mode) -> Vec<(Envelope, Option<Message>)> {
		let mut stack = self.behaviors.lock().unwrap();
		stack.install(behavior, mode);
		let mut cache = self.cache.lock().unwrap();
		cache.sweep(&mut stack)
	}

	/// The next envelope to dispatch this resume. A plain actor pops the mailbox FIFO; a
	/// `priority_aware` one refills a per-epoch [`PriorityQueue`] from everything currently
	/// sitting in the mailbox and drains it high-priority-first, so one arrival-order mailbox
	/// ends up processed `H..., L...` within a single scheduling epoch (§8 "priority drain").
	fn next_envelope(&self) -> Option<Envelope> {
		if !self.priority_aware {
			return self.mailbox.try_pop();
		}
		let mut epoch = self.epoch.lock().unwrap();
		if epoch.is_empty() {
			while let Some(envelope) = self.mailbox.try_pop() {
				match envelope.priority {
					Priority::High => epoch.push_high(envelope),
					Priority::Low => epoch.push_low(envelope),
				}
			}
		}
		epoch.pop()
	}

	pub fn exit_reason(&self) -> ExitReason {
		*self.exit_reason.lock().unwrap()
	}

	pub fn is_exited(&self) -> bool {
		self.exit_reason().is_exited()
	}

	/// Explicit `quit(reason)` (§3 lifecycle path b).
	pub fn quit(&self, reason: ExitReason) -> ExitReason {
		self.finalize(reason)
	}

	/// Pops the current behavior. If that empties the stack, finalizes with `ExitReason::NORMAL`
	/// — §3 lifecycle path (a), "user code returns with an empty behavior stack". Returns the
	/// popped behavior's slot count as `Some(depth_after)`, or `None` if the stack was already
	/// empty.
	pub fn unbecome(&self) -> Option<usize> {
		let mut stack = self.behaviors.lock().unwrap();
		stack.pop()?;
		let depth_after = stack.depth();
		let now_empty = stack.is_empty();
		drop(stack);
		if now_empty {
			self.finalize(ExitReason::NORMAL);
		}
		Some(depth_after)
	}

	/// Drains the mailbox until it empties (the actor blocks) or the actor exits — either
	/// because its behavior stack is empty (lifecycle path a) or a non-trapped exit signal
	/// cascaded a quit. Returns the exit reason on the resume that caused it, `None` otherwise.
	///
	/// Caller-driven: an event-based actor is resumed once per [`crate::scheduler_pool::Job`];
	/// see [`DynActor::run_blocking`] for the thread-backed equivalent that parks instead of
	/// returning between envelopes.
	pub fn resume(&self) -> Option<ExitReason> {
		loop {
			if self.is_exited() {
				return Some(self.exit_reason());
			}
			let Some(envelope) = self.next_envelope() else {
				self.mailbox.about_to_block();
				return None;
			};
			if let Some(reason) = self.process_envelope(envelope) {
				return Some(reason);
			}
		}
	}

	/// Drives this actor's own mailbox forever from a dedicated OS thread, parking via
	/// [`Mailbox::block`] between envelopes instead of returning control to a caller — the
	/// `ThreadBacked`/`StackfulCooperative` variants' resume loop (§4.6, §6).
	pub fn run_blocking(&self) {
		loop {
			if self.is_exited() {
				return;
			}
			let envelope = match self.next_envelope() {
				Some(envelope) => envelope,
				None => {
					self.mailbox.about_to_block();
					match self.mailbox.block() {
						Some(envelope) => envelope,
						None => return,
					}
				},
			};
			if self.process_envelope(envelope).is_some() {
				return;
			}
		}
	}

	/// Runs the pre-dispatch filter and, if the envelope proceeds to the behavior stack, the
	/// dispatch and reply-routing steps, over exactly one envelope. Returns the exit reason if
	/// this envelope caused the actor to exit, `None` if it should keep resuming.
	fn process_envelope(&self, envelope: Envelope) -> Option<ExitReason> {
		let state = PreDispatchState {
			trap_exit: self.trap_exit.load(Ordering::SeqCst),
			pending_timeout_id: *self.pending_timeout_id.lock().unwrap(),
			pending_sync: &self.pending_sync,
		};
		match pre_dispatch(envelope, &state) {
			PreDispatchOutcome::Consumed => None,
			PreDispatchOutcome::Quit(reason) => Some(self.finalize(reason)),
			PreDispatchOutcome::TimeoutFired => {
				if let Some(behavior) = self.behaviors.lock().unwrap().top_mut() {
					behavior.fire_timeout();
				}
				None
			},
			PreDispatchOutcome::Proceed(envelope) => {
				let mut stack = self.behaviors.lock().unwrap();
				if stack.is_empty() {
					drop(stack);
					return Some(self.finalize(ExitReason::NORMAL));
				}
				let is_request = envelope.message_id.is_request();
				let sender = envelope.sender;
				let response_id = envelope.message_id.response_id();
				let mut cache = self.cache.lock().unwrap();
				if let DispatchResult::Handled(reply) = cache.dispatch(&mut stack, envelope) {
					drop(cache);
					drop(stack);
					match (is_request, reply) {
						(true, Some(reply_message)) => self.route_reply(sender, response_id, reply_message),
						(true, None) => {
							tracing::warn!(
								"handler produced no reply for a request; emitting an empty void response"
							);
							self.route_reply(sender, response_id, Message::empty());
						},
						(false, Some(_)) => tracing::trace!("discarding reply to a non-request send"),
						(false, None) => {},
					}
				}
				None
			},
		}
	}

	fn finalize(&self, reason: ExitReason) -> ExitReason {
		*self.exit_reason.lock().unwrap() = reason;
		self.mailbox.close(close_mailbox_bouncer(reason, self.env.registry()));
		self.links.cascade_exit(reason);
		self.monitors.notify_all(reason);
		reason
	}
}
