use std::{collections::HashMap, thread, time::Duration};

use crate::{
	messagebus::create_messagebus,
	registry::ActorObservation,
	scheduler::start_scheduler,
	spawn_builder::{SpawnBuilder, SpawnContext},
	Actor, ActorExitStatus, Command, Inbox, MessageBus, QueueCapacity,
};

/// Runtime serves as the top-level context in which Actor can be spawned.
/// It is *not* a singleton. A typical application will usually have only one runtime hosting all
/// of the actors but it is not a requirement.
///
/// In particular, unit test all have their own runtime and hence can be executed in parallel.
pub struct Runtime {
	pub(crate) spawn_ctx: SpawnContext,
}

impl Default for Runtime {
	fn default() -> Runtime {
		Runtime::new()
	}
}

impl Runtime {
	/// Creates a new runtime.
	pub fn new() -> Runtime {
		let scheduler_client = start_scheduler();
		Runtime { spawn_ctx: SpawnContext::new(scheduler_client) }
	}

	/// Creates a runtime were time is accelerated.
	///
	/// Time is accelerated in a way to exhibit a behavior as close as possible
	/// to what would have happened with normal time but faster.
	///
	/// The time "jumps" only happen when no actor is processing any message,
	/// running initialization or finalize.
	#[cfg(any(test, feature = "testsuite"))]
	pub fn with_accelerated_time() -> Runtime {
		let runtime = Runtime::new();
		runtime.spawn_ctx().scheduler_client.accelerate_time();
		runtime
	}

	pub fn spawn_ctx(&self) -> &SpawnContext {
		&self.spawn_ctx
	}

	pub fn create_test_messagebus<A: Actor>(&self) -> (MessageBus<A>, Inbox<A>) {
		create_messagebus("test-messagebus".to_string(), QueueCapacity::Unbounded, None)
	}

	pub fn create_messagebus<A: Actor>(
		&self,
		actor_name: impl ToString,
		queue_capacity: QueueCapacity,
	) -> (MessageBus<A>, Inbox<A>) {
		self.spawn_ctx.create_messagebus(actor_name, queue_capacity)
	}

	pub fn get<A: Actor>(&self) -> Vec<MessageBus<A>> {
		self.spawn_ctx.registry.get::<A>()
	}

	pub fn get_one<A: Actor>(&self) -> Option<MessageBus<A>> {
		self.spawn_ctx.registry.get_one::<A>()
	}

	pub async fn observe(&self, timeout: Duration) -> Vec<ActorObservation> {
		self.spawn_ctx.registry.observe(timeout).await
	}

	pub fn kill(&self) {
		self.spawn_ctx.terminate_sig.kill();
	}

	/// This function acts as a drop-in replacement of
	/// `tokio::time::sleep`.
	///
	/// It can however be accelerated when using a time-accelerated
	/// runtime.
	pub async fn sleep(&self, duration: Duration) {
		self.spawn_ctx.scheduler_client.sleep(duration).await;
	}

	pub fn spawn_builder<A: Actor>(&self) -> SpawnBuilder<A> {
		self.spawn_ctx.spawn_builder()
	}

	/// Inform an actor to process pending message and then stop processing new messages
	/// and exit successfully.
	pub async fn send_exit_with_success<A: Actor>(
		&self,
		messagebus: &MessageBus<A>,
	) -> Result<(), crate::SendError> {
		messagebus.send_message(Command::ExitWithSuccess).await?;
		Ok(())
	}

	/// Gracefully quits all registered actors.
	pub async fn quit(&self) -> HashMap<String, ActorExitStatus> {
		self.spawn_ctx.registry.quit().await
	}

	/// Gracefully quits all registered actors and asserts that none of them panicked.
	///
	/// This is useful for testing purposes to detect failed asserts in actors.
	#[cfg(any(test, feature = "testsuite"))]
	pub async fn assert_quit(self) {
		assert!(!self
			.quit()
			.await
			.values()
			.any(|status| matches!(status, ActorExitStatus::Panicked)));
	}
}

impl Drop for Runtime {
	fn drop(&mut self) {
		if cfg!(any(test, feature = "testsuite")) &&
			!self.spawn_ctx.registry.is_empty() &&
			!thread::panicking()
		{
			panic!(
				"There are still running actors at the end of the test. Did you call \
                 runtime.assert_quit()?"
			);
		}
		self.spawn_ctx.terminate_sig.kill();
	}
}
