// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! Behaviors: an ordered list of handler clauses plus an optional timeout, matched by
//! structural message shape.

use std::{any::TypeId, time::Duration};

use crate::Message;

/// Builds the expected type signature of a clause from a list of slot types.
///
/// ```ignore
/// Clause::new(message_shape![u32, String], |msg| { .. });
/// ```
#[macro_export]
macro_rules! message_shape {
	($($t:ty),* $(,)?) => {
		vec![$(std::any::TypeId::of::<$t>()),*]
	};
}

/// A single handler clause: a structural pattern, an optional guard, and the handler itself.
pub struct Clause {
	signature: Vec<TypeId>,
	guard: Option<Box<dyn Fn(&Message) -> bool + Send + Sync>>,
	handler: Box<dyn FnMut(&Message) -> Option<Message> + Send>,
}

impl Clause {
	pub fn new<F>(signature: Vec<TypeId>, handler: F) -> Clause
	where
		F: FnMut(&Message) -> Option<Message> + Send + 'static,
	{
		Clause { signature, guard: None, handler: Box::new(handler) }
	}

	/// Adds a value guard evaluated after the structural signature matches.
	#[must_use]
	pub fn with_guard<G>(mut self, guard: G) -> Clause
	where
		G: Fn(&Message) -> bool + Send + Sync + 'static,
	{
		self.guard = Some(Box::new(guard));
		self
	}

	fn matches(&self, message: &Message) -> bool {
		message.type_signature() == self.signature &&
			self.guard.as_ref().map(|guard| guard(message)).unwrap_or(true)
	}
}

pub(crate) enum DispatchOutcome {
	Handled(Option<Message>),
	Unmatched,
}

/// An ordered list of clauses, tried first-match-wins, plus an optional timeout.
pub struct Behavior {
	clauses: Vec<Clause>,
	timeout: Option<(Duration, Box<dyn FnMut() -> Option<Message> + Send>)>,
}

impl Behavior {
	pub fn builder() -> BehaviorBuilder {
		BehaviorBuilder::default()
	}

	pub(crate) fn dispatch(&mut self, message: &Message) -> DispatchOutcome {
		for clause in &mut self.clauses {
			if clause.matches(message) {
				return DispatchOutcome::Handled((clause.handler)(message));
			}
		}
		DispatchOutcome::Unmatched
	}

	/// `duration == 0` means "fire immediately once the mailbox has been drained".
	pub fn timeout_duration(&self) -> Option<Duration> {
		self.timeout.as_ref().map(|(duration, _)| *duration)
	}

	pub(crate) fn fire_timeout(&mut self) -> Option<Message> {
		self.timeout.as_mut().and_then(|(_, handler)| handler())
	}
}

#[derive(Default)]
pub struct BehaviorBuilder {
	clauses: Vec<Clause>,
	timeout: Option<(Duration, Box<dyn FnMut() -> Option<Message> + Send>)>,
}

impl BehaviorBuilder {
	#[must_use]
	pub fn on(mut self, clause: Clause) -> Self {
		self.clauses.push(clause);
		self
	}

	#[must_use]
	pub fn on_timeout<F>(mut self, after: Duration, handler: F) -> Self
	where
		F: FnMut() -> Option<Message> + Send + 'static,
	{
		self.timeout = Some((after, Box::new(handler)));
		self
	}

	pub fn build(self) -> Behavior {
		Behavior { clauses: self.clauses, timeout: self.timeout }
	}
}
