// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! The pending-sync table backing synchronous sends in the dynamic actor core.
//!
//! A synchronous send allocates a request id, installs a one-shot continuation chain here, and
//! hands the caller a [`PendingSyncHandle`] to attach further `.then(..)` stages. When a
//! matching response (or a timeout) arrives, [`PendingSyncTable::resolve`] / `timeout` runs the
//! chain to completion and drops the entry — there is no further round trip through the
//! mailbox, which is what lets `request.then(h1).then(h2)` compose without recursive template
//! instantiation.

use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Mutex,
	},
};

use crate::{Message, MessageId};

type ContinuationFn = Box<dyn FnOnce(Message) -> Option<Message> + Send>;
type TimeoutFn = Box<dyn FnOnce() + Send>;

struct ChainEntry {
	chain: Vec<ContinuationFn>,
	timeout_handler: Option<TimeoutFn>,
}

/// Per-actor table of outstanding synchronous sends.
#[derive(Default)]
pub struct PendingSyncTable {
	entries: Mutex<HashMap<u64, ChainEntry>>,
	next_sequence: AtomicU64,
}

impl PendingSyncTable {
	pub fn new() -> PendingSyncTable {
		PendingSyncTable::default()
	}

	/// Allocates a fresh request id and installs the first continuation of its chain.
	pub fn begin<F>(&self, handler: F) -> PendingSyncHandle<'_>
	where
		F: FnOnce(Message) -> Option<Message> + Send + 'static,
	{
		let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
		let request_id = MessageId::new_request(sequence);
		self.entries.lock().unwrap().insert(
			sequence,
			ChainEntry { chain: vec![Box::new(handler)], timeout_handler: None },
		);
		PendingSyncHandle { table: self, request_id }
	}

	fn then(&self, request_id: MessageId, handler: ContinuationFn) {
		if let Some(entry) = self.entries.lock().unwrap().get_mut(&request_id.sequence()) {
			entry.chain.push(handler);
		}
	}

	fn set_timeout(&self, request_id: MessageId, on_timeout: TimeoutFn) {
		if let Some(entry) = self.entries.lock().unwrap().get_mut(&request_id.sequence()) {
			entry.timeout_handler = Some(on_timeout);
		}
	}

	/// Delivers a response. Runs the installed chain start-to-finish, stopping early if any
	/// stage returns `None`. Returns `false` (a no-op) if `response_id` does not match any
	/// outstanding request — an expired or unawaited response is silently dropped.
	pub fn resolve(&self, response_id: MessageId, message: Message) -> bool {
		let Some(entry) = self.entries.lock().unwrap().remove(&response_id.sequence()) else {
			return false;
		};
		let mut current = Some(message);
		for stage in entry.chain {
			let Some(msg) = current else { break };
			current = stage(msg);
		}
		true
	}

	/// Expires a request. Fires its timeout handler, if one was installed, and drops the
	/// entry. Returns `false` if the request was already resolved or never existed.
	pub fn timeout(&self, request_id: MessageId) -> bool {
		let Some(entry) = self.entries.lock().unwrap().remove(&request_id.sequence()) else {
			return false;
		};
		if let Some(on_timeout) = entry.timeout_handler {
			on_timeout();
		}
		true
	}

	pub fn is_pending(&self, request_id: MessageId) -> bool {
		self.entries.lock().unwrap().contains_key(&request_id.sequence())
	}

	pub fn len(&self) -> usize {
		self.entries.lock().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// A handle onto an in-flight synchronous send, returned by [`PendingSyncTable::begin`].
pub struct PendingSyncHandle<'a> {
	table: &'a PendingSyncTable,
	pub request_id: MessageId,
}

impl<'a> PendingSyncHandle<'a> {
	/// Chains another stage: if the previous stage (or the raw response) produced a message,
	/// it is fed into `handler` once the response arrives.
	#[must_use]
	pub fn then<F>(self, handler: F) -> Self
	where
		F: FnOnce(Message) -> Option<Message> + Send + 'static,
	{
		self.table.then(self.request_id, Box::new(handler));
		self
	}

	/// Installs the handler to run if this request expires before a response arrives.
	#[must_use]
	pub fn with_timeout<F>(self, on_timeout: F) -> Self
	where
		F: FnOnce() + Send + 'static,
	{
		self.table.set_timeout(self.request_id, Box::new(on_timeout));
		self
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{Arc, Mutex as StdMutex};

	use super::*;
	use crate::make_message;

	#[test]
	fn test_resolve_single_stage() {
		let table = PendingSyncTable::new();
		let seen = Arc::new(StdMutex::new(None));
		let seen_clone = seen.clone();
		let handle = table.begin(move |msg| {
			*seen_clone.lock().unwrap() = msg.get_as::<u32>(0).copied();
			None
		});
		assert!(table.is_pending(handle.request_id));
		assert!(table.resolve(handle.request_id.response_id(), make_message!(7u32)));
		assert_eq!(*seen.lock().unwrap(), Some(7));
		assert!(!table.is_pending(handle.request_id));
	}

	#[test]
	fn test_then_chain_composes() {
		let table = PendingSyncTable::new();
		let log = Arc::new(StdMutex::new(Vec::new()));
		let log1 = log.clone();
		let log2 = log.clone();
		let handle = table
			.begin(move |msg| {
				log1.lock().unwrap().push("stage1".to_string());
				msg.get_as::<u32>(0).map(|n| make_message!(n + 1))
			})
			.then(move |msg| {
				log2.lock().unwrap().push("stage2".to_string());
				msg.get_as::<u32>(0).map(|n| make_message!(n + 1))
			});
		table.resolve(handle.request_id.response_id(), make_message!(10u32));
		assert_eq!(*log.lock().unwrap(), vec!["stage1", "stage2"]);
	}

	#[test]
	fn test_chain_short_circuits_on_none() {
		let table = PendingSyncTable::new();
		let second_ran = Arc::new(StdMutex::new(false));
		let second_ran_clone = second_ran.clone();
		let handle = table.begin(|_msg| None).then(move |_msg| {
			*second_ran_clone.lock().unwrap() = true;
			None
		});
		table.resolve(handle.request_id.response_id(), make_message!(1u32));
		assert!(!*second_ran.lock().unwrap());
	}

	#[test]
	fn test_timeout_fires_handler_and_drops_entry() {
		let table = PendingSyncTable::new();
		let fired = Arc::new(StdMutex::new(false));
		let fired_clone = fired.clone();
		let handle = table.begin(|_msg| None).with_timeout(move || {
			*fired_clone.lock().unwrap() = true;
		});
		assert!(table.timeout(handle.request_id));
		assert!(*fired.lock().unwrap());
		assert!(!table.resolve(handle.request_id.response_id(), make_message!(1u32)));
	}

	#[test]
	fn test_unmatched_response_is_a_no_op() {
		let table = PendingSyncTable::new();
		let stray = MessageId::new_request(999).response_id();
		assert!(!table.resolve(stray, make_message!(1u32)));
	}
}
