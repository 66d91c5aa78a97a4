// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! A dynamically typed, copy-on-write message tuple.
//!
//! This is the payload type used by the dynamically dispatched actor core
//! ([`crate::Behavior`], `crate::receive_policy`): unlike the statically typed
//! `Handler<M>` surface, a [`Message`] carries a runtime-queryable sequence of type tags so a
//! behavior can pattern-match on shape before decoding any slot.

use std::{any::Any, any::TypeId, fmt, sync::Arc};

/// A single slot of a [`Message`].
///
/// Implemented for every `T: Send + Sync + Clone + PartialEq + fmt::Debug + 'static` via the
/// blanket impl below; user code never implements this directly.
pub trait MessageElement: Any + Send + Sync + fmt::Debug {
	fn eq_dyn(&self, other: &dyn MessageElement) -> bool;
	fn clone_box(&self) -> Box<dyn MessageElement>;
	fn as_any(&self) -> &dyn Any;
}

impl<T> MessageElement for T
where
	T: Any + Send + Sync + Clone + PartialEq + fmt::Debug,
{
	fn eq_dyn(&self, other: &dyn MessageElement) -> bool {
		other.as_any().downcast_ref::<T>().is_some_and(|other| self == other)
	}

	fn clone_box(&self) -> Box<dyn MessageElement> {
		Box::new(self.clone())
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

impl Clone for Box<dyn MessageElement> {
	fn clone(&self) -> Self {
		self.as_ref().clone_box()
	}
}

impl fmt::Debug for Box<dyn MessageElement> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		self.as_ref().fmt(f)
	}
}

/// An immutable, reference-counted, ordered tuple of dynamically typed values.
///
/// Cloning a `Message` is cheap (an `Arc` bump). Mutating it (see [`Message::make_mut`])
/// deep-copies the underlying slots only if the message is shared, i.e. it is a copy-on-write
/// tuple, not a persistent one.
#[derive(Clone)]
pub struct Message {
	slots: Arc<Vec<Box<dyn MessageElement>>>,
}

impl Message {
	/// Builds a message from already-boxed slots. Prefer the [`make_message!`] macro.
	pub fn from_boxed(slots: Vec<Box<dyn MessageElement>>) -> Message {
		Message { slots: Arc::new(slots) }
	}

	pub fn empty() -> Message {
		Message { slots: Arc::new(Vec::new()) }
	}

	pub fn size(&self) -> usize {
		self.slots.len()
	}

	pub fn is_empty(&self) -> bool {
		self.slots.is_empty()
	}

	/// The type tag of the value at `index`, or `None` if out of bounds.
	pub fn type_at(&self, index: usize) -> Option<TypeId> {
		self.slots.get(index).map(|slot| slot.as_ref().as_any().type_id())
	}

	/// Decodes the slot at `index` as `T`.
	///
	/// Calling this with a `T` that does not match `type_at(index)` is a programmer error. In
	/// keeping with the rest of this crate we never produce undefined behavior for it: the
	/// mismatch is reported via a `debug_assert!` (so test and debug builds catch it loudly)
	/// and `None` is returned in every build.
	pub fn get_as<T: 'static>(&self, index: usize) -> Option<&T> {
		let slot = self.slots.get(index)?;
		let decoded = slot.as_ref().as_any().downcast_ref::<T>();
		debug_assert!(decoded.is_some(), "message slot {index} is not of the requested type");
		decoded
	}

	/// The full type signature, for structural matching against a [`crate::Behavior`] clause.
	pub fn type_signature(&self) -> Vec<TypeId> {
		self.slots.iter().map(|slot| slot.as_ref().as_any().type_id()).collect()
	}

	/// Gives mutable access to the underlying slots, deep-copying them first if this message
	/// is shared with another clone.
	pub fn make_mut(&mut self) -> &mut Vec<Box<dyn MessageElement>> {
		Arc::make_mut(&mut self.slots)
	}
}

impl fmt::Debug for Message {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_tuple("Message").field(&self.slots).finish()
	}
}

impl PartialEq for Message {
	fn eq(&self, other: &Self) -> bool {
		self.slots.len() == other.slots.len() &&
			self.slots
				.iter()
				.zip(other.slots.iter())
				.all(|(left, right)| left.as_ref().eq_dyn(right.as_ref()))
	}
}

/// Builds a [`Message`] from a list of owned values.
///
/// This is the only constructor exposed to callers that don't already have boxed slots in
/// hand, mirroring `make_message(xs...)`.
#[macro_export]
macro_rules! make_message {
	($($value:expr),* $(,)?) => {
		$crate::Message::from_boxed(vec![$(Box::new($value) as Box<dyn $crate::MessageElement>),*])
	};
}

/// A 64-bit message correlation id.
///
/// Bit 63 is the *is_request* flag. A response id is the matching request id with that bit
/// cleared. `MessageId::UNCORRELATED` (all zero bits) marks an asynchronous, uncorrelated
/// send.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct MessageId(u64);

const REQUEST_FLAG: u64 = 1 << 63;

impl MessageId {
	pub const UNCORRELATED: MessageId = MessageId(0);

	pub(crate) fn new_request(sequence: u64) -> MessageId {
		MessageId(sequence | REQUEST_FLAG)
	}

	pub fn is_request(&self) -> bool {
		self.0 & REQUEST_FLAG != 0 && self.0 != 0
	}

	pub fn is_response(&self) -> bool {
		!self.is_request() && self.0 != 0
	}

	pub fn is_uncorrelated(&self) -> bool {
		self.0 == 0
	}

	/// The response id paired with this request id (flips the request flag off).
	pub fn response_id(&self) -> MessageId {
		MessageId(self.0 & !REQUEST_FLAG)
	}

	/// The numeric sequence shared by a request id and its paired response id, used to key
	/// the pending-sync table regardless of which of the two is in hand.
	pub(crate) fn sequence(&self) -> u64 {
		self.0 & !REQUEST_FLAG
	}
}
