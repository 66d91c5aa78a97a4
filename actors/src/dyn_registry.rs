// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! Resolves a dynamic-core [`ActorId`] back to a live [`crate::DynActor`] so a reply or a
//! bounced request can actually be routed to its sender (§3 "sender handle", §4.4, §4.2/§7),
//! the same job [`crate::registry::ActorRegistry`] does for the ambient, typed layer by
//! `TypeId` instead of by id.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex, Weak},
};

use crate::DynActor;

/// A dynamic-core actor's address. Resolvable to a live actor only through a [`DynRegistry`];
/// on its own it is an opaque, copyable handle an envelope can carry as its `sender`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ActorId(pub(crate) u64);

/// Maps every live, registered [`ActorId`] to a weak handle onto its actor. Entries are removed
/// automatically on exit (see `crate::dyn_runtime::DynRuntime::spawn`, which attaches the
/// unregistration as a monitor), so a stale id simply fails to resolve instead of resurrecting a
/// dead actor.
#[derive(Default)]
pub struct DynRegistry {
	actors: Mutex<HashMap<u64, Weak<DynActor>>>,
}

impl DynRegistry {
	pub fn new() -> DynRegistry {
		DynRegistry::default()
	}

	pub fn register(&self, id: ActorId, actor: &Arc<DynActor>) {
		self.actors.lock().unwrap().insert(id.0, Arc::downgrade(actor));
	}

	pub fn unregister(&self, id: ActorId) {
		self.actors.lock().unwrap().remove(&id.0);
	}

	/// Resolves `id` to a live actor, or `None` if it was never registered or has already
	/// exited and dropped its last strong reference.
	pub fn resolve(&self, id: ActorId) -> Option<Arc<DynActor>> {
		self.actors.lock().unwrap().get(&id.0)?.upgrade()
	}

	pub fn len(&self) -> usize {
		self.actors.lock().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
