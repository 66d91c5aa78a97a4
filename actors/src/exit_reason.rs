// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! 32-bit exit reason codes, and their mapping to/from [`ActorExitStatus`].
//!
//! `ActorExitStatus` is the ambient-runtime's own exit type, with a payload (`Arc<anyhow::Error>`)
//! and variants tailored to the supervised, typed-handler world of [`crate::Actor`]. `ExitReason`
//! is the flatter, copyable code used by the dynamic core (links, monitors, the pre-dispatch
//! filter in `crate::receive_policy`) where an `(exit_signal, reason)` envelope needs to travel
//! through a mailbox and be compared/matched cheaply.

use crate::ActorExitStatus;

/// A 32-bit exit reason code.
///
/// Once an actor's reason is set to a non-zero value it is monotonic: subsequent attempts to
/// change it are no-ops (see [`crate::ActorState`] for the equivalent rule on the ambient side).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ExitReason(pub i32);

impl ExitReason {
	/// The actor has not exited yet.
	pub const NOT_EXITED: ExitReason = ExitReason(0);
	/// Graceful exit, requested or implicit (mailbox drained, no more senders).
	pub const NORMAL: ExitReason = ExitReason(1);
	/// A handler panicked or returned an error.
	pub const UNHANDLED_EXCEPTION: ExitReason = ExitReason(2);
	/// The receive policy's pre-dispatch filter rejected every clause (see §4.4).
	pub const UNALLOWED_RECEIVE: ExitReason = ExitReason(3);
	/// The actor was forcefully killed.
	pub const KILLED: ExitReason = ExitReason(4);
	/// A linked/remote peer became unreachable.
	pub const REMOTE_UNREACHABLE: ExitReason = ExitReason(0x101);

	/// The first code available to user-defined exit reasons.
	pub const USER_DEFINED_START: i32 = 0x10000;

	pub fn user_defined(code: i32) -> ExitReason {
		debug_assert!(code >= Self::USER_DEFINED_START, "user exit reasons must be >= 0x10000");
		ExitReason(code)
	}

	pub fn is_exited(&self) -> bool {
		self.0 != Self::NOT_EXITED.0
	}

	pub fn is_normal(&self) -> bool {
		*self == Self::NORMAL
	}
}

impl From<&ActorExitStatus> for ExitReason {
	fn from(status: &ActorExitStatus) -> Self {
		match status {
			ActorExitStatus::Success | ActorExitStatus::Quit => ExitReason::NORMAL,
			ActorExitStatus::Killed => ExitReason::KILLED,
			ActorExitStatus::DownstreamClosed => ExitReason::REMOTE_UNREACHABLE,
			ActorExitStatus::Failure(_) | ActorExitStatus::Panicked => {
				ExitReason::UNHANDLED_EXCEPTION
			},
		}
	}
}

impl From<ExitReason> for ActorExitStatus {
	fn from(reason: ExitReason) -> Self {
		match reason {
			ExitReason::NORMAL => ActorExitStatus::Success,
			ExitReason::KILLED => ActorExitStatus::Killed,
			ExitReason::REMOTE_UNREACHABLE => ActorExitStatus::DownstreamClosed,
			ExitReason::NOT_EXITED => {
				ActorExitStatus::Failure(std::sync::Arc::new(anyhow::anyhow!(
					"actor reported as exited with reason NOT_EXITED"
				)))
			},
			ExitReason::UNHANDLED_EXCEPTION | ExitReason::UNALLOWED_RECEIVE => {
				ActorExitStatus::Failure(std::sync::Arc::new(anyhow::anyhow!(
					"actor exited with reason code {}",
					reason.0
				)))
			},
			other => ActorExitStatus::Failure(std::sync::Arc::new(anyhow::anyhow!(
				"actor exited with reason code {}",
				other.0
			))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_exit_reason_roundtrip_normal() {
		let status = ActorExitStatus::Success;
		let reason = ExitReason::from(&status);
		assert_eq!(reason, ExitReason::NORMAL);
		assert!(matches!(ActorExitStatus::from(reason), ActorExitStatus::Success));
	}

	#[test]
	fn test_exit_reason_roundtrip_killed() {
		let reason = ExitReason::from(&ActorExitStatus::Killed);
		assert_eq!(reason, ExitReason::KILLED);
		assert!(matches!(ActorExitStatus::from(reason), ActorExitStatus::Killed));
	}

	#[test]
	fn test_user_defined_exit_reason() {
		let reason = ExitReason::user_defined(0x10001);
		assert!(reason.is_exited());
		assert!(!reason.is_normal());
	}
}
