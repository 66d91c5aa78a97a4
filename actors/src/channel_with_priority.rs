// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! A channel with two lanes: messages sent on the high priority lane are always received
//! before messages sent on the low priority lane, regardless of send order.
//!
//! Commands (see [`crate::Command`]) travel on the high priority lane so that an actor can
//! always be paused, resumed or told to quit even if its low priority mailbox is saturated.

use std::sync::Mutex;

use flume::TryRecvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SendError {
	#[error("the channel is closed")]
	Disconnected,
}

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum RecvError {
	#[error("no message is currently available")]
	NoMessageAvailable,
	#[error("all senders were dropped and no pending messages remain in the channel")]
	Disconnected,
}

#[derive(Debug, Error)]
pub enum TrySendError<T> {
	#[error("the channel is full")]
	Full(T),
	#[error("the channel is closed")]
	Disconnected,
}

impl<T> From<flume::RecvTimeoutError> for RecvError {
	fn from(flume_err: flume::RecvTimeoutError) -> Self {
		match flume_err {
			flume::RecvTimeoutError::Timeout => Self::NoMessageAvailable,
			flume::RecvTimeoutError::Disconnected => Self::Disconnected,
		}
	}
}

impl<T> From<flume::SendError<T>> for SendError {
	fn from(_send_error: flume::SendError<T>) -> Self {
		SendError::Disconnected
	}
}

impl<T> From<flume::TrySendError<T>> for TrySendError<T> {
	fn from(try_send_error: flume::TrySendError<T>) -> Self {
		match try_send_error {
			flume::TrySendError::Full(msg) => TrySendError::Full(msg),
			flume::TrySendError::Disconnected(_) => TrySendError::Disconnected,
		}
	}
}

/// The capacity of an actor's low priority mailbox.
#[derive(Clone, Copy, Debug)]
pub enum QueueCapacity {
	Bounded(usize),
	Unbounded,
}

/// Creates a channel with the ability to send high priority messages.
///
/// A high priority message is guaranteed to be consumed before any low priority message
/// sent after it.
pub fn channel<T>(queue_capacity: QueueCapacity) -> (Sender<T>, Receiver<T>) {
	let (high_priority_tx, high_priority_rx) = flume::unbounded();
	let (low_priority_tx, low_priority_rx) = match queue_capacity {
		QueueCapacity::Bounded(cap) => flume::bounded(cap),
		QueueCapacity::Unbounded => flume::unbounded(),
	};
	let receiver = Receiver {
		low_priority_rx,
		high_priority_rx,
		_high_priority_tx: high_priority_tx.clone(),
		pending_low_priority_message: Mutex::new(None),
	};
	let sender = Sender { low_priority_tx, high_priority_tx };
	(sender, receiver)
}

pub struct Sender<T> {
	low_priority_tx: flume::Sender<T>,
	high_priority_tx: flume::Sender<T>,
}

impl<T> Sender<T> {
	pub async fn send_low_priority(&self, msg: T) -> Result<(), SendError> {
		self.low_priority_tx.send_async(msg).await?;
		Ok(())
	}

	pub fn try_send_low_priority(&self, msg: T) -> Result<(), TrySendError<T>> {
		self.low_priority_tx.try_send(msg)?;
		Ok(())
	}

	pub fn send_high_priority(&self, msg: T) -> Result<(), SendError> {
		self.high_priority_tx.send(msg)?;
		Ok(())
	}

	pub fn is_disconnected(&self) -> bool {
		self.low_priority_tx.is_disconnected()
	}
}

/// The receiving end of a [`channel`].
///
/// Its methods take `&self` rather than `&mut self` so it can be shared behind an `Arc` by
/// several clones of the same [`crate::messagebus::Inbox`].
pub struct Receiver<T> {
	low_priority_rx: flume::Receiver<T>,
	high_priority_rx: flume::Receiver<T>,
	_high_priority_tx: flume::Sender<T>,
	pending_low_priority_message: Mutex<Option<T>>,
}

impl<T> Receiver<T> {
	pub fn is_empty(&self) -> bool {
		self.pending_low_priority_message.lock().unwrap().is_none() &&
			self.low_priority_rx.is_empty() &&
			self.high_priority_rx.is_empty()
	}

	pub fn try_recv_high_priority_message(&self) -> Result<T, RecvError> {
		match self.high_priority_rx.try_recv() {
			Ok(msg) => Ok(msg),
			Err(TryRecvError::Disconnected) => {
				unreachable!(
					"This can never happen, as the high priority Sender is owned by the Receiver."
				);
			},
			Err(TryRecvError::Empty) => {
				if self.low_priority_rx.is_disconnected() {
					// Check that no new high priority message was sent in between.
					if let Ok(msg) = self.high_priority_rx.try_recv() {
						Ok(msg)
					} else {
						Err(RecvError::Disconnected)
					}
				} else {
					Err(RecvError::NoMessageAvailable)
				}
			},
		}
	}

	pub fn try_recv(&self) -> Result<T, RecvError> {
		if let Ok(msg) = self.high_priority_rx.try_recv() {
			return Ok(msg);
		}
		if let Some(pending_msg) = self.pending_low_priority_message.lock().unwrap().take() {
			return Ok(pending_msg);
		}
		match self.low_priority_rx.try_recv() {
			Ok(low_msg) => {
				if let Ok(high_msg) = self.high_priority_rx.try_recv() {
					*self.pending_low_priority_message.lock().unwrap() = Some(low_msg);
					Ok(high_msg)
				} else {
					Ok(low_msg)
				}
			},
			Err(TryRecvError::Disconnected) => {
				if let Ok(high_msg) = self.high_priority_rx.try_recv() {
					Ok(high_msg)
				} else {
					Err(RecvError::Disconnected)
				}
			},
			Err(TryRecvError::Empty) => Err(RecvError::NoMessageAvailable),
		}
	}

	pub async fn recv_high_priority(&self) -> T {
		self.high_priority_rx
			.recv_async()
			.await
			.expect("the receiver owns the high priority sender, so it never disconnects")
	}

	pub async fn recv(&self) -> Result<T, RecvError> {
		if let Ok(msg) = self.try_recv_high_priority_message() {
			return Ok(msg);
		}
		if let Some(pending_msg) = self.pending_low_priority_message.lock().unwrap().take() {
			return Ok(pending_msg);
		}
		tokio::select! {
			high_priority_msg_res = self.high_priority_rx.recv_async() => {
				match high_priority_msg_res {
					Ok(high_priority_msg) => Ok(high_priority_msg),
					Err(_) => unreachable!(
						"the receiver owns the high priority sender, so it never disconnects"
					),
				}
			}
			low_priority_msg_res = self.low_priority_rx.recv_async() => {
				match low_priority_msg_res {
					Ok(low_priority_msg) => {
						if let Ok(high_priority_msg) = self.try_recv_high_priority_message() {
							*self.pending_low_priority_message.lock().unwrap() = Some(low_priority_msg);
							Ok(high_priority_msg)
						} else {
							Ok(low_priority_msg)
						}
					},
					Err(flume::RecvError::Disconnected) => {
						if let Ok(high_priority_msg) = self.try_recv_high_priority_message() {
							Ok(high_priority_msg)
						} else {
							Err(RecvError::Disconnected)
						}
					}
				}
			}
		}
	}

	/// Drains all of the pending low priority messages and returns them.
	pub fn drain_low_priority(&self) -> Vec<T> {
		let mut messages: Vec<T> = self.pending_low_priority_message.lock().unwrap().take().into_iter().collect();
		while let Ok(msg) = self.low_priority_rx.try_recv() {
			messages.push(msg);
		}
		messages
	}
}
