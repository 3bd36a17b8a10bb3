//! The RPC request queue: a thread-safe, strictly-FIFO channel between the code that
//! *decides* an outbound RPC under a state-machine mutex and the dedicated thread that
//! actually performs it.
//!
//! Both the coordinator and the cache enqueue outbound messages while holding their own
//! mutex, then return immediately — the enqueue itself must never block, or a sender
//! thread stuck on a slow RPC would back up into lock acquisition. A single background
//! thread owns the receiving end and drains it one message at a time, which is what
//! gives outbound RPCs for a given lock their relative ordering: whatever order the
//! state machine decided them in is the order the network sees them leave.
//!
//! This crate is deliberately tiny: it wraps the standard library's multi-producer,
//! single-consumer channel rather than reimplementing one, since nothing about the
//! ordering or blocking semantics it needs goes beyond what `std::sync::mpsc` already
//! guarantees.

use std::sync::mpsc::{self, Receiver, SendError, Sender, TryRecvError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
	/// The consumer side (the sender thread) has been dropped; the producer side is
	/// talking to nobody.
	#[error("rpc queue has no consumer")]
	Disconnected,
}

impl<T> From<SendError<T>> for QueueError {
	fn from(_: SendError<T>) -> Self {
		QueueError::Disconnected
	}
}

/// A strictly-FIFO, multi-producer single-consumer queue of outbound RPC descriptors.
///
/// `enqueue` never blocks. `dequeue` blocks the calling (consumer) thread until a
/// message is available or every producer handle has been dropped.
pub struct RpcQueue<T> {
	tx: Sender<T>,
}

impl<T> Clone for RpcQueue<T> {
	fn clone(&self) -> Self {
		Self { tx: self.tx.clone() }
	}
}

/// The consumer half, held by the dedicated sender thread.
pub struct RpcQueueConsumer<T> {
	rx: Receiver<T>,
}

impl<T> RpcQueue<T> {
	/// Creates a fresh queue and returns the producer handle plus the single consumer
	/// handle. The consumer handle is meant to move into the one thread that will call
	/// `dequeue` in a loop.
	#[must_use]
	pub fn new() -> (Self, RpcQueueConsumer<T>) {
		let (tx, rx) = mpsc::channel();
		(Self { tx }, RpcQueueConsumer { rx })
	}

	/// Enqueues a message. Non-blocking: the call is expected to happen while the
	/// caller still holds its own state-machine mutex.
	///
	/// # Errors
	/// Returns [`QueueError::Disconnected`] if the consumer half has been dropped.
	pub fn enqueue(&self, message: T) -> Result<(), QueueError> {
		self.tx.send(message).map_err(Into::into)
	}
}

impl<T> RpcQueueConsumer<T> {
	/// Blocks until a message is available, or returns `None` once every producer has
	/// been dropped (a clean shutdown signal for the sender thread's loop).
	pub fn dequeue(&self) -> Option<T> {
		let message = self.rx.recv().ok();
		if message.is_none() {
			tracing::trace!("every producer dropped, sender loop can shut down");
		}
		message
	}

	/// Non-blocking dequeue. `None` means either "nothing queued right now" or "every
	/// producer has been dropped"; callers that need to tell those apart should prefer
	/// `dequeue`. Mainly useful in tests asserting that no message was sent.
	pub fn try_dequeue(&self) -> Option<T> {
		match self.rx.try_recv() {
			Ok(message) => Some(message),
			Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::thread;
	use std::time::Duration;

	#[test]
	fn messages_are_delivered_in_fifo_order() {
		let (queue, consumer) = RpcQueue::new();
		for i in 0..5 {
			queue.enqueue(i).unwrap();
		}
		let mut received = Vec::new();
		for _ in 0..5 {
			received.push(consumer.dequeue().unwrap());
		}
		assert_eq!(received, vec![0, 1, 2, 3, 4]);
	}

	#[test]
	fn dequeue_blocks_until_a_producer_enqueues() {
		let (queue, consumer) = RpcQueue::new();
		let handle = thread::spawn(move || consumer.dequeue());

		thread::sleep(Duration::from_millis(20));
		queue.enqueue("hello").unwrap();

		assert_eq!(handle.join().unwrap(), Some("hello"));
	}

	#[test]
	fn dequeue_returns_none_once_every_producer_is_dropped() {
		let (queue, consumer) = RpcQueue::<()>::new();
		drop(queue);
		assert_eq!(consumer.dequeue(), None);
	}

	#[test]
	fn try_dequeue_does_not_block_on_an_empty_queue() {
		let (_queue, consumer) = RpcQueue::<i32>::new();
		assert_eq!(consumer.try_dequeue(), None);
	}

	#[test]
	fn enqueue_after_consumer_dropped_reports_disconnected() {
		let (queue, consumer) = RpcQueue::new();
		drop(consumer);
		assert!(matches!(queue.enqueue(1), Err(QueueError::Disconnected)));
	}
}
