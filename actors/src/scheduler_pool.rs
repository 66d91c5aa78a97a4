// Copyright (c) 2024 The Actors Project Contributors
//
// Licensed under the Business Source License 1.1 (BSL 1.1).
// See the LICENSE file for details.

//! The OS-thread worker pool backing `detached` (thread-backed) actors (§4.7).
//!
//! Workers drain a shared queue of runnable jobs. A job that hands back a follow-up job (the
//! chained-send optimization: a message delivery that immediately produced another runnable job)
//! is run in-line by the same worker rather than being re-submitted through the queue.

use std::{
	collections::VecDeque,
	sync::{Arc, Condvar, Mutex},
	thread::{self, JoinHandle},
	time::Duration,
};

const AGGRESSIVE_SPINS: u32 = 100;
const MODERATE_SPINS: u32 = 550;
const MODERATE_SLEEP: Duration = Duration::from_micros(50);
const RELAXED_SLEEP: Duration = Duration::from_millis(10);

/// One unit of work resumed by a pool worker. Returning `Some(job)` hands the worker a follow-up
/// job to run immediately, without going back through the shared queue.
pub trait Job: Send {
	fn run(self: Box<Self>) -> Option<Box<dyn Job>>;
}

enum Slot {
	Job(Box<dyn Job>),
	Poison,
}

struct Shared {
	queue: Mutex<VecDeque<Slot>>,
	condvar: Condvar,
}

/// A fixed-size pool of OS threads draining a shared job queue.
pub struct WorkerPool {
	shared: Arc<Shared>,
	workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
	pub fn new(num_workers: usize) -> WorkerPool {
		let shared =
			Arc::new(Shared { queue: Mutex::new(VecDeque::new()), condvar: Condvar::new() });
		let workers = (0..num_workers.max(1))
			.map(|_| {
				let shared = shared.clone();
				thread::spawn(move || worker_loop(&shared))
			})
			.collect();
		WorkerPool { shared, workers }
	}

	/// `max(hw_concurrency, 4)`, the default pool size.
	pub fn default_size() -> usize {
		num_cpus::get().max(4)
	}

	pub fn submit(&self, job: Box<dyn Job>) {
		let mut queue = self.shared.queue.lock().unwrap();
		queue.push_back(Slot::Job(job));
		drop(queue);
		self.shared.condvar.notify_one();
	}

	/// Pushes a poison job and joins every worker. Each worker that dequeues the poison
	/// re-enqueues it for a sibling before exiting, so one poison job drains the whole pool.
	pub fn shutdown(mut self) {
		{
			let mut queue = self.shared.queue.lock().unwrap();
			queue.push_back(Slot::Poison);
		}
		self.shared.condvar.notify_all();
		for worker in self.workers.drain(..) {
			let _ = worker.join();
		}
	}
}

fn pop(shared: &Shared) -> Slot {
	for _ in 0..AGGRESSIVE_SPINS {
		if let Some(slot) = shared.queue.lock().unwrap().pop_front() {
			return slot;
		}
		thread::yield_now();
	}
	for _ in 0..MODERATE_SPINS {
		if let Some(slot) = shared.queue.lock().unwrap().pop_front() {
			return slot;
		}
		thread::sleep(MODERATE_SLEEP);
	}
	loop {
		let mut guard = shared.queue.lock().unwrap();
		if let Some(slot) = guard.pop_front() {
			return slot;
		}
		let _ = shared.condvar.wait_timeout(guard, RELAXED_SLEEP).unwrap();
	}
}

fn worker_loop(shared: &Shared) {
	loop {
		match pop(shared) {
			Slot::Poison => {
				let mut queue = shared.queue.lock().unwrap();
				queue.push_back(Slot::Poison);
				drop(queue);
				shared.condvar.notify_one();
				return;
			},
			Slot::Job(job) => {
				let mut next = job.run();
				while let Some(job) = next {
					next = job.run();
				}
			},
		}
	}
}

/// A per-actor, priority-aware split of pending work, populated once per scheduling epoch.
/// High-priority items always drain before low-priority ones.
#[derive(Default)]
pub struct PriorityQueue<T> {
	high: VecDeque<T>,
	low: VecDeque<T>,
}

impl<T> PriorityQueue<T> {
	pub fn new() -> PriorityQueue<T> {
		PriorityQueue::default()
	}

	pub fn push_high(&mut self, item: T) {
		self.high.push_back(item);
	}

	pub fn push_low(&mut self, item: T) {
		self.low.push_back(item);
	}

	pub fn pop(&mut self) -> Option<T> {
		self.high.pop_front().or_else(|| self.low.pop_front())
	}

	pub fn is_empty(&self) -> bool {
		self.high.is_empty() && self.low.is_empty()
	}

	pub fn len(&self) -> usize {
		self.high.len() + self.low.len()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::mpsc;

	use super::*;

	struct Count(mpsc::Sender<u32>, u32, u32);

	impl Job for Count {
		fn run(self: Box<Self>) -> Option<Box<dyn Job>> {
			let Count(tx, value, remaining) = *self;
			let _ = tx.send(value);
			(remaining > 0).then(|| Box::new(Count(tx, value + 1, remaining - 1)) as Box<dyn Job>)
		}
	}

	#[test]
	fn test_pool_runs_submitted_job() {
		let pool = WorkerPool::new(2);
		let (tx, rx) = mpsc::channel();
		pool.submit(Box::new(Count(tx, 0, 0)));
		assert_eq!(rx.recv().unwrap(), 0);
		pool.shutdown();
	}

	#[test]
	fn test_chained_followup_jobs_all_run() {
		let pool = WorkerPool::new(1);
		let (tx, rx) = mpsc::channel();
		pool.submit(Box::new(Count(tx, 0, 3)));
		let seen: Vec<u32> = rx.iter().take(4).collect();
		assert_eq!(seen, vec![0, 1, 2, 3]);
		pool.shutdown();
	}

	#[test]
	fn test_priority_queue_drains_high_first() {
		let mut queue = PriorityQueue::new();
		queue.push_low(1);
		queue.push_high(2);
		queue.push_low(3);
		assert_eq!(queue.pop(), Some(2));
		assert_eq!(queue.pop(), Some(1));
		assert_eq!(queue.pop(), Some(3));
		assert!(queue.is_empty());
	}
}
