//! Error types returned by the queues and the thread manager.
//!
//! The bare ring queue only ever stores an internal `u64` index, so its overflow
//! error carries no payload. The scalable queue and the thread manager store
//! arbitrary (possibly move-only, possibly non-`Debug`) values, so their overflow
//! errors hand the rejected value back to the caller instead.

use crate::future::Future;
use std::fmt;

use thiserror::Error;

/// Failure modes of the bare portable ring queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// `tail` has lapped `head` by the full capacity; the queue cannot accept more.
    #[error("ring queue is at capacity")]
    Overflow,
}

/// Overflow error for the scalable circular queue: the free-index ring was empty,
/// so `value` was never stored. The caller gets it back unchanged.
pub struct QueueOverflow<T> {
    pub value: T,
}

impl<T> QueueOverflow<T> {
    pub(crate) fn new(value: T) -> Self {
        Self { value }
    }

    /// Recovers the value that failed to enqueue.
    #[must_use]
    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T> fmt::Debug for QueueOverflow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueOverflow").finish_non_exhaustive()
    }
}

impl<T> fmt::Display for QueueOverflow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scalable queue is at capacity")
    }
}

impl<T> std::error::Error for QueueOverflow<T> {}

/// Overflow error for the thread manager's task queue: the rejected task is
/// returned so the caller can recover it and run it inline, preserving the
/// contract that every future returned by `enqueue`/`enqueue_loop` eventually
/// completes.
pub struct TaskOverflow<T, R> {
    task: T,
    future: Future<R>,
    begin_offset: Option<usize>,
    num_iterations: Option<usize>,
}

impl<T, R> TaskOverflow<T, R> {
    pub(crate) fn new(task: T, future: Future<R>) -> Self {
        Self { task, future, begin_offset: None, num_iterations: None }
    }

    pub(crate) fn for_loop(task: T, future: Future<R>, begin_offset: usize, num_iterations: usize) -> Self {
        Self { task, future, begin_offset: Some(begin_offset), num_iterations: Some(num_iterations) }
    }

    /// Recovers the rejected task so the caller can run it (inline, or re-submit later).
    #[must_use]
    pub fn into_task(self) -> T {
        self.task
    }

    /// The future the rejected task was wired to. It only completes once the caller
    /// runs the recovered task and fulfils it, or never if the task is dropped instead.
    #[must_use]
    pub fn future(&self) -> Future<R> {
        self.future.clone()
    }

    /// For a rejected `enqueue_loop` fan-out, the first iteration index that was
    /// never scheduled. `None` for a plain `enqueue` overflow.
    #[must_use]
    pub fn begin_offset(&self) -> Option<usize> {
        self.begin_offset
    }

    /// For a rejected `enqueue_loop` fan-out, how many iterations never scheduled.
    /// `None` for a plain `enqueue` overflow.
    #[must_use]
    pub fn num_iterations(&self) -> Option<usize> {
        self.num_iterations
    }
}

impl<T, R> fmt::Debug for TaskOverflow<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOverflow")
            .field("begin_offset", &self.begin_offset)
            .field("num_iterations", &self.num_iterations)
            .finish_non_exhaustive()
    }
}

impl<T, R> fmt::Display for TaskOverflow<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread manager task queue is at capacity")
    }
}

impl<T, R> std::error::Error for TaskOverflow<T, R> {}
