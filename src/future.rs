//! The typed result handle returned by the thread manager's `enqueue`/`enqueue_loop`.
//!
//! A `Future<R>` and the worker that eventually completes it share one
//! `Arc<ResultCell<R>>` — the same "last releaser destroys" ownership pattern the
//! rest of the core uses for shared state, just with two owners instead of many.

use std::panic;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use crate::atomic_word::AtomicWord;

const PENDING: i32 = 0;
const READY: i32 = 1;
const ABANDONED: i32 = 2;

struct ResultCell<R> {
    state: AtomicWord,
    value: Mutex<Option<thread_result::Result<R>>>,
}

/// Re-exported so callers don't need `std::thread` in scope just to spell the type
/// a panicking task's result takes.
mod thread_result {
    pub type Result<R> = std::thread::Result<R>;
}

/// An owning handle to a task's eventual result.
///
/// Dropping a `Future` without calling `wait`/`get` is legal: the task still runs
/// to completion (or, if the owning thread manager shuts down first, is abandoned),
/// and the shared result cell is freed once every handle and the worker have
/// released their reference.
pub struct Future<R> {
    cell: Arc<ResultCell<R>>,
}

impl<R> Clone for Future<R> {
    fn clone(&self) -> Self {
        Self { cell: Arc::clone(&self.cell) }
    }
}

impl<R> Future<R> {
    pub(crate) fn pending() -> Self {
        Self { cell: Arc::new(ResultCell { state: AtomicWord::new(PENDING), value: Mutex::new(None) }) }
    }

    /// Blocks the calling thread until the task completes or is abandoned.
    pub fn wait(&self) {
        loop {
            let state = self.cell.state.load(Ordering::Acquire);
            if state != PENDING {
                return;
            }
            self.cell.state.wait(PENDING);
        }
    }

    /// `false` once the owning thread manager has been destroyed with this task
    /// still unscheduled; `true` otherwise (including while still pending).
    #[must_use]
    pub fn valid(&self) -> bool {
        self.cell.state.load(Ordering::Acquire) != ABANDONED
    }

    /// Blocks until the result is available, then moves it out.
    ///
    /// Returns `None` if the task was abandoned rather than run. Re-raises (via
    /// `std::panic::resume_unwind`) if the task panicked instead of returning, so a
    /// panicking task still surfaces as a panic to whoever calls `get`, without ever
    /// having taken down the worker thread that ran it.
    #[must_use]
    pub fn get(self) -> Option<R> {
        self.wait();
        let mut guard = self.cell.value.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match guard.take() {
            Some(Ok(value)) => Some(value),
            Some(Err(payload)) => panic::resume_unwind(payload),
            None => None,
        }
    }

    pub(crate) fn fulfil(&self, result: thread_result::Result<R>) {
        *self.cell.value.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(result);
        self.cell.state.store(READY, Ordering::Release);
        self.cell.state.notify_all();
    }

    pub(crate) fn abandon(&self) {
        self.cell.state.store(ABANDONED, Ordering::Release);
        self.cell.state.notify_all();
    }
}
