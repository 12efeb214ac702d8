//! Type-erased task closures the thread manager's queue actually stores.
//!
//! The queue itself only ever holds `BoxedTask`s — it doesn't know or care what
//! result type a given task produces. Type erasure happens here, at construction:
//! each constructor closes over a `Future<R>` and fulfils it internally once the
//! user closure (or, for a parallel-for fan-out, the last surviving subtask) runs.

use crate::atomic_word::AtomicWord;
use crate::future::Future;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A single runnable unit of work, erased to the id of the worker thread invoking it.
/// `UNMANAGED_THREAD_ID` is passed when a task runs via inline recovery rather than
/// on a pool worker. Returns `true` if the wrapped closure panicked, so the caller
/// can distinguish a completed task from a caught one for metrics purposes without
/// needing its own `catch_unwind` around an already-panic-safe task.
pub type BoxedTask = Box<dyn FnOnce(usize) -> bool + Send + 'static>;

const GATE_UNARMED: i32 = 0;
const GATE_ARMED: i32 = 1;

/// The dependency flag's blocking primitive: a task built with [`make_single_task`]
/// (or [`make_loop_tasks`]) paired with a gate starts at `GATE_UNARMED` and blocks
/// the worker that dequeues it — without pulling a second task off the FIFO in its
/// place — until [`DependencyGate::arm`] stores `GATE_ARMED` and wakes it. Other
/// workers keep draining the queue normally in the meantime.
#[derive(Clone)]
pub struct DependencyGate {
    word: Arc<AtomicWord>,
}

impl DependencyGate {
    pub(crate) fn new() -> Self {
        Self { word: Arc::new(AtomicWord::new(GATE_UNARMED)) }
    }

    /// Signals that the gated task's prerequisite has completed; the worker blocked
    /// on it (if any) wakes and runs the task. Idempotent.
    pub fn arm(&self) {
        self.word.store(GATE_ARMED, Ordering::Release);
        self.word.notify_all();
    }

    fn wait_until_armed(&self) {
        loop {
            let seen = self.word.load(Ordering::Acquire);
            if seen == GATE_ARMED {
                return;
            }
            self.word.wait(seen);
        }
    }
}

/// Wraps a user closure so that calling it catches any panic, stores the outcome
/// into `future`'s shared result cell, and never propagates the panic past this
/// boundary — the worker thread that runs it survives regardless of what the task
/// does.
pub(crate) fn make_single_task<F, R>(closure: F, future: Future<R>) -> BoxedTask
where
    F: FnOnce(usize) -> R + Send + 'static,
    R: Send + 'static,
{
    make_single_task_gated(closure, future, None)
}

/// As [`make_single_task`], but if `gate` is `Some`, the worker that dequeues this
/// task blocks until the gate is armed before invoking `closure`.
pub(crate) fn make_single_task_gated<F, R>(closure: F, future: Future<R>, gate: Option<DependencyGate>) -> BoxedTask
where
    F: FnOnce(usize) -> R + Send + 'static,
    R: Send + 'static,
{
    Box::new(move |thread_id| {
        if let Some(gate) = gate {
            gate.wait_until_armed();
        }
        let result = panic::catch_unwind(AssertUnwindSafe(|| closure(thread_id)));
        let panicked = result.is_err();
        future.fulfil(result);
        panicked
    })
}

/// Shared state for a parallel-for fan-out: a remaining-subtask counter and a slot
/// for the first panic any subtask raises. The subtask that observes the counter
/// hit zero is the one that fulfils the shared future.
struct LoopState {
    remaining: AtomicUsize,
    panic: Mutex<Option<Box<dyn Any + Send + 'static>>>,
}

/// Builds one subtask per slice in `slices`, all sharing one `LoopState` and one
/// `Future<()>`. Each subtask runs `closure(i, thread_id)` for every `i` in its own
/// slice; the last slice to finish fulfils `future`, with `Err` if any subtask
/// panicked partway through its slice (the rest of that slice's iterations are
/// skipped, matching `catch_unwind`'s "the closure stopped running" semantics).
pub(crate) fn make_loop_tasks<F>(closure: Arc<F>, slices: Vec<(usize, usize)>, future: Future<()>) -> Vec<BoxedTask>
where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    make_loop_tasks_gated(closure, slices, future, None)
}

/// As [`make_loop_tasks`], but if `gate` is `Some`, every subtask blocks until the
/// gate is armed before running its slice of iterations. All subtasks share the one
/// gate, so arming it releases every slice's worker at once.
pub(crate) fn make_loop_tasks_gated<F>(
    closure: Arc<F>,
    slices: Vec<(usize, usize)>,
    future: Future<()>,
    gate: Option<DependencyGate>,
) -> Vec<BoxedTask>
where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    let state = Arc::new(LoopState { remaining: AtomicUsize::new(slices.len()), panic: Mutex::new(None) });

    slices
        .into_iter()
        .map(|(lo, hi)| {
            let closure = Arc::clone(&closure);
            let state = Arc::clone(&state);
            let future = future.clone();
            let gate = gate.clone();
            Box::new(move |thread_id: usize| {
                if let Some(gate) = gate {
                    gate.wait_until_armed();
                }
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    for i in lo..hi {
                        closure(i, thread_id);
                    }
                }));
                let panicked = outcome.is_err();
                if let Err(payload) = outcome {
                    let mut slot = state.panic.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    if slot.is_none() {
                        *slot = Some(payload);
                    }
                }
                if state.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let mut slot = state.panic.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    match slot.take() {
                        Some(payload) => future.fulfil(Err(payload)),
                        None => future.fulfil(Ok(())),
                    }
                }
                panicked
            }) as BoxedTask
        })
        .collect()
}
