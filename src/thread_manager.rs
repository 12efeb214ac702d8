//! Fixed-size worker pool consuming a single FIFO of type-erased task closures,
//! with per-task result futures, parallel-for fan-out, and a backpressure protocol
//! that surfaces the rejected task rather than blocking or silently dropping it.

use crate::config::Config;
use crate::error::TaskOverflow;
use crate::future::Future;
use crate::invariants::{debug_assert_partition_bounds, debug_assert_thread_id_bound};
use crate::mem_resource::{default_resource, MemoryResource};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::scalable_queue::ScalableCircularQueue;
use crate::task::{self, BoxedTask, DependencyGate};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Thread id observed by a closure invoked from outside the pool (e.g. a task
/// recovered from a [`TaskOverflow`] and run inline by the caller).
pub const UNMANAGED_THREAD_ID: usize = usize::MAX;

struct Inner {
    queue: ScalableCircularQueue<BoxedTask>,
    /// Generation counter workers block on; every successful enqueue (and shutdown)
    /// bumps it so a blocked worker's `wait(seen)` always observes a change.
    signal: crate::atomic_word::AtomicWord,
    shutdown: AtomicBool,
    num_workers: usize,
    metrics: Metrics,
}

impl Inner {
    fn wake_workers(&self) {
        self.signal.fetch_add(1, Ordering::Release);
        self.signal.notify_all();
    }

    fn submit(&self, task: BoxedTask) -> Result<(), BoxedTask> {
        match self.queue.enqueue(task) {
            Ok(_) => {
                self.wake_workers();
                Ok(())
            }
            Err(rejected) => {
                self.metrics.record_overflow();
                Err(rejected.into_value())
            }
        }
    }
}

/// A fixed pool of worker threads draining one shared task queue.
///
/// Workers are spawned eagerly at construction and joined on `Drop`. A task
/// already dequeued by a worker always runs to completion; a task still sitting
/// in the queue when the manager is dropped is abandoned instead (its future's
/// `wait`/`get` still return, but report no result).
pub struct ThreadManager {
    inner: Arc<Inner>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadManager {
    /// Spawns `config.worker_count` workers over a task queue of `config`'s
    /// capacity, backed by the default (global-allocator) memory resource.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_resource(config, default_resource())
    }

    /// As [`ThreadManager::new`], but the task queue is allocated through
    /// `resource` instead of the default global-allocator resource.
    #[must_use]
    pub fn with_resource(config: Config, resource: Arc<dyn MemoryResource>) -> Self {
        let inner = Arc::new(Inner {
            queue: ScalableCircularQueue::with_resource(config, resource),
            signal: crate::atomic_word::AtomicWord::new(0),
            shutdown: AtomicBool::new(false),
            num_workers: config.worker_count,
            metrics: Metrics::new(config.enable_metrics),
        });

        let workers = (0..inner.num_workers)
            .map(|thread_id| {
                let inner = Arc::clone(&inner);
                thread::Builder::new()
                    .name(format!("concurrency-core-worker-{thread_id}"))
                    .spawn(move || worker_loop(&inner, thread_id))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        debug!("thread manager started with {} workers", inner.num_workers);
        Self { inner, workers }
    }

    /// Number of worker threads in the pool.
    #[inline]
    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.inner.num_workers
    }

    /// `true` if no task is currently queued (workers may still be running one).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.queue.is_empty()
    }

    /// Task queue capacity, a power of two.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.queue.capacity()
    }

    /// A snapshot of this pool's task-queue enqueue/dequeue/overflow and
    /// completed/panicked task counters. All zero if `config.enable_metrics` was
    /// `false` at construction.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Drops every task currently sitting in the queue without running it; each
    /// one's future is left pending forever (not abandoned — abandonment is
    /// reserved for shutdown). A task a worker has already dequeued still runs.
    pub fn clear(&self) {
        self.inner.queue.clear();
    }

    /// Submits `closure` to run on the first available worker, which calls it with
    /// its own stable thread id. Returns a future for the result; on backpressure,
    /// returns the rejected closure (as a type-erased task) and a future the caller
    /// can still fulfil by recovering and running the task manually.
    pub fn enqueue<F, R>(&self, closure: F) -> Result<Future<R>, TaskOverflow<BoxedTask, R>>
    where
        F: FnOnce(usize) -> R + Send + 'static,
        R: Send + 'static,
    {
        let future = Future::pending();
        let task = task::make_single_task(closure, future.clone());
        match self.inner.submit(task) {
            Ok(()) => Ok(future),
            Err(rejected) => Err(TaskOverflow::new(rejected, future)),
        }
    }

    /// As [`ThreadManager::enqueue`], but the task does not run until the returned
    /// [`DependencyGate`] is armed, even if a worker dequeues it first. The worker
    /// that dequeues a gated task blocks on the gate rather than skipping ahead to
    /// the next queued task, so other workers keep draining the queue normally.
    pub fn enqueue_dependent<F, R>(
        &self,
        closure: F,
    ) -> Result<(Future<R>, DependencyGate), TaskOverflow<BoxedTask, R>>
    where
        F: FnOnce(usize) -> R + Send + 'static,
        R: Send + 'static,
    {
        let future = Future::pending();
        let gate = DependencyGate::new();
        let task = task::make_single_task_gated(closure, future.clone(), Some(gate.clone()));
        match self.inner.submit(task) {
            Ok(()) => Ok((future, gate)),
            Err(rejected) => Err(TaskOverflow::new(rejected, future)),
        }
    }

    /// Submits `closure` to run once per index in `[begin, end)`, split into
    /// `num_workers()` contiguous, non-overlapping slices (see
    /// [`partition_range`]). Returns a future that completes once every slice has
    /// run. An empty range completes its future immediately without touching the
    /// queue.
    ///
    /// # Panics
    ///
    /// Panics if `begin > end`.
    pub fn enqueue_loop<F>(
        &self,
        closure: F,
        begin: usize,
        end: usize,
    ) -> Result<Future<()>, TaskOverflow<Vec<BoxedTask>, ()>>
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.enqueue_loop_gated(closure, begin, end, None).map(|(future, _)| future)
    }

    /// As [`ThreadManager::enqueue_loop`], but every subtask shares one
    /// [`DependencyGate`]: none of them start until the caller arms it, even for
    /// subtasks a worker has already dequeued.
    pub fn enqueue_loop_dependent<F>(
        &self,
        closure: F,
        begin: usize,
        end: usize,
    ) -> Result<(Future<()>, DependencyGate), TaskOverflow<Vec<BoxedTask>, ()>>
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        let gate = DependencyGate::new();
        self.enqueue_loop_gated(closure, begin, end, Some(gate.clone())).map(|(future, _)| (future, gate))
    }

    fn enqueue_loop_gated<F>(
        &self,
        closure: F,
        begin: usize,
        end: usize,
        gate: Option<DependencyGate>,
    ) -> Result<(Future<()>, ()), TaskOverflow<Vec<BoxedTask>, ()>>
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        assert!(begin <= end, "begin ({begin}) must not exceed end ({end})");
        let future = Future::pending();
        if begin == end {
            future.fulfil(Ok(()));
            return Ok((future, ()));
        }

        let slices = partition_range(begin, end, self.inner.num_workers);
        let tasks = task::make_loop_tasks_gated(Arc::new(closure), slices.clone(), future.clone(), gate);

        let mut remaining = tasks.into_iter().enumerate();
        let mut submitted = 0usize;
        while let Some((idx, task)) = remaining.next() {
            match self.inner.submit(task) {
                Ok(()) => submitted += 1,
                Err(rejected_task) => {
                    // The tasks already queued still run and still fulfil `future`
                    // via the shared countdown once every slice — submitted or
                    // recovered — has run exactly once; the countdown was sized for
                    // the full fan-out, so it reaches zero as long as the caller
                    // eventually runs (inline or otherwise) every task this error
                    // hands back. So `future` must NOT be abandoned here: hand back
                    // the same future the unsubmitted tasks' closures already close
                    // over (the one that just bounced plus every slice this loop
                    // never even tried to submit), so recovering and running them
                    // inline still resolves the future the caller was given.
                    let rejected_begin = slices[idx].0;
                    let unsubmitted: Vec<BoxedTask> =
                        std::iter::once(rejected_task).chain(remaining.map(|(_, t)| t)).collect();
                    warn!(
                        "enqueue_loop overflow after submitting {submitted} of {} slices",
                        slices.len()
                    );
                    return Err(TaskOverflow::for_loop(
                        unsubmitted,
                        future.clone(),
                        rejected_begin,
                        end - rejected_begin,
                    ));
                }
            }
        }
        Ok((future, ()))
    }

    /// Blocks until the queue has drained and every currently-running task has
    /// finished. New tasks enqueued concurrently are not waited on.
    pub fn wait_for_completion(&self) {
        while !self.inner.queue.is_empty() {
            thread::yield_now();
        }
    }
}

impl Drop for ThreadManager {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.wake_workers();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        debug!("thread manager shut down");
    }
}

fn worker_loop(inner: &Inner, thread_id: usize) {
    debug_assert_thread_id_bound!(thread_id, inner.num_workers);
    loop {
        if let Some(task) = inner.queue.dequeue() {
            if task(thread_id) {
                inner.metrics.record_task_panicked();
            } else {
                inner.metrics.record_task_completed();
            }
            continue;
        }
        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }
        let seen = inner.signal.load(Ordering::Acquire);
        if !inner.queue.is_empty() || inner.shutdown.load(Ordering::Acquire) {
            continue;
        }
        inner.signal.wait(seen);
    }
}

/// Deterministically partitions `[begin, end)` into `num_workers` contiguous,
/// non-overlapping sub-ranges: worker `i` receives
/// `[begin + i*L/W, begin + (i+1)*L/W)` where `L = end - begin`, `W = num_workers`.
/// Two calls with identical arguments always produce identical partitions, and the
/// `L mod W` leftover iterations land on the highest-indexed workers.
#[must_use]
pub fn partition_range(begin: usize, end: usize, num_workers: usize) -> Vec<(usize, usize)> {
    assert!(num_workers > 0, "num_workers must be at least 1");
    let len = end - begin;
    (0..num_workers)
        .map(|i| {
            let lo = begin + (i * len) / num_workers;
            let hi = begin + ((i + 1) * len) / num_workers;
            debug_assert_partition_bounds!(lo, hi, end);
            (lo, hi)
        })
        .collect()
}
