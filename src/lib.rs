//! concurrency-core — the lock-free / wait-free data structures a multi-producer,
//! multi-consumer workload is built on: a portable MPMC ring queue, a scalable
//! circular queue composed from two such rings plus a storage array, the atomic
//! word primitive both block and wake threads on, a counted bitset, and a thread
//! pool with typed futures, parallel-for, and a backpressure protocol that hands
//! a rejected task back to the caller instead of blocking or dropping it.
//!
//! Everything here is layered: the atomic word and the bitset depend on nothing
//! else in the crate; the portable ring queue depends on the atomic word's
//! `Backoff`-style spinning only incidentally (contention backoff, not blocking);
//! the scalable queue is two rings and a storage array; the thread manager is the
//! scalable queue plus a worker pool.
//!
//! # Example
//!
//! ```
//! use concurrency_core::{Config, ThreadManager};
//!
//! let tm = ThreadManager::new(Config::new(64, 4, false));
//! let future = tm.enqueue(|thread_id| thread_id * 2).unwrap();
//! assert!(future.get().unwrap() < 4 * 2);
//!
//! let sum_future = tm
//!     .enqueue_loop(|_i, _thread_id| { /* ... */ }, 0, 1024)
//!     .unwrap();
//! sum_future.get();
//! ```
//!
//! # Memory resources
//!
//! Every queue and the thread manager allocate their bulk storage (ring slot
//! arrays, the scalable queue's value storage) through a [`MemoryResource`]
//! rather than calling the global allocator directly. `new` constructors use
//! [`mem_resource::default_resource`]; `with_resource` constructors accept any
//! `Arc<dyn MemoryResource>`.

mod atomic_word;
mod backoff;
mod bits;
mod bitset;
mod config;
mod error;
mod future;
mod invariants;
mod mem_resource;
mod metrics;
mod raw_array;
mod ring;
mod scalable_queue;
mod task;
mod thread_manager;

pub use atomic_word::AtomicWord;
pub use bits::{bit_ceil, bit_floor, bit_width, count_leading_zeros, count_trailing_zeros, popcount, rotate_left, rotate_right};
pub use bitset::CountedBitset;
pub use config::{Config, HIGH_THROUGHPUT_CONFIG, LOW_LATENCY_CONFIG};
pub use error::{QueueError, QueueOverflow, TaskOverflow};
pub use future::Future;
pub use mem_resource::{default_resource, GlobalMemoryResource, MemoryResource};
pub use metrics::{Metrics, MetricsSnapshot};
pub use ring::Ring;
pub use scalable_queue::ScalableCircularQueue;
pub use task::{BoxedTask, DependencyGate};
pub use thread_manager::{partition_range, ThreadManager, UNMANAGED_THREAD_ID};
