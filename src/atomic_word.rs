//! A 32-bit cell with atomic load/store plus a blocking `wait`/`notify_one`/`notify_all`
//! triple, the primitive the ring queue and thread manager block and wake threads on.
//!
//! Two backends share one public type: a futex-backed one on Linux, a condvar-backed
//! portable fallback everywhere else. Callers never see the difference.

use std::sync::atomic::{AtomicI32, Ordering};

#[cfg(target_os = "linux")]
mod backend {
    use super::AtomicI32;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    /// Futex-backed wait: blocks the calling thread until the cell's value no longer
    /// equals `expected`, or until woken by a matching `notify_*`.
    ///
    /// Re-checks `expected` itself (the syscall already does, but we also check before
    /// issuing it) so a `store` that lands between the caller's load and this call is
    /// never missed.
    pub fn wait(word: &AtomicI32, expected: i32) {
        loop {
            if word.load(Ordering::Acquire) != expected {
                return;
            }
            let rc = unsafe {
                libc::syscall(
                    libc::SYS_futex,
                    word.as_ptr(),
                    libc::FUTEX_WAIT,
                    expected,
                    std::ptr::null::<libc::timespec>(),
                )
            };
            if rc == 0 || errno() == libc::EAGAIN {
                return;
            }
            if errno() != libc::EINTR {
                return;
            }
        }
    }

    pub fn wait_timeout(word: &AtomicI32, expected: i32, timeout: Duration) -> bool {
        if word.load(Ordering::Acquire) != expected {
            return true;
        }
        let ts = libc::timespec {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_nsec: i64::from(timeout.subsec_nanos()) as libc::c_long,
        };
        let rc = unsafe {
            libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAIT, expected, &ts)
        };
        rc == 0 || errno() == libc::EAGAIN || word.load(Ordering::Acquire) != expected
    }

    pub fn notify_one(word: &AtomicI32) {
        unsafe {
            libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAKE, 1i32);
        }
    }

    pub fn notify_all(word: &AtomicI32) {
        unsafe {
            libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAKE, i32::MAX);
        }
    }

    fn errno() -> i32 {
        std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
    }
}

#[cfg(not(target_os = "linux"))]
mod backend {
    use super::AtomicI32;
    use std::sync::atomic::Ordering;
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;

    // The portable fallback needs somewhere to park the condvar; `AtomicWord` owns one
    // per instance (see the `Portable` variant below). These free functions take it
    // explicitly rather than looking it up, so the futex backend above stays free of it.
    pub fn wait(word: &AtomicI32, expected: i32, lock: &Mutex<()>, cvar: &Condvar) {
        let mut guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        while word.load(Ordering::Acquire) == expected {
            guard = cvar.wait(guard).unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    pub fn wait_timeout(
        word: &AtomicI32,
        expected: i32,
        timeout: Duration,
        lock: &Mutex<()>,
        cvar: &Condvar,
    ) -> bool {
        let mut guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if word.load(Ordering::Acquire) != expected {
            return true;
        }
        loop {
            let (next, result) =
                cvar.wait_timeout(guard, timeout).unwrap_or_else(std::sync::PoisonError::into_inner);
            guard = next;
            if word.load(Ordering::Acquire) != expected {
                return true;
            }
            if result.timed_out() {
                return false;
            }
        }
    }

    pub fn notify_one(_word: &AtomicI32, cvar: &Condvar, lock: &Mutex<()>) {
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        cvar.notify_one();
    }

    pub fn notify_all(_word: &AtomicI32, cvar: &Condvar, lock: &Mutex<()>) {
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        cvar.notify_all();
    }

    // `wait`'s check-then-park is only atomic with respect to a concurrent mutation
    // if that mutation also holds `lock` — the condvar contract is "hold the lock
    // you notify under". `store`/`fetch_add` below thread the same lock through for
    // exactly that reason: without it, a `store` + `notify_all` pair on another
    // thread can land entirely between a waiter's predicate re-check and its next
    // `cvar.wait(guard)` call, and the wakeup is lost for good (there is no futex-
    // style kernel-side "value changed since you last looked" fallback here).
    pub fn store(word: &AtomicI32, value: i32, order: Ordering, lock: &Mutex<()>) {
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        word.store(value, order);
    }

    pub fn fetch_add(word: &AtomicI32, delta: i32, order: Ordering, lock: &Mutex<()>) -> i32 {
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        word.fetch_add(delta, order)
    }
}

/// A 32-bit atomic cell supporting blocking wait/notify alongside ordinary load/store.
///
/// Non-copyable, non-movable once shared: callers hold it behind a reference or an
/// `Arc`, never move it while a waiter might be blocked inside it.
#[derive(Debug)]
pub struct AtomicWord {
    value: AtomicI32,
    #[cfg(not(target_os = "linux"))]
    lock: std::sync::Mutex<()>,
    #[cfg(not(target_os = "linux"))]
    cvar: std::sync::Condvar,
}

impl AtomicWord {
    /// Creates a new cell initialized to `value`.
    #[must_use]
    pub fn new(value: i32) -> Self {
        Self {
            value: AtomicI32::new(value),
            #[cfg(not(target_os = "linux"))]
            lock: std::sync::Mutex::new(()),
            #[cfg(not(target_os = "linux"))]
            cvar: std::sync::Condvar::new(),
        }
    }

    /// Loads the current value with the given memory order.
    #[inline]
    #[must_use]
    pub fn load(&self, order: Ordering) -> i32 {
        self.value.load(order)
    }

    /// Stores `value` with the given memory order.
    ///
    /// On the portable (condvar) backend this acquires the same lock `wait` parks
    /// under, so a concurrent `store` can never land in the gap between a waiter's
    /// predicate check and its next park — see `backend::store`'s doc comment.
    #[inline]
    pub fn store(&self, value: i32, order: Ordering) {
        #[cfg(target_os = "linux")]
        self.value.store(value, order);
        #[cfg(not(target_os = "linux"))]
        backend::store(&self.value, value, order, &self.lock);
    }

    /// Atomically adds `delta`, returning the previous value. Used by callers that
    /// only need "this changed" (a wake generation counter), not a specific value.
    #[inline]
    pub fn fetch_add(&self, delta: i32, order: Ordering) -> i32 {
        #[cfg(target_os = "linux")]
        return self.value.fetch_add(delta, order);
        #[cfg(not(target_os = "linux"))]
        return backend::fetch_add(&self.value, delta, order, &self.lock);
    }

    /// Blocks the calling thread while the cell's value equals `expected`. Returns as
    /// soon as the value changes (spurious wakes are possible and re-check internally
    /// before returning, so callers still need to re-check their own condition).
    pub fn wait(&self, expected: i32) {
        #[cfg(target_os = "linux")]
        backend::wait(&self.value, expected);
        #[cfg(not(target_os = "linux"))]
        backend::wait(&self.value, expected, &self.lock, &self.cvar);
    }

    /// As `wait`, but gives up after `timeout` and returns `false` if the value never
    /// changed (`true` otherwise, including the case where it had already changed
    /// before this call).
    pub fn wait_timeout(&self, expected: i32, timeout: std::time::Duration) -> bool {
        #[cfg(target_os = "linux")]
        return backend::wait_timeout(&self.value, expected, timeout);
        #[cfg(not(target_os = "linux"))]
        return backend::wait_timeout(&self.value, expected, timeout, &self.lock, &self.cvar);
    }

    /// Wakes at most one thread blocked in `wait`/`wait_timeout`.
    pub fn notify_one(&self) {
        #[cfg(target_os = "linux")]
        backend::notify_one(&self.value);
        #[cfg(not(target_os = "linux"))]
        backend::notify_one(&self.value, &self.cvar, &self.lock);
    }

    /// Wakes every thread blocked in `wait`/`wait_timeout`.
    pub fn notify_all(&self) {
        #[cfg(target_os = "linux")]
        backend::notify_all(&self.value);
        #[cfg(not(target_os = "linux"))]
        backend::notify_all(&self.value, &self.cvar, &self.lock);
    }
}
