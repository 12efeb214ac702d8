//! A fixed-length array allocated through a [`MemoryResource`] instead of the global
//! allocator, so the ring and the scalable queue never call `Vec`/`Box` directly for
//! their hot-path storage — only this one module does, and only by way of the
//! pluggable resource.
//!
//! Restricted to the two element types the rest of the crate actually backs with it
//! (`AtomicU64` slots, `MaybeUninit<T>` storage cells): both have no-op drop glue, so
//! `Drop` here only ever needs to release the backing memory, never run element
//! destructors. A `RawArray` of a type with real drop glue would leak; this type stays
//! `pub(crate)` so that constraint never leaks past this crate's own call sites.

use crate::mem_resource::MemoryResource;
use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::Arc;

pub(crate) struct RawArray<T> {
    ptr: NonNull<T>,
    len: usize,
    resource: Arc<dyn MemoryResource>,
}

unsafe impl<T: Send> Send for RawArray<T> {}
unsafe impl<T: Send> Sync for RawArray<T> {}

impl<T> RawArray<T> {
    /// Allocates room for `len` elements of `T` via `resource` and initializes each
    /// with `init(index)`.
    ///
    /// # Panics
    ///
    /// Panics if `len` is 0, if the layout overflows `isize`, or if the resource
    /// fails to allocate — allocation failure is a propagated error per the core's
    /// error-handling policy, not a value the caller can recover from here.
    pub fn new(len: usize, resource: Arc<dyn MemoryResource>, mut init: impl FnMut(usize) -> T) -> Self {
        assert!(len > 0, "RawArray must hold at least one element");
        let layout = Layout::array::<T>(len).expect("array layout overflow");
        let ptr = resource
            .allocate(layout.size(), layout.align())
            .expect("memory resource allocation failed")
            .cast::<T>();
        for i in 0..len {
            // SAFETY: `ptr` points to `len` uninitialized, properly aligned `T` slots;
            // each index is written exactly once before any read of it.
            unsafe {
                ptr.as_ptr().add(i).write(init(i));
            }
        }
        Self { ptr, len, resource }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Raw pointer to the first element, for callers that need placement writes or
    /// `MaybeUninit` manipulation `Index` can't express.
    #[inline]
    pub fn as_mut_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }
}

impl<T> std::ops::Index<usize> for RawArray<T> {
    type Output = T;

    #[inline]
    fn index(&self, i: usize) -> &T {
        debug_assert!(i < self.len, "index {i} out of bounds for RawArray of length {}", self.len);
        // SAFETY: `i < self.len` is checked above (debug builds) and the array was
        // fully initialized in `new`.
        unsafe { &*self.ptr.as_ptr().add(i) }
    }
}

impl<T> Drop for RawArray<T> {
    fn drop(&mut self) {
        let layout = Layout::array::<T>(self.len).expect("array layout overflow");
        // SAFETY: `ptr` was obtained from `resource.allocate` with this exact layout
        // and has not been freed before. Any live `T` payload behind it (e.g. a
        // scalable queue's still-populated storage cells) is the owning struct's
        // responsibility to drop first — see `ScalableCircularQueue::drop`.
        unsafe {
            self.resource.deallocate(self.ptr.cast::<u8>(), layout.size(), layout.align());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem_resource::GlobalMemoryResource;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_new_and_index() {
        let arr = RawArray::new(8, Arc::new(GlobalMemoryResource), |i| AtomicU64::new(i as u64));
        for i in 0..8 {
            assert_eq!(arr[i].load(Ordering::Relaxed), i as u64);
        }
    }

    #[test]
    fn test_mut_ptr_allows_placement_write() {
        let arr: RawArray<u64> = RawArray::new(4, Arc::new(GlobalMemoryResource), |_| 0);
        unsafe {
            arr.as_mut_ptr().add(2).write(42);
        }
        assert_eq!(arr[2], 42);
    }
}
