//! The memory-resource contract the core consumes but never implements a platform
//! allocator for itself — the core only ever calls into one of these.

use std::alloc::{self, Layout};
use std::any::TypeId;
use std::ptr::NonNull;
use std::sync::Arc;

/// An abstraction over allocators: `allocate` / `deallocate` / `is_equal`.
///
/// Two resources are equal iff memory allocated by one may be deallocated by the
/// other. The core never calls the platform allocator directly; every queue and
/// the thread manager take a `&dyn MemoryResource` (or a default one) at construction.
pub trait MemoryResource: 'static {
    /// Returns memory aligned to `alignment` (a power of two ≥ 1) and at least `bytes`
    /// in size, or `None` on allocation failure.
    fn allocate(&self, bytes: usize, alignment: usize) -> Option<NonNull<u8>>;

    /// Releases memory previously returned by `allocate` with the same arguments.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by a prior call to `self.allocate(bytes, alignment)`
    /// (or an equal resource's, per `is_equal`), and must not have been deallocated
    /// already.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, alignment: usize);

    /// Identity test: memory allocated by `self` may be deallocated by `other` iff this
    /// returns `true`.
    fn is_equal(&self, other: &dyn MemoryResource) -> bool;

    /// Object-safe stand-in for `TypeId::of::<Self>()`, used by the default
    /// same-type `is_equal` most resources want. Trait objects can't call the
    /// associated-function form directly, so each impl reports its own type id here;
    /// the default body resolves `Self` to the concrete implementing type at each
    /// impl site, so it never needs to be overridden by hand.
    fn resource_type_id(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// The default memory resource: the global allocator (`std::alloc::System`-equivalent,
/// whatever `#[global_allocator]` the binary configures).
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalMemoryResource;

impl MemoryResource for GlobalMemoryResource {
    fn allocate(&self, bytes: usize, alignment: usize) -> Option<NonNull<u8>> {
        if bytes == 0 {
            return NonNull::new(alignment as *mut u8);
        }
        let layout = Layout::from_size_align(bytes, alignment).ok()?;
        // SAFETY: layout has non-zero size, checked above.
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, alignment: usize) {
        if bytes == 0 {
            return;
        }
        let layout = Layout::from_size_align_unchecked(bytes, alignment);
        alloc::dealloc(ptr.as_ptr(), layout);
    }

    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        // All global-resource instances are zero-sized and interchangeable: any memory
        // one returns can be freed through another, since they all forward to the same
        // process-wide allocator.
        other.resource_type_id() == self.resource_type_id()
    }
}

/// The resource every queue and the thread manager fall back to when the caller
/// doesn't supply one explicitly.
#[must_use]
pub fn default_resource() -> Arc<dyn MemoryResource> {
    Arc::new(GlobalMemoryResource)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_resource_roundtrip() {
        let res = GlobalMemoryResource;
        let ptr = res.allocate(64, 8).expect("allocation should succeed");
        unsafe {
            res.deallocate(ptr, 64, 8);
        }
    }

    #[test]
    fn test_zero_sized_allocation() {
        let res = GlobalMemoryResource;
        let ptr = res.allocate(0, 8).expect("zero-size allocation returns a dangling ptr");
        unsafe {
            res.deallocate(ptr, 0, 8);
        }
    }

    #[test]
    fn test_is_equal_same_type() {
        let a = GlobalMemoryResource;
        let b = GlobalMemoryResource;
        assert!(a.is_equal(&b));
    }
}
