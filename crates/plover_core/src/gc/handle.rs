//! Scoped root pinning.
//!
//! A [`HandleScope`] registers one `*mut ObjectRef` slot with the heap for
//! its lifetime.  Every collection visits the slot as a root and rewrites
//! it when the referent moves, so the caller re-reads the slot instead of
//! keeping raw addresses across safepoints.  Scopes are strictly LIFO:
//! construction pushes, drop pops, and the fixed-capacity stack makes
//! overflow fatal.

use crate::gc::heap::Heap;
use crate::objects::tagged::ObjectRef;

/// Pins one reference slot as a collection root for the scope's lifetime.
pub struct HandleScope {
    /// Back-pointer for the drop-time pop.  A raw pointer keeps the scope
    /// an ordinary owned value; the validity invariant is documented on
    /// [`new`][HandleScope::new].
    heap: *mut Heap,
}

impl HandleScope {
    /// Register `slot` with `heap` until the returned scope is dropped.
    ///
    /// Panics when the handle stack is full.
    ///
    /// # Safety
    /// - `slot` must outlive the scope and hold a valid reference whenever
    ///   the heap reaches a safepoint.
    /// - `heap` must not move or be dropped while the scope is alive.
    /// - Scopes must be dropped in reverse creation order.
    pub unsafe fn new(heap: &mut Heap, slot: *mut ObjectRef) -> Self {
        heap.push_handle(slot);
        HandleScope { heap }
    }
}

impl Drop for HandleScope {
    fn drop(&mut self) {
        // SAFETY: `heap` is valid for the scope's lifetime per the
        // contract of `new`.
        unsafe { (*self.heap).pop_handle() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::heap::{Heap, HANDLES_CAPACITY};

    #[test]
    fn scope_registers_and_unregisters() {
        let mut heap = Heap::with_capacity(64 * 1024);
        let mut slot = ObjectRef::small(1);
        {
            // SAFETY: slot and heap outlive the scope.
            let _scope = unsafe { HandleScope::new(&mut heap, &mut slot) };
            assert_eq!(heap.handles_top, 1);
        }
        assert_eq!(heap.handles_top, 0, "drop must pop the slot");
    }

    #[test]
    fn nested_scopes_pop_in_reverse_order() {
        let mut heap = Heap::with_capacity(64 * 1024);
        let mut a = ObjectRef::small(1);
        let mut b = ObjectRef::small(2);
        // SAFETY: both slots and the heap outlive their scopes.
        let outer = unsafe { HandleScope::new(&mut heap, &mut a) };
        {
            let _inner = unsafe { HandleScope::new(&mut heap, &mut b) };
            assert_eq!(heap.handles_top, 2);
        }
        assert_eq!(heap.handles_top, 1);
        drop(outer);
        assert_eq!(heap.handles_top, 0);
    }

    #[test]
    #[should_panic(expected = "handle stack overflow")]
    fn exceeding_capacity_is_fatal() {
        let mut heap = Heap::with_capacity(64 * 1024);
        let mut slots = [ObjectRef::small(0); HANDLES_CAPACITY + 1];
        let mut scopes = Vec::new();
        for slot in slots.iter_mut() {
            // SAFETY: the slots array and heap outlive every scope.
            scopes.push(unsafe { HandleScope::new(&mut heap, slot) });
        }
    }
}
