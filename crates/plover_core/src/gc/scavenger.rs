//! The copying collector: a Cheney scan over the semispace pair with a
//! class-table pass, an ephemeron fixpoint, and weak-pointer mourning.
//!
//! # Phases
//!
//! 1. **Flip** — the spaces swap roles; the new to-space is resized to
//!    match after a growth.
//! 2. **Strong roots** — the object store, the current activation, and
//!    every pinned handle slot are scavenged.
//! 3. **Cheney scan** — a cursor walks to-space address-ascending.  Every
//!    object first keeps its class alive, then has its reference slots
//!    scavenged — except weak arrays and ephemerons, which are deferred to
//!    their work lists untraced.  After each scan round the ephemeron list
//!    is processed; ephemerons whose keys are now known reachable release
//!    their value and finalizer into the scan.  The loop closes when the
//!    cursor reaches the allocation point and ephemeron processing created
//!    no new grey objects.
//! 4. **Mourning** — ephemerons still on the list have unreachable keys
//!    and are nilled (their finalizers pass through the finalizer queue);
//!    weak-array slots are rewritten to forwarded addresses or `nil`; dead
//!    class-table entries are linked into the free-cid list.
//! 5. **Cache clearing** and, in debug builds, poisoning and protecting
//!    the vacated from-space.

use core::ptr;

use crate::gc::heap::Heap;
use crate::gc::memory::Semispace;
use crate::objects::array::WeakArray;
use crate::objects::behavior::ObjectStore;
use crate::objects::ephemeron::Ephemeron;
use crate::objects::heap_object::{forwarding_target, is_forwarded, set_forwarded, HeapObject};
use crate::objects::tagged::ObjectRef;
use crate::objects::{EPHEMERON_CID, FIRST_LEGAL_CID, WEAK_ARRAY_CID};

impl Heap {
    /// Run a full collection.  `reason` labels the cycle in diagnostics.
    pub fn scavenge(&mut self, reason: &str) {
        #[cfg(feature = "report-gc")]
        let (start, size_before) = (std::time::Instant::now(), self.used());
        #[cfg(not(feature = "report-gc"))]
        let _ = reason;

        debug_assert!(self.ephemeron_list.is_empty());
        debug_assert!(self.weak_list.is_empty());

        self.flip_spaces();
        #[cfg(debug_assertions)]
        self.to.read_write();

        // Strong references.
        self.scavenge_roots();
        let mut scan = self.to.object_start();
        while scan < self.top {
            scan = self.scavenge_to_space(scan);
            self.process_ephemeron_list();
        }

        // Weak references.
        self.mourn_ephemeron_list();
        self.mourn_weak_list();
        self.mourn_class_table();

        self.clear_caches();

        #[cfg(debug_assertions)]
        {
            self.from.mark_unallocated();
            self.from.no_access();
        }

        #[cfg(feature = "report-gc")]
        tracing::info!(
            target: "heap",
            reason,
            used = self.used(),
            freed = size_before.saturating_sub(self.used()),
            duration_us = start.elapsed().as_micros() as u64,
            "scavenge"
        );

        if self.used() > 7 * self.to.size() / 8 {
            // Grow before the capacity is actually reached; collections
            // near the ceiling free too little to be worth their cost.
            self.grow(self.to.size(), "early growth heuristic");
        }
    }

    fn flip_spaces(&mut self) {
        core::mem::swap(&mut self.to, &mut self.from);
        if self.to.size() < self.from.size() {
            // First collection after a growth: match the other space.
            self.to = Semispace::new(self.from.size()).expect("semispace mapping");
        }
        self.top = self.to.object_start();
        self.end = self.to.limit();
    }

    fn scavenge_roots(&mut self) {
        let store = self.object_store;
        self.object_store = self.scavenge_value(store);
        let activation = self.current_activation;
        self.current_activation = self.scavenge_value(activation);

        for i in 0..self.handles_top {
            let slot = self.handles[i];
            // SAFETY: a registered slot outlives its scope, which is still
            // open, and holds a valid reference.
            unsafe {
                let updated = self.scavenge_value(ptr::read(slot));
                ptr::write(slot, updated);
            }
        }
    }

    /// Cheney scan: walk to-space from `scan` to the allocation point.
    fn scavenge_to_space(&mut self, mut scan: usize) -> usize {
        while scan < self.top {
            let obj = HeapObject::at(scan);
            // SAFETY: the cursor only visits initialised to-space objects.
            unsafe {
                let cid = obj.cid();
                self.scavenge_class(cid);
                if cid == WEAK_ARRAY_CID {
                    self.weak_list.push(obj.as_ref());
                } else if cid == EPHEMERON_CID {
                    self.ephemeron_list.push(obj.as_ref());
                } else if let Some((first, limit)) = obj.pointers() {
                    for word in first..limit {
                        let updated = self.scavenge_value(obj.ref_at(word));
                        obj.set_ref_at(word, updated);
                    }
                }
                scan += obj.heap_size();
            }
        }
        scan
    }

    /// Scavenge one reference: immediates and non-semispace objects pass
    /// through, forwarded objects resolve to their copy, and everything
    /// else is copied to to-space with a forwarding header left behind.
    pub(crate) fn scavenge_value(&mut self, value: ObjectRef) -> ObjectRef {
        if value.is_immediate_or_old() {
            // Target is not going to move.
            return value;
        }

        let old_addr = value.addr();
        debug_assert!(self.from.contains(old_addr));

        // SAFETY: old_addr is an initialised from-space object.
        unsafe {
            if is_forwarded(old_addr) {
                forwarding_target(old_addr)
            } else {
                // Target is now known reachable; move it to to-space.
                let size = HeapObject::at(old_addr).heap_size();
                let new_addr = self.try_allocate(size);
                debug_assert!(new_addr != 0, "to-space must hold every survivor");
                ptr::copy_nonoverlapping(old_addr as *const u8, new_addr as *mut u8, size);
                set_forwarded(old_addr, new_addr);
                ObjectRef::from_addr(new_addr)
            }
        }
    }

    /// Keep the class of a scanned object alive.
    ///
    /// Very similar to [`scavenge_value`][Self::scavenge_value], but the
    /// table entry itself is left pointing at the corpse; the entry is
    /// rewritten wholesale by [`mourn_class_table`][Self::mourn_class_table].
    fn scavenge_class(&mut self, cid: usize) {
        debug_assert!(cid < self.class_table_top);
        let entry = self.class_table[cid];
        if entry.is_immediate_or_old() {
            return;
        }
        let old_addr = entry.addr();
        debug_assert!(self.from.contains(old_addr));
        // SAFETY: old_addr is an initialised from-space object.
        unsafe {
            if is_forwarded(old_addr) {
                return;
            }
            let size = HeapObject::at(old_addr).heap_size();
            let new_addr = self.try_allocate(size);
            debug_assert!(new_addr != 0, "to-space must hold every survivor");
            ptr::copy_nonoverlapping(old_addr as *const u8, new_addr as *mut u8, size);
            set_forwarded(old_addr, new_addr);
        }
    }

    /// One round of the ephemeron fixpoint.
    ///
    /// Ephemerons whose keys are known reachable scavenge their slots —
    /// possibly creating new grey objects for the outer scan — while the
    /// undecided remainder is re-queued.
    fn process_ephemeron_list(&mut self) {
        let survivors = core::mem::take(&mut self.ephemeron_list);
        for survivor in survivors {
            // SAFETY: the list holds to-space ephemerons of this cycle;
            // to-space objects do not move within a cycle.
            unsafe {
                let ephemeron = Ephemeron::cast(survivor);
                let key = ephemeron.key();
                if key.is_immediate_or_old() || is_forwarded(key.addr()) {
                    let key = self.scavenge_value(ephemeron.key());
                    ephemeron.set_key(key);
                    let value = self.scavenge_value(ephemeron.value());
                    ephemeron.set_value(value);
                    let finalizer = self.scavenge_value(ephemeron.finalizer());
                    ephemeron.set_finalizer(finalizer);
                } else {
                    // Fate of the key is not yet known; requeue.
                    self.ephemeron_list.push(survivor);
                }
            }
        }
    }

    /// Ephemerons that survived the fixpoint with unreachable keys lose
    /// all three slots; the finalizer passes through the queue first.
    fn mourn_ephemeron_list(&mut self) {
        // SAFETY: the store was scavenged with the roots; nil is live.
        let nil = unsafe { ObjectStore::cast(self.object_store).nil_obj() };
        let survivors = core::mem::take(&mut self.ephemeron_list);
        for survivor in survivors {
            // SAFETY: the list holds to-space ephemerons of this cycle.
            unsafe {
                let ephemeron = Ephemeron::cast(survivor);
                self.finalizers.enqueue(ephemeron.finalizer());
                ephemeron.set_key(nil);
                ephemeron.set_value(nil);
                ephemeron.set_finalizer(nil);
            }
        }
    }

    fn mourn_weak_list(&mut self) {
        let survivors = core::mem::take(&mut self.weak_list);
        for survivor in survivors {
            // SAFETY: the list holds to-space weak arrays of this cycle.
            unsafe {
                let weak = WeakArray::cast(survivor);
                for i in 0..weak.len() {
                    let updated = self.mourn_weak_value(weak.element(i));
                    weak.set_element(i, updated);
                }
            }
        }
    }

    fn mourn_weak_value(&mut self, value: ObjectRef) -> ObjectRef {
        if value.is_immediate_or_old() {
            // Target is not going to move.
            return value;
        }
        let old_addr = value.addr();
        debug_assert!(self.from.contains(old_addr));
        // SAFETY: old_addr is an initialised from-space object; the store
        // and nil were scavenged with the roots.
        unsafe {
            if is_forwarded(old_addr) {
                forwarding_target(old_addr)
            } else {
                ObjectStore::cast(self.object_store).nil_obj()
            }
        }
    }

    /// Rewrite class-table entries after the copy: forwarded classes are
    /// updated in place, dead ones release their cid onto the free list.
    fn mourn_class_table(&mut self) {
        for cid in FIRST_LEGAL_CID..self.class_table_top {
            let entry = self.class_table[cid];
            if entry.is_immediate_or_old() {
                continue;
            }
            let old_addr = entry.addr();
            debug_assert!(self.from.contains(old_addr));
            // SAFETY: old_addr is an initialised from-space object.
            self.class_table[cid] = unsafe {
                if is_forwarded(old_addr) {
                    forwarding_target(old_addr)
                } else {
                    let link = ObjectRef::small(self.class_table_free as i64);
                    self.class_table_free = cid;
                    link
                }
            };
        }
    }

    /// Drop everything that caches heap addresses.
    pub(crate) fn clear_caches(&mut self) {
        #[cfg(feature = "lookup-cache")]
        self.lookup_cache.clear();
        #[cfg(feature = "recycle-activations")]
        {
            self.recycle_list = ObjectRef::small(0);
        }
    }
}
