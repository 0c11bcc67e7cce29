//! Bulk identity swap: every reference to `old[i]` is redirected to
//! `neu[i]` across the entire live set.
//!
//! The storage of each forwarded object is re-initialised as a forwarding
//! corpse, then the same traversal machinery the collector uses — roots,
//! a linear to-space walk, the class table — rewrites every reference that
//! lands on a corpse.  No allocation happens between corpse installation
//! and the forwarding passes, so the operation can never trigger a
//! collection mid-swap.

use core::ptr;

use smallvec::SmallVec;

use crate::gc::heap::Heap;
use crate::objects::array::Array;
use crate::objects::behavior::{Behavior, ObjectStore};
use crate::objects::heap_object::{is_corpse, ForwardingCorpse, HeapObject};
use crate::objects::tagged::ObjectRef;
use crate::objects::{FIRST_LEGAL_CID, FORWARDING_CORPSE_CID};

/// Resolve one reference through a corpse, if it is one.
fn forward_value(value: ObjectRef) -> ObjectRef {
    // SAFETY: every heap reference reachable here points at a live
    // to-space object; corpses are identified by their class id.
    if value.is_heap_object() && unsafe { is_corpse(value) } {
        let target = unsafe { ForwardingCorpse::at(value.addr()).target() };
        debug_assert!(!unsafe { is_corpse(target) });
        target
    } else {
        value
    }
}

impl Heap {
    /// Atomically redirect every reference to `old[i]` to reach `neu[i]`,
    /// transferring identity hashes.
    ///
    /// Returns `false` — with nothing mutated — when the arrays differ in
    /// length or any operand is an immediate.
    pub fn become_forward(&mut self, old: Array, neu: Array) -> bool {
        // SAFETY: both arrays are live and their elements are valid
        // references; no safepoint occurs anywhere in this operation.
        unsafe {
            if old.len() != neu.len() {
                return false;
            }
            let len = old.len();
            #[cfg(feature = "trace-become")]
            tracing::debug!(target: "heap", len, "become");

            // Screen the pairs before touching anything: a failure must
            // leave the heap exactly as it was.
            let mut pairs: SmallVec<[(ObjectRef, ObjectRef); 8]> = SmallVec::with_capacity(len);
            for i in 0..len {
                let forwarder = old.element(i);
                let forwardee = neu.element(i);
                if forwarder.is_small_integer() || forwardee.is_small_integer() {
                    return false;
                }
                pairs.push((forwarder, forwardee));
            }

            for (forwarder, forwardee) in pairs {
                debug_assert!(!is_corpse(forwarder));
                debug_assert!(!is_corpse(forwardee));

                // The forwardee takes over the forwarder's identity.
                let hash = HeapObject::from_ref(forwarder).identity_hash();
                HeapObject::from_ref(forwardee).set_identity_hash(hash);

                let size = HeapObject::from_ref(forwarder).heap_size();
                ForwardingCorpse::install(forwarder.addr(), size, forwardee);
            }

            self.forward_roots();
            self.forward_to_space(); // with the old class table
            self.forward_class_table();

            self.clear_caches();
            true
        }
    }

    fn forward_roots(&mut self) {
        self.object_store = forward_value(self.object_store);
        self.current_activation = forward_value(self.current_activation);

        for i in 0..self.handles_top {
            let slot = self.handles[i];
            // SAFETY: a registered slot outlives its scope, which is still
            // open, and holds a valid reference.
            unsafe { ptr::write(slot, forward_value(ptr::read(slot))) };
        }
    }

    /// Walk to-space linearly, forwarding every reference slot and class
    /// of every non-corpse object through the installed corpses.
    fn forward_to_space(&mut self) {
        let mut scan = self.to.object_start();
        while scan < self.top {
            let obj = HeapObject::at(scan);
            // SAFETY: the cursor only visits initialised to-space objects.
            unsafe {
                if obj.cid() != FORWARDING_CORPSE_CID {
                    self.forward_class(obj);
                    if let Some((first, limit)) = obj.pointers() {
                        for word in first..limit {
                            obj.set_ref_at(word, forward_value(obj.ref_at(word)));
                        }
                    }
                }
                scan += obj.heap_size();
            }
        }
    }

    /// Patch `obj`'s class id when its class has become a corpse.
    ///
    /// A replacement class that was never registered adopts the corpse's
    /// id on first contact with an instance.
    ///
    /// # Safety
    /// `obj` must be a live, non-corpse to-space object.
    unsafe fn forward_class(&mut self, obj: HeapObject) {
        // SAFETY: per the function contract; the corpse's id slot is
        // beyond the words the corpse installation rewrote.
        unsafe {
            let cid = obj.cid();
            let old_class = self.class_table[cid];
            if !is_corpse(old_class) {
                return;
            }
            let new_class = Behavior::cast(ForwardingCorpse::at(old_class.addr()).target());
            debug_assert!(!is_corpse(new_class.as_object()));
            let nil = ObjectStore::cast(self.object_store).nil_obj();
            if new_class.id() == nil {
                let old_id = HeapObject::at(old_class.addr()).ref_at(Behavior::ID_WORD);
                debug_assert!(old_id.is_small_integer());
                new_class.set_id(old_id);
            }
            obj.set_cid(new_class.id().small_value() as usize);
        }
    }

    /// Rewrite class-table entries whose classes became corpses.
    ///
    /// Distinct from collection-time mourning: an unregistered replacement
    /// adopts the corpse's id and keeps the entry, a replacement already
    /// registered under another id releases it onto the free list.
    fn forward_class_table(&mut self) {
        // SAFETY: the store was forwarded with the roots; nil is live.
        let nil = unsafe { ObjectStore::cast(self.object_store).nil_obj() };
        for cid in FIRST_LEGAL_CID..self.class_table_top {
            let entry = self.class_table[cid];
            if entry.is_small_integer() {
                continue;
            }
            // SAFETY: non-immediate entries are live to-space objects.
            unsafe {
                if !is_corpse(entry) {
                    continue;
                }
                let new_class = Behavior::cast(ForwardingCorpse::at(entry.addr()).target());
                debug_assert!(!is_corpse(new_class.as_object()));

                let old_id = HeapObject::at(entry.addr()).ref_at(Behavior::ID_WORD);
                let new_id = new_class.id();
                debug_assert!(old_id.is_small_integer());
                debug_assert!(new_id.is_small_integer() || new_id == nil);

                if new_id == nil {
                    // Never registered: adopt this id.
                    new_class.set_id(old_id);
                    self.class_table[cid] = new_class.as_object();
                } else if new_id == old_id {
                    self.class_table[cid] = new_class.as_object();
                } else {
                    // Registered under another id; instances were patched
                    // during the to-space pass, so release this one.
                    self.class_table[cid] = ObjectRef::small(self.class_table_free as i64);
                    self.class_table_free = cid;
                }
            }
        }
    }
}
