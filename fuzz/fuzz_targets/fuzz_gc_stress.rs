#![no_main]

use libfuzzer_sys::fuzz_target;
use plover_core::gc::handle::HandleScope;
use plover_core::gc::heap::Heap;
use plover_core::objects::array::Array;
use plover_core::objects::behavior::{ObjectStore, OBJECT_STORE_SIZE};
use plover_core::objects::ephemeron::Ephemeron;
use plover_core::objects::heap_object::HeapObject;
use plover_core::objects::tagged::ObjectRef;
use plover_core::objects::EPHEMERON_CID;

fn bootstrapped_heap() -> Heap {
    let mut heap = Heap::with_capacity(256 * 1024);
    let store = heap.allocate_array(OBJECT_STORE_SIZE);
    // SAFETY: freshly allocated; initialised before any safepoint.
    unsafe {
        for i in 0..OBJECT_STORE_SIZE {
            store.set_element(i, ObjectRef::small(0));
        }
    }
    heap.initialize_root(store.as_object());
    let nil_cid = heap.allocate_class_id().expect("fresh table has room");
    let nil = heap.allocate_regular_object(nil_cid, 0);
    // SAFETY: the store is live; no safepoint since the fetch.
    unsafe {
        let store = ObjectStore::cast(heap.object_store());
        store.set_nil_obj(nil);
        store.set_false_obj(nil);
        store.set_true_obj(nil);
        store.set_message_class(nil);
    }
    heap
}

fuzz_target!(|data: &[u8]| {
    // A rooted array of 8 slots plus a command stream mutating it:
    //   0: store a fresh byte array into slot b
    //   1: store a fresh weak array referencing slot b into slot b^1
    //   2: store an ephemeron keyed by slot b into slot b^1
    //   3: alias slot b into slot b^1
    //   4: clear slot b
    //   5: collect
    // After every step all rooted slots must be immediates or to-space
    // references.
    const SLOTS: usize = 8;

    let mut heap = bootstrapped_heap();
    let nil = {
        // SAFETY: the store is a pinned, initialised root.
        unsafe { ObjectStore::cast(heap.object_store()).nil_obj() }
    };
    let mut keep = heap.allocate_array(SLOTS).as_object();
    // SAFETY: keep is live; initialised before any safepoint.
    unsafe {
        for i in 0..SLOTS {
            Array::cast(keep).set_element(i, nil);
        }
    }
    let _scope = unsafe { HandleScope::new(&mut heap, &mut keep) };

    for pair in data.chunks_exact(2) {
        let op = pair[0] % 6;
        let slot = (pair[1] as usize) % SLOTS;
        let other = slot ^ 1;

        match op {
            0 => {
                let fresh = heap.allocate_byte_array(pair[1] as usize % 64);
                // SAFETY: keep was updated at every collection; fresh is
                // live.
                unsafe { Array::cast(keep).set_element(slot, fresh.as_object()) };
            }
            1 => {
                let weak = heap.allocate_weak_array(1);
                // SAFETY: keep and weak are live.
                unsafe {
                    let referent = Array::cast(keep).element(slot);
                    weak.set_element(0, referent);
                    Array::cast(keep).set_element(other, weak.as_object());
                }
            }
            2 => {
                let e = heap.allocate_regular_object(EPHEMERON_CID, Ephemeron::NUM_SLOTS);
                // SAFETY: keep and e are live.
                unsafe {
                    let e = Ephemeron::cast(e);
                    let key = Array::cast(keep).element(slot);
                    e.set_key(key);
                    e.set_value(Array::cast(keep).element(other));
                    e.set_finalizer(ObjectRef::small(0));
                    Array::cast(keep).set_element(other, e.as_object());
                }
            }
            3 => {
                // SAFETY: keep is live.
                unsafe {
                    let aliased = Array::cast(keep).element(slot);
                    Array::cast(keep).set_element(other, aliased);
                }
            }
            4 => {
                // SAFETY: keep is live; the store's nil is too.
                unsafe {
                    let nil = ObjectStore::cast(heap.object_store()).nil_obj();
                    Array::cast(keep).set_element(slot, nil);
                }
            }
            _ => heap.scavenge("fuzz"),
        }

        // SAFETY: keep is live; every slot holds a valid reference.
        unsafe {
            for i in 0..SLOTS {
                let v = Array::cast(keep).element(i);
                assert!(
                    v.is_small_integer() || v.is_new_object(),
                    "rooted slots must never point outside the active space"
                );
                if v.is_new_object() {
                    // A live header is readable and carries a sane size.
                    assert!(HeapObject::from_ref(v).heap_size() > 0);
                }
            }
        }
    }
});
