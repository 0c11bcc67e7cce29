#![no_main]

use libfuzzer_sys::fuzz_target;
use plover_core::gc::heap::Heap;
use plover_core::objects::behavior::{ObjectStore, OBJECT_STORE_SIZE};
use plover_core::objects::tagged::ObjectRef;
use plover_core::objects::{OBJECT_ALIGNMENT, NEW_OBJECT_ALIGNMENT_OFFSET};

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
    // Each pair of bytes encodes one allocation request:
    //   byte[0]: kind selector
    //   byte[1]: element count
    // Unrooted allocations die at the next collection; the target checks
    // the allocator invariants, not liveness.
    if data.len() < 2 {
        return;
    }

    let mut heap = bootstrapped_heap();
    let mut chunk = data;
    let mut alloc_count = 0usize;

    while chunk.len() >= 2 {
        let kind = chunk[0];
        let len = chunk[1] as usize;
        chunk = &chunk[2..];

        let obj = match kind % 6 {
            0 => heap.allocate_byte_array(len * 4).as_object(),
            1 => heap.allocate_byte_string(len).as_object(),
            2 => heap.allocate_array(len).as_object(),
            3 => heap.allocate_weak_array(len).as_object(),
            4 => heap.allocate_float64().as_object(),
            _ => heap.allocate_medium_integer().as_object(),
        };
        // Arrays come back uninitialised; make their slots valid before
        // the next safepoint so a forced collection can trace them.
        // SAFETY: obj is live and just allocated with `len` elements.
        unsafe {
            match kind % 6 {
                2 => {
                    let array = plover_core::objects::array::Array::cast(obj);
                    for i in 0..len {
                        array.set_element(i, ObjectRef::small(i as i64));
                    }
                }
                3 => {
                    let weak = plover_core::objects::array::WeakArray::cast(obj);
                    for i in 0..len {
                        weak.set_element(i, ObjectRef::small(i as i64));
                    }
                }
                _ => {}
            }
        }

        assert!(obj.is_heap_object());
        assert_eq!(
            obj.addr() & (OBJECT_ALIGNMENT - 1),
            NEW_OBJECT_ALIGNMENT_OFFSET,
            "allocations must land on the new-object alignment offset"
        );
        alloc_count += 1;

        // Every 32 allocations force a collection to exercise the copy
        // path alongside the bump path.
        if alloc_count % 32 == 0 {
            heap.scavenge("fuzz");
            assert!(heap.used() <= heap.capacity());
        }
    }

    // Final collection: only the bootstrap set survives.
    heap.scavenge("fuzz-final");
    assert!(heap.used() <= heap.capacity());
});
