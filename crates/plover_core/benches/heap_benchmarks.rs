//! Criterion benchmarks for core heap operations.
//!
//! Run with: `cargo bench --package plover_core`

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use plover_core::gc::handle::HandleScope;
use plover_core::gc::heap::Heap;
use plover_core::objects::behavior::{ObjectStore, OBJECT_STORE_SIZE};
use plover_core::objects::tagged::ObjectRef;
use plover_core::objects::FIRST_REGULAR_OBJECT_CID;

const BURST_ALLOC_COUNT: usize = 1000;

/// A heap with an initialised object store, ready to collect.
fn bootstrapped_heap(capacity: usize) -> Heap {
    let mut heap = Heap::with_capacity(capacity);
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

// ---------------------------------------------------------------------------
// Object allocation throughput
// ---------------------------------------------------------------------------

fn bench_allocate_byte_array(c: &mut Criterion) {
    c.bench_function("heap_allocate_byte_array_64", |b| {
        // The heap lives across iterations to measure steady-state bump
        // allocation; exhaustion rolls over into a collection naturally.
        let mut heap = bootstrapped_heap(8 * 1024 * 1024);
        b.iter(|| {
            let arr = heap.allocate_byte_array(black_box(64));
            black_box(arr.as_object().raw());
        });
    });
}

fn bench_allocate_burst(c: &mut Criterion) {
    c.bench_function("heap_allocate_burst_1000", |b| {
        b.iter(|| {
            let mut heap = bootstrapped_heap(8 * 1024 * 1024);
            for _ in 0..BURST_ALLOC_COUNT {
                let obj = heap.allocate_regular_object(FIRST_REGULAR_OBJECT_CID, 0);
                black_box(obj.raw());
            }
        });
    });
}

// ---------------------------------------------------------------------------
// Tagged reference operations
// ---------------------------------------------------------------------------

fn bench_tagged_small_round_trip(c: &mut Criterion) {
    c.bench_function("tagged_small_round_trip", |b| {
        b.iter(|| {
            let r = ObjectRef::small(black_box(42));
            black_box(r.is_small_integer());
            black_box(r.small_value());
        });
    });
}

// ---------------------------------------------------------------------------
// Collection cost
// ---------------------------------------------------------------------------

fn bench_scavenge_small_live_set(c: &mut Criterion) {
    c.bench_function("scavenge_64_live_objects", |b| {
        let mut heap = bootstrapped_heap(8 * 1024 * 1024);
        // A rooted array keeping 64 byte arrays alive across every cycle.
        let mut keep = heap.allocate_array(64).as_object();
        // SAFETY: keep is live; elements initialised before collection.
        unsafe {
            use plover_core::objects::array::Array;
            for i in 0..64 {
                let element = heap.allocate_byte_array(32);
                Array::cast(keep).set_element(i, element.as_object());
            }
        }
        let _scope = unsafe { HandleScope::new(&mut heap, &mut keep) };
        b.iter(|| {
            heap.scavenge(black_box("bench"));
            black_box(heap.used());
        });
    });
}

criterion_group!(
    benches,
    bench_allocate_byte_array,
    bench_allocate_burst,
    bench_tagged_small_round_trip,
    bench_scavenge_small_live_set
);
criterion_main!(benches);
