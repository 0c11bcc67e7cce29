//! The managed heap: bump allocation over a semispace pair, typed
//! allocation entry points, the class table, and the pinned roots.
//!
//! One heap exists per isolate and owns everything the collector touches:
//! the two semispaces, the class table, the handle stack, and the
//! collection-time work lists.  Every call that can allocate is a potential
//! safepoint — any raw reference held across one is stale unless it is
//! pinned in a handle or stored in a traced slot.

use core::ptr;

use crate::error::{HeapError, HeapResult};
use crate::gc::memory::{Semispace, OS_PAGE_SIZE};
#[cfg(feature = "lookup-cache")]
use crate::cache::LookupCache;
use crate::objects::array::{
    Array, ByteArray, WeakArray, ARRAY_ELEMENTS_OFFSET, ARRAY_SIZE_OFFSET, BYTE_ARRAY_DATA_OFFSET,
};
use crate::objects::behavior::{Behavior, Message, ObjectStore, MESSAGE_NUM_SLOTS};
use crate::objects::frame::{
    Activation, Closure, ACTIVATION_TOTAL_WORDS, CLOSURE_FIXED_WORDS, CLOSURE_NUM_COPIED_OFFSET,
};
use crate::objects::heap_object::{initialize_object, HeapObject, IDENTITY_HASH_BITS,
    MAX_ENCODED_HEAP_SIZE};
use crate::objects::number::{
    Float64, LargeInteger, MediumInteger, LARGE_INTEGER_CAPACITY_OFFSET,
    LARGE_INTEGER_DIGITS_OFFSET,
};
use crate::objects::string::{
    ByteString, WideString, BYTE_STRING_DATA_OFFSET, STRING_HASH_OFFSET, STRING_SIZE_OFFSET,
    WIDE_STRING_DATA_OFFSET,
};
use crate::objects::tagged::ObjectRef;
use crate::objects::{
    allocation_size, ACTIVATION_CID, ARRAY_CID, BYTE_ARRAY_CID, BYTE_STRING_CID, CLOSURE_CID,
    EPHEMERON_CID, FIRST_REGULAR_OBJECT_CID, FLOAT64_CID, ILLEGAL_CID, LARGE_INTEGER_CID,
    MEDIUM_INTEGER_CID, OBJECT_ALIGNMENT, OBJECT_ALIGNMENT_MASK, WEAK_ARRAY_CID, WIDE_STRING_CID,
    WORD_SIZE,
};

#[cfg(debug_assertions)]
use crate::gc::memory::UNINITIALIZED_BYTE;
#[cfg(debug_assertions)]
use crate::objects::NEW_OBJECT_ALIGNMENT_OFFSET;

const MB: usize = 1024 * 1024;

/// Capacity of each semispace in a freshly created heap.
pub const INITIAL_SEMISPACE_CAPACITY: usize = WORD_SIZE * MB;
/// Hard ceiling on semispace capacity; growth past this is fatal.
pub const MAX_SEMISPACE_CAPACITY: usize = 16 * WORD_SIZE * MB;

/// Entry capacity of the class table.  The table never grows; ids are
/// recycled when classes die.
pub const CLASS_TABLE_CAPACITY: usize = 1024;

/// Slots in the pinned-handle stack.
pub const HANDLES_CAPACITY: usize = 8;

/// Receives the finalizers of mourned ephemerons.
///
/// The default implementation drops them; wiring a real event-loop queue
/// is a known integration gap.  The reference handed to `enqueue` points
/// at unscavenged from-space memory and must not be retained past the
/// collection that produced it.
pub trait FinalizerQueue {
    /// Called once per mourned ephemeron, before its slots are nilled.
    fn enqueue(&mut self, finalizer: ObjectRef);
}

/// The default [`FinalizerQueue`]: discards every entry.
pub struct DropFinalizers;

impl FinalizerQueue for DropFinalizers {
    fn enqueue(&mut self, _finalizer: ObjectRef) {}
}

/// The managed heap of one isolate.
pub struct Heap {
    pub(crate) top: usize,
    pub(crate) end: usize,
    pub(crate) to: Semispace,
    pub(crate) from: Semispace,

    pub(crate) class_table: Vec<ObjectRef>,
    pub(crate) class_table_top: usize,
    pub(crate) class_table_free: usize,

    pub(crate) object_store: ObjectRef,
    pub(crate) current_activation: ObjectRef,

    pub(crate) handles: [*mut ObjectRef; HANDLES_CAPACITY],
    pub(crate) handles_top: usize,

    pub(crate) ephemeron_list: Vec<ObjectRef>,
    pub(crate) weak_list: Vec<ObjectRef>,

    #[cfg(feature = "recycle-activations")]
    pub(crate) recycle_list: ObjectRef,
    #[cfg(feature = "lookup-cache")]
    pub(crate) lookup_cache: LookupCache,

    pub(crate) finalizers: Box<dyn FinalizerQueue>,

    identity_hash_state: u64,
}

// SAFETY: the heap is a single-mutator structure; the raw handle slots it
// stores are only dereferenced while the owning scope (and therefore the
// slot) is alive, on the same thread that drives the heap.
unsafe impl Send for Heap {}

impl Heap {
    /// Create a heap with the default initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_SEMISPACE_CAPACITY)
    }

    /// Create a heap whose semispaces hold `capacity` bytes each,
    /// page-rounded.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.next_multiple_of(OS_PAGE_SIZE).max(OS_PAGE_SIZE);
        let to = Semispace::new(capacity).expect("initial semispace mapping");
        let from = Semispace::new(capacity).expect("initial semispace mapping");
        let top = to.object_start();
        let end = to.limit();
        Heap {
            top,
            end,
            to,
            from,
            class_table: vec![ObjectRef::small(0); CLASS_TABLE_CAPACITY],
            class_table_top: FIRST_REGULAR_OBJECT_CID,
            class_table_free: 0,
            object_store: ObjectRef::small(0),
            current_activation: ObjectRef::small(0),
            handles: [ptr::null_mut(); HANDLES_CAPACITY],
            handles_top: 0,
            ephemeron_list: Vec::new(),
            weak_list: Vec::new(),
            #[cfg(feature = "recycle-activations")]
            recycle_list: ObjectRef::small(0),
            #[cfg(feature = "lookup-cache")]
            lookup_cache: LookupCache::new(),
            finalizers: Box::new(DropFinalizers),
            identity_hash_state: 0x5dee_ce66_d154_21a5,
        }
    }

    // ── Allocation ──────────────────────────────────────────────────────

    /// Bump-allocate `size` bytes, or return 0 if the space is exhausted.
    ///
    /// `size` must already be rounded to the object alignment.
    #[inline]
    pub(crate) fn try_allocate(&mut self, size: usize) -> usize {
        debug_assert_eq!(size & OBJECT_ALIGNMENT_MASK, 0);
        let result = self.top;
        if self.end - self.top < size {
            return 0;
        }
        #[cfg(debug_assertions)]
        debug_assert_eq!(result & OBJECT_ALIGNMENT_MASK, NEW_OBJECT_ALIGNMENT_OFFSET);
        self.top += size;
        result
    }

    /// Allocate `size` bytes, collecting and then growing if needed.
    /// Fatal when even a grown heap cannot satisfy the request.
    pub(crate) fn allocate(&mut self, size: usize) -> usize {
        let mut raw = self.try_allocate(size);
        if raw == 0 {
            self.scavenge("failed allocation");
            raw = self.try_allocate(size);
            if raw == 0 {
                self.grow(size, "out of capacity");
                raw = self.try_allocate(size);
                if raw == 0 {
                    panic!("failed to allocate {size} bytes");
                }
            }
        }
        #[cfg(debug_assertions)]
        // SAFETY: raw names a fresh allocation of `size` bytes in to-space.
        unsafe {
            ptr::write_bytes(raw as *mut u8, UNINITIALIZED_BYTE, size)
        };
        raw
    }

    /// Double the semispace capacity until at least `size_requested` more
    /// bytes fit, then collect into the grown space.
    pub(crate) fn grow(&mut self, size_requested: usize, reason: &str) {
        let current_size = self.to.size();
        let mut new_size = current_size * 2;
        while new_size - current_size < size_requested {
            new_size *= 2;
        }
        #[cfg(feature = "trace-growth")]
        tracing::debug!(target: "heap", new_size, reason, "growing heap");
        assert!(
            new_size <= MAX_SEMISPACE_CAPACITY,
            "semispace capacity limit exceeded growing for {size_requested} bytes ({reason})"
        );
        self.from = Semispace::new(new_size).expect("grown semispace mapping");
        self.scavenge(reason);
    }

    // ── Typed allocation entry points ───────────────────────────────────

    /// Allocate a regular object of `num_slots` reference slots.
    ///
    /// When the payload leaves the total word count odd, the trailing
    /// padding word is part of the traced range and is initialised to a
    /// small integer here.  The `num_slots` payload slots themselves are
    /// left for the caller to fill before the next safepoint.
    pub fn allocate_regular_object(&mut self, cid: usize, num_slots: usize) -> ObjectRef {
        assert!(cid == EPHEMERON_CID || cid >= FIRST_REGULAR_OBJECT_CID);
        let heap_size = allocation_size((1 + num_slots) * WORD_SIZE);
        // Regular objects carry no slot count; their size must fit the
        // header field.
        assert!(heap_size < MAX_ENCODED_HEAP_SIZE, "regular object too large");
        let addr = self.allocate(heap_size);
        // SAFETY: addr is a fresh allocation of heap_size bytes.
        unsafe {
            initialize_object(addr, cid, heap_size);
            let obj = HeapObject::at(addr);
            if (1 + num_slots) % 2 == 1 {
                obj.set_ref_at(1 + num_slots, ObjectRef::small(0));
            }
            obj.as_ref()
        }
    }

    /// Allocate a byte array of `num_bytes` uninitialised bytes.
    pub fn allocate_byte_array(&mut self, num_bytes: usize) -> ByteArray {
        let heap_size = allocation_size(BYTE_ARRAY_DATA_OFFSET + num_bytes);
        let addr = self.allocate(heap_size);
        // SAFETY: addr is a fresh allocation of heap_size bytes.
        unsafe {
            initialize_object(addr, BYTE_ARRAY_CID, heap_size);
            let obj = HeapObject::at(addr);
            obj.set_ref_at(ARRAY_SIZE_OFFSET, ObjectRef::small(num_bytes as i64));
            ByteArray::cast(obj.as_ref())
        }
    }

    /// Allocate a byte string of `num_chars` uninitialised characters.
    pub fn allocate_byte_string(&mut self, num_chars: usize) -> ByteString {
        let heap_size = allocation_size(BYTE_STRING_DATA_OFFSET + num_chars);
        let addr = self.allocate(heap_size);
        // SAFETY: addr is a fresh allocation of heap_size bytes.
        unsafe {
            initialize_object(addr, BYTE_STRING_CID, heap_size);
            let obj = HeapObject::at(addr);
            obj.set_ref_at(STRING_SIZE_OFFSET, ObjectRef::small(num_chars as i64));
            obj.set_ref_at(STRING_HASH_OFFSET, ObjectRef::small(0));
            ByteString::cast(obj.as_ref())
        }
    }

    /// Allocate a wide string of `num_chars` uninitialised code units.
    pub fn allocate_wide_string(&mut self, num_chars: usize) -> WideString {
        let heap_size = allocation_size(WIDE_STRING_DATA_OFFSET + num_chars * size_of::<u32>());
        let addr = self.allocate(heap_size);
        // SAFETY: addr is a fresh allocation of heap_size bytes.
        unsafe {
            initialize_object(addr, WIDE_STRING_CID, heap_size);
            let obj = HeapObject::at(addr);
            obj.set_ref_at(STRING_SIZE_OFFSET, ObjectRef::small(num_chars as i64));
            obj.set_ref_at(STRING_HASH_OFFSET, ObjectRef::small(0));
            WideString::cast(obj.as_ref())
        }
    }

    /// Allocate an array of `num_slots` uninitialised elements.
    pub fn allocate_array(&mut self, num_slots: usize) -> Array {
        let heap_size = allocation_size((ARRAY_ELEMENTS_OFFSET + num_slots) * WORD_SIZE);
        let addr = self.allocate(heap_size);
        // SAFETY: addr is a fresh allocation of heap_size bytes.
        unsafe {
            initialize_object(addr, ARRAY_CID, heap_size);
            let obj = HeapObject::at(addr);
            obj.set_ref_at(ARRAY_SIZE_OFFSET, ObjectRef::small(num_slots as i64));
            Array::cast(obj.as_ref())
        }
    }

    /// Allocate a weak array of `num_slots` uninitialised elements.
    pub fn allocate_weak_array(&mut self, num_slots: usize) -> WeakArray {
        let heap_size = allocation_size((ARRAY_ELEMENTS_OFFSET + num_slots) * WORD_SIZE);
        let addr = self.allocate(heap_size);
        // SAFETY: addr is a fresh allocation of heap_size bytes.
        unsafe {
            initialize_object(addr, WEAK_ARRAY_CID, heap_size);
            let obj = HeapObject::at(addr);
            obj.set_ref_at(ARRAY_SIZE_OFFSET, ObjectRef::small(num_slots as i64));
            WeakArray::cast(obj.as_ref())
        }
    }

    /// Allocate a closure carrying `num_copied` enclosing values.
    pub fn allocate_closure(&mut self, num_copied: usize) -> Closure {
        let heap_size = allocation_size((CLOSURE_FIXED_WORDS + num_copied) * WORD_SIZE);
        let addr = self.allocate(heap_size);
        // SAFETY: addr is a fresh allocation of heap_size bytes.
        unsafe {
            initialize_object(addr, CLOSURE_CID, heap_size);
            let obj = HeapObject::at(addr);
            obj.set_ref_at(CLOSURE_NUM_COPIED_OFFSET, ObjectRef::small(num_copied as i64));
            Closure::cast(obj.as_ref())
        }
    }

    /// Allocate an activation frame.
    pub fn allocate_activation(&mut self) -> Activation {
        let heap_size = allocation_size(ACTIVATION_TOTAL_WORDS * WORD_SIZE);
        let addr = self.allocate(heap_size);
        // SAFETY: addr is a fresh allocation of heap_size bytes.
        unsafe {
            initialize_object(addr, ACTIVATION_CID, heap_size);
            Activation::cast(HeapObject::at(addr).as_ref())
        }
    }

    /// Pop a frame off the recycle list, or allocate a fresh one.
    #[cfg(feature = "recycle-activations")]
    pub fn allocate_or_recycle_activation(&mut self) -> Activation {
        let head = self.recycle_list;
        if head.is_heap_object() {
            // SAFETY: the recycle list links live activations via their
            // sender slots and is cleared at every collection.
            unsafe {
                let result = Activation::cast(head);
                self.recycle_list = result.sender();
                return result;
            }
        }
        self.allocate_activation()
    }

    /// Push a dead frame onto the recycle list.
    #[cfg(feature = "recycle-activations")]
    pub fn recycle_activation(&mut self, activation: Activation) {
        // SAFETY: the caller guarantees the frame is dead to the mutator.
        unsafe { activation.set_sender(self.recycle_list) };
        self.recycle_list = activation.as_object();
    }

    /// Allocate a boxed 64-bit integer.
    pub fn allocate_medium_integer(&mut self) -> MediumInteger {
        let heap_size = allocation_size(2 * WORD_SIZE);
        let addr = self.allocate(heap_size);
        // SAFETY: addr is a fresh allocation of heap_size bytes.
        unsafe {
            initialize_object(addr, MEDIUM_INTEGER_CID, heap_size);
            MediumInteger::cast(HeapObject::at(addr).as_ref())
        }
    }

    /// Allocate an arbitrary-precision integer with room for `capacity`
    /// 32-bit digits.
    pub fn allocate_large_integer(&mut self, capacity: usize) -> LargeInteger {
        let heap_size = allocation_size(LARGE_INTEGER_DIGITS_OFFSET + capacity * size_of::<u32>());
        let addr = self.allocate(heap_size);
        // SAFETY: addr is a fresh allocation of heap_size bytes.
        unsafe {
            initialize_object(addr, LARGE_INTEGER_CID, heap_size);
            let obj = HeapObject::at(addr);
            obj.set_ref_at(LARGE_INTEGER_CAPACITY_OFFSET, ObjectRef::small(capacity as i64));
            LargeInteger::cast(obj.as_ref())
        }
    }

    /// Allocate a boxed double.
    pub fn allocate_float64(&mut self) -> Float64 {
        let heap_size = allocation_size(2 * WORD_SIZE);
        let addr = self.allocate(heap_size);
        // SAFETY: addr is a fresh allocation of heap_size bytes.
        unsafe {
            initialize_object(addr, FLOAT64_CID, heap_size);
            Float64::cast(HeapObject::at(addr).as_ref())
        }
    }

    /// Allocate a message, registering the message class on first use.
    ///
    /// Class-id allocation is a safepoint, so the class object is
    /// re-fetched from the object store afterwards.
    pub fn allocate_message(&mut self) -> Message {
        // SAFETY: the object store is a pinned root and stays valid across
        // the safepoints below because it is re-fetched after each one.
        unsafe {
            let store = ObjectStore::cast(self.object_store);
            let behavior = Behavior::cast(store.message_class());
            let nil = store.nil_obj();
            if behavior.id() == nil {
                let cid = self
                    .allocate_class_id() // SAFEPOINT
                    .expect("class table exhausted registering the message class");
                let store = ObjectStore::cast(self.object_store);
                let behavior = Behavior::cast(store.message_class());
                self.register_class(cid, behavior);
            }
            let store = ObjectStore::cast(self.object_store);
            let behavior = Behavior::cast(store.message_class());
            let id = behavior.id();
            debug_assert!(id.is_small_integer());
            let num_slots = behavior.format().small_value() as usize;
            assert_eq!(num_slots, MESSAGE_NUM_SLOTS, "message class format");
            let instance = self.allocate_regular_object(id.small_value() as usize, num_slots);
            Message::cast(instance)
        }
    }

    // ── Class table ─────────────────────────────────────────────────────

    /// Hand out a class id, recycling freed ids first.
    ///
    /// When the table is full a collection is forced to reap dead classes;
    /// if that frees nothing the table is exhausted (growth is
    /// unimplemented) and [`HeapError::ClassTableExhausted`] is returned.
    pub fn allocate_class_id(&mut self) -> HeapResult<usize> {
        let cid = if self.class_table_free != 0 {
            self.pop_free_class_id()
        } else if self.class_table_top == self.class_table.len() {
            #[cfg(feature = "trace-growth")]
            tracing::debug!(target: "heap", "scavenging to free class table entries");
            self.scavenge("class table full");
            if self.class_table_free == 0 {
                return Err(HeapError::ClassTableExhausted);
            }
            self.pop_free_class_id()
        } else {
            let cid = self.class_table_top;
            self.class_table_top += 1;
            cid
        };
        // Pending registration; scavenges skip small-integer entries.
        self.class_table[cid] = ObjectRef::small(0);
        Ok(cid)
    }

    fn pop_free_class_id(&mut self) -> usize {
        let cid = self.class_table_free;
        self.class_table_free = self.class_table[cid].small_value() as usize;
        cid
    }

    /// Install `cls` at `cid` and stamp the id back into the class.
    pub fn register_class(&mut self, cid: usize, cls: Behavior) {
        debug_assert!(
            self.class_table[cid].is_small_integer(),
            "cid {cid} already registered"
        );
        self.class_table[cid] = cls.as_object();
        // SAFETY: cls is live; register_class does not allocate.
        unsafe { cls.set_id(ObjectRef::small(cid as i64)) };
    }

    /// The class registered at `cid`.
    pub fn class_at(&self, cid: usize) -> ObjectRef {
        assert!(cid > ILLEGAL_CID);
        assert!(cid < self.class_table_top);
        self.class_table[cid]
    }

    // ── Roots ───────────────────────────────────────────────────────────

    /// Install the object store.  Must happen exactly once, before the
    /// first collection.
    pub fn initialize_root(&mut self, store: ObjectRef) {
        assert!(
            self.object_store.is_small_integer(),
            "object store already initialised"
        );
        // SAFETY: store refers to a live array per the caller's contract.
        debug_assert_eq!(unsafe { HeapObject::from_ref(store).cid() }, ARRAY_CID);
        self.object_store = store;
        // GC-safe placeholder until the first frame is installed.
        self.current_activation = ObjectRef::small(0);
    }

    /// The object store reference.
    #[inline]
    pub fn object_store(&self) -> ObjectRef {
        self.object_store
    }

    /// The current call frame.
    #[inline]
    pub fn activation(&self) -> ObjectRef {
        self.current_activation
    }

    /// Install the current call frame.
    pub fn set_activation(&mut self, activation: Activation) {
        self.current_activation = activation.as_object();
    }

    /// Forget every pinned handle slot.
    pub fn drop_handles(&mut self) {
        self.handles_top = 0;
    }

    pub(crate) fn push_handle(&mut self, slot: *mut ObjectRef) {
        assert!(self.handles_top < HANDLES_CAPACITY, "handle stack overflow");
        self.handles[self.handles_top] = slot;
        self.handles_top += 1;
    }

    pub(crate) fn pop_handle(&mut self) {
        debug_assert!(self.handles_top > 0);
        self.handles_top -= 1;
    }

    /// Replace the finalizer queue.
    pub fn set_finalizer_queue(&mut self, queue: Box<dyn FinalizerQueue>) {
        self.finalizers = queue;
    }

    /// The method lookup cache.
    #[cfg(feature = "lookup-cache")]
    pub fn lookup_cache_mut(&mut self) -> &mut LookupCache {
        &mut self.lookup_cache
    }

    // ── Identity hashes ─────────────────────────────────────────────────

    /// The identity hash of `obj`, assigning one on first request.
    pub fn ensure_identity_hash(&mut self, obj: ObjectRef) -> usize {
        assert!(obj.is_heap_object());
        // SAFETY: obj refers to a live object per the caller's contract.
        unsafe {
            let view = HeapObject::from_ref(obj);
            let hash = view.identity_hash();
            if hash != 0 {
                return hash;
            }
            let hash = self.next_identity_hash();
            view.set_identity_hash(hash);
            hash
        }
    }

    fn next_identity_hash(&mut self) -> usize {
        const HASH_MASK: usize = (1 << IDENTITY_HASH_BITS) - 1;
        loop {
            // xorshift64*, folded to the header's hash width.
            let mut x = self.identity_hash_state;
            x ^= x >> 12;
            x ^= x << 25;
            x ^= x >> 27;
            self.identity_hash_state = x;
            let hash = (x.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 48) as usize & HASH_MASK;
            if hash != 0 {
                return hash;
            }
        }
    }

    // ── Introspection ───────────────────────────────────────────────────

    /// Bytes of live-plus-not-yet-collected objects in to-space.
    #[inline]
    pub fn used(&self) -> usize {
        self.top - self.to.object_start()
    }

    /// Alias of [`used`][Self::used].
    #[inline]
    pub fn size(&self) -> usize {
        self.used()
    }

    /// Capacity of the active semispace in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.to.size()
    }

    /// Count the to-space instances of class `cid`.
    pub fn count_instances(&self, cid: usize) -> usize {
        let mut instances = 0;
        let mut scan = self.to.object_start();
        while scan < self.top {
            // SAFETY: scan walks initialised objects from object_start to top.
            let obj = HeapObject::at(scan);
            unsafe {
                if obj.cid() == cid {
                    instances += 1;
                }
                scan += obj.heap_size();
            }
        }
        instances
    }

    /// Collect the to-space instances of class `cid` into `out`, returning
    /// how many were written.  `out` must have room for all of them.
    pub fn collect_instances(&self, cid: usize, out: Array) -> usize {
        let mut instances = 0;
        let mut scan = self.to.object_start();
        while scan < self.top {
            // SAFETY: scan walks initialised objects; out is live with
            // capacity verified by the element-store debug assert.
            let obj = HeapObject::at(scan);
            unsafe {
                if obj.cid() == cid {
                    out.set_element(instances, obj.as_ref());
                    instances += 1;
                }
                scan += obj.heap_size();
            }
        }
        instances
    }

    /// Print the current activation chain to stderr, one frame per line.
    pub fn print_stack(&self) {
        // SAFETY: the activation chain and the method/selector objects it
        // references are live; this never allocates.
        unsafe {
            let store = ObjectStore::cast(self.object_store);
            let nil = store.nil_obj();
            let mut frame = self.current_activation;
            while frame != nil && frame.is_heap_object() {
                let activation = Activation::cast(frame);
                let mut line = String::from("  ");
                let mut home = activation;
                while home.closure() != nil {
                    line.push_str("[] in ");
                    home = Activation::cast(Closure::cast(home.closure()).defining_activation());
                }
                let method = home.method();
                if method != nil && method.is_heap_object() {
                    let selector = crate::objects::behavior::Method::cast(method).selector();
                    if selector.is_heap_object()
                        && HeapObject::from_ref(selector).cid() == BYTE_STRING_CID
                    {
                        let bytes = ByteString::cast(selector).to_bytes();
                        line.push_str(&String::from_utf8_lossy(&bytes));
                    } else {
                        line.push_str("<anonymous>");
                    }
                }
                eprintln!("{line}");
                frame = activation.sender();
            }
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::objects::behavior::{ObjectStore, BEHAVIOR_NUM_SLOTS, OBJECT_STORE_SIZE};
    use crate::objects::heap_object::is_forwarded;

    /// A heap with an initialised object store: `nil` is a fresh zero-slot
    /// regular object, the other well-known slots start as `nil`.
    pub(crate) fn bootstrapped_heap(capacity: usize) -> Heap {
        let mut heap = Heap::with_capacity(capacity);
        let store = heap.allocate_array(OBJECT_STORE_SIZE);
        // SAFETY: freshly allocated; elements must be valid before the
        // next safepoint.
        unsafe {
            for i in 0..OBJECT_STORE_SIZE {
                store.set_element(i, ObjectRef::small(0));
            }
        }
        heap.initialize_root(store.as_object());
        let nil_cid = heap.allocate_class_id().expect("fresh table has room");
        let nil = heap.allocate_regular_object(nil_cid, 0);
        // SAFETY: the store is live; no safepoint since it was fetched.
        unsafe {
            let store = ObjectStore::cast(heap.object_store());
            store.set_nil_obj(nil);
            store.set_false_obj(nil);
            store.set_true_obj(nil);
            store.set_message_class(nil);
        }
        heap
    }

    pub(crate) fn nil_of(heap: &Heap) -> ObjectRef {
        // SAFETY: the store is a pinned, initialised root.
        unsafe { ObjectStore::cast(heap.object_store()).nil_obj() }
    }

    /// Build a registered behavior whose instances have `format` slots.
    pub(crate) fn make_class(heap: &mut Heap, format: usize) -> (usize, Behavior) {
        let nil = nil_of(heap);
        let behavior_cid = heap.allocate_class_id().expect("class id");
        let cls = heap.allocate_regular_object(behavior_cid, BEHAVIOR_NUM_SLOTS);
        // SAFETY: freshly allocated; all slots initialised before any
        // safepoint.
        let cls = unsafe {
            let cls = Behavior::cast(cls);
            cls.set_format(ObjectRef::small(format as i64));
            cls.set_id(nil);
            let obj = HeapObject::from_ref(cls.as_object());
            obj.set_ref_at(1, nil); // superclass
            obj.set_ref_at(2, nil); // methods
            obj.set_ref_at(3, nil); // mixin
            obj.set_ref_at(4, nil); // enclosing object
            cls
        };
        let cid = heap.allocate_class_id().expect("class id");
        heap.register_class(cid, cls);
        (cid, cls)
    }

    #[test]
    fn bump_addresses_are_increasing_and_disjoint() {
        let mut heap = bootstrapped_heap(1024 * 1024);
        let mut previous_end = 0usize;
        for _ in 0..64 {
            let arr = heap.allocate_byte_array(24);
            let addr = arr.as_object().addr();
            // SAFETY: arr is live.
            let size = unsafe { HeapObject::at(addr).heap_size() };
            assert!(addr >= previous_end, "allocations must not overlap");
            previous_end = addr + size;
        }
        assert_eq!(previous_end, heap.top);
    }

    #[test]
    fn allocation_rounds_to_alignment() {
        let mut heap = bootstrapped_heap(1024 * 1024);
        for n in [0usize, 1, 7, 8, 15, 16, 17] {
            let arr = heap.allocate_byte_array(n);
            // SAFETY: arr is live.
            unsafe {
                assert_eq!(HeapObject::from_ref(arr.as_object()).heap_size() % OBJECT_ALIGNMENT, 0);
                assert_eq!(arr.len(), n);
            }
        }
    }

    #[test]
    fn odd_slot_regular_object_gets_reference_padding() {
        let mut heap = bootstrapped_heap(1024 * 1024);
        // 1 header word + 2 slots = 3 words: padded to 4.
        let obj = heap.allocate_regular_object(FIRST_REGULAR_OBJECT_CID, 2);
        // SAFETY: obj is live; word 3 is the padding slot.
        unsafe {
            let view = HeapObject::from_ref(obj);
            assert_eq!(view.heap_size(), 4 * WORD_SIZE);
            assert_eq!(view.ref_at(3), ObjectRef::small(0));
            let (first, limit) = view.pointers().expect("regular objects have slots");
            assert_eq!((first, limit), (1, 4), "padding must be inside the traced range");
        }
    }

    #[test]
    fn string_allocation_seeds_hash_slot() {
        let mut heap = bootstrapped_heap(1024 * 1024);
        let s = heap.allocate_byte_string(5);
        // SAFETY: s is live.
        unsafe {
            assert_eq!(s.len(), 5);
            assert_eq!(s.hash(), ObjectRef::small(0));
        }
        let w = heap.allocate_wide_string(3);
        // SAFETY: w is live.
        unsafe {
            assert_eq!(w.len(), 3);
            w.set_code_unit(0, 0x1f600);
            assert_eq!(w.code_unit(0), 0x1f600);
        }
    }

    #[test]
    fn closure_records_copied_count() {
        let mut heap = bootstrapped_heap(1024 * 1024);
        let nil = nil_of(&heap);
        let closure = heap.allocate_closure(2);
        // SAFETY: closure is live; slots initialised before any safepoint.
        unsafe {
            assert_eq!(closure.num_copied(), 2);
            closure.set_copied(0, nil);
            closure.set_copied(1, ObjectRef::small(17));
            assert_eq!(closure.copied(1), ObjectRef::small(17));
        }
    }

    #[test]
    fn medium_integer_and_float_round_trip() {
        let mut heap = bootstrapped_heap(1024 * 1024);
        let m = heap.allocate_medium_integer();
        // SAFETY: m is live.
        unsafe {
            m.set_value(-0x1234_5678_9abc);
            assert_eq!(m.value(), -0x1234_5678_9abc);
        }
        let f = heap.allocate_float64();
        // SAFETY: f is live.
        unsafe {
            f.set_value(6.25);
            assert_eq!(f.value(), 6.25);
        }
    }

    #[test]
    fn large_integer_records_capacity() {
        let mut heap = bootstrapped_heap(1024 * 1024);
        let li = heap.allocate_large_integer(4);
        // SAFETY: li is live.
        unsafe {
            assert_eq!(li.capacity(), 4);
            li.set_used(-2);
            li.set_digit(0, 0xdead_beef);
            li.set_digit(1, 0x1);
            assert_eq!(li.used(), -2);
            assert_eq!(li.digit(0), 0xdead_beef);
        }
    }

    #[test]
    fn identity_hash_is_lazy_sticky_and_nonzero() {
        let mut heap = bootstrapped_heap(1024 * 1024);
        let obj = heap.allocate_regular_object(FIRST_REGULAR_OBJECT_CID, 0);
        let h1 = heap.ensure_identity_hash(obj);
        let h2 = heap.ensure_identity_hash(obj);
        assert_ne!(h1, 0);
        assert_eq!(h1, h2, "identity hash must be stable");
        let other = heap.allocate_regular_object(FIRST_REGULAR_OBJECT_CID, 0);
        // Not guaranteed distinct, but the stream must not be constant.
        let mut saw_different = heap.ensure_identity_hash(other) != h1;
        for _ in 0..8 {
            let extra = heap.allocate_regular_object(FIRST_REGULAR_OBJECT_CID, 0);
            saw_different |= heap.ensure_identity_hash(extra) != h1;
        }
        assert!(saw_different, "hash stream must vary");
    }

    #[test]
    fn class_id_allocation_recycles_freed_ids() {
        let mut heap = bootstrapped_heap(1024 * 1024);
        let first = heap.allocate_class_id().expect("id");
        assert_eq!(first, FIRST_REGULAR_OBJECT_CID + 1, "nil's class took the first id");
        let second = heap.allocate_class_id().expect("id");
        assert_eq!(second, first + 1);
    }

    #[test]
    fn register_class_stamps_id() {
        let mut heap = bootstrapped_heap(1024 * 1024);
        let (cid, cls) = make_class(&mut heap, 2);
        assert_eq!(heap.class_at(cid), cls.as_object());
        // SAFETY: cls is live.
        unsafe {
            assert_eq!(cls.id(), ObjectRef::small(cid as i64));
        }
    }

    #[test]
    fn message_allocation_registers_class_once() {
        let mut heap = bootstrapped_heap(1024 * 1024);
        let (_, message_class) = make_class(&mut heap, MESSAGE_NUM_SLOTS);
        // Unregister: the message class starts with a nil id.
        let nil = nil_of(&heap);
        // SAFETY: message_class is live.
        unsafe {
            message_class.set_id(nil);
            ObjectStore::cast(heap.object_store()).set_message_class(message_class.as_object());
        }
        let before_top = heap.class_table_top;
        let message = heap.allocate_message();
        // SAFETY: message and its class are live.
        unsafe {
            let store = ObjectStore::cast(heap.object_store());
            let behavior = Behavior::cast(store.message_class());
            assert!(behavior.id().is_small_integer(), "class must be registered");
            let cid = behavior.id().small_value() as usize;
            assert_eq!(HeapObject::from_ref(message.as_object()).cid(), cid);
        }
        assert_eq!(heap.class_table_top, before_top + 1);

        // The second message reuses the registered id.
        let top_after_first = heap.class_table_top;
        heap.allocate_message();
        assert_eq!(heap.class_table_top, top_after_first);
    }

    #[test]
    fn scenario_grow_on_exhaustion_preserves_contents() {
        // S1: two half-capacity byte arrays force a growth; both survive.
        let capacity = 16 * OS_PAGE_SIZE;
        let mut heap = bootstrapped_heap(capacity);
        let initial_capacity = heap.capacity();
        let payload = initial_capacity / 2;

        let mut first = heap.allocate_byte_array(payload).as_object();
        // SAFETY: first is live; re-pinned below before the growth.
        unsafe {
            let view = ByteArray::cast(first);
            for i in 0..64 {
                view.set_byte(i, (i * 7) as u8);
            }
        }
        let _scope = unsafe { crate::gc::handle::HandleScope::new(&mut heap, &mut first) };
        let second = heap.allocate_byte_array(payload);
        assert!(heap.capacity() >= 2 * initial_capacity, "capacity must at least double");
        // SAFETY: first was updated by the collection; second is fresh.
        unsafe {
            let view = ByteArray::cast(first);
            assert_eq!(view.len(), payload);
            for i in 0..64 {
                assert_eq!(view.byte(i), (i * 7) as u8, "grown heap must preserve bytes");
            }
            assert_eq!(second.len(), payload);
        }
        assert!(!unsafe { is_forwarded(first.addr()) });
    }

    #[cfg(feature = "recycle-activations")]
    #[test]
    fn recycled_activation_is_returned_lifo() {
        let mut heap = bootstrapped_heap(1024 * 1024);
        let a = heap.allocate_activation();
        heap.recycle_activation(a);
        let b = heap.allocate_or_recycle_activation();
        assert_eq!(a.as_object(), b.as_object(), "recycle list must hand back the frame");
        let c = heap.allocate_or_recycle_activation();
        assert_ne!(b.as_object(), c.as_object(), "empty list must fall back to allocation");
    }
}
