//! Class objects and the well-known-roots store.
//!
//! A `Behavior` is an ordinary regular object whose slots the VM agrees to
//! interpret as class structure; the heap relies only on the `format` and
//! `id` slots.  The `ObjectStore` is the array of well-known roots pinned
//! by the heap, and `Message`/`Method` are the regular-object shapes the
//! heap needs for message allocation and stack printing.

use crate::objects::array::Array;
use crate::objects::heap_object::HeapObject;
use crate::objects::tagged::ObjectRef;
use crate::objects::FIRST_REGULAR_OBJECT_CID;

const BEHAVIOR_SUPERCLASS_SLOT: usize = 0;
const BEHAVIOR_METHODS_SLOT: usize = 1;
const BEHAVIOR_MIXIN_SLOT: usize = 2;
const BEHAVIOR_ENCLOSING_OBJECT_SLOT: usize = 3;
const BEHAVIOR_FORMAT_SLOT: usize = 4;
const BEHAVIOR_ID_SLOT: usize = 5;

/// Payload slot count of a class object.
pub const BEHAVIOR_NUM_SLOTS: usize = 6;

/// A class object.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Behavior(ObjectRef);

impl Behavior {
    /// View `r` as a class object.
    ///
    /// # Safety
    /// `r` must refer to a live regular object with the behavior layout.
    #[inline]
    pub unsafe fn cast(r: ObjectRef) -> Self {
        debug_assert!(unsafe { HeapObject::from_ref(r).cid() } >= FIRST_REGULAR_OBJECT_CID);
        Behavior(r)
    }

    /// The tagged reference to this class.
    #[inline]
    pub fn as_object(self) -> ObjectRef {
        self.0
    }

    #[inline]
    fn obj(self) -> HeapObject {
        HeapObject::from_ref(self.0)
    }

    /// # Safety
    /// The class must be live.
    #[inline]
    pub unsafe fn superclass(self) -> ObjectRef {
        unsafe { self.obj().ref_at(1 + BEHAVIOR_SUPERCLASS_SLOT) }
    }

    /// # Safety
    /// The class must be live.
    #[inline]
    pub unsafe fn methods(self) -> ObjectRef {
        unsafe { self.obj().ref_at(1 + BEHAVIOR_METHODS_SLOT) }
    }

    /// # Safety
    /// The class must be live.
    #[inline]
    pub unsafe fn mixin(self) -> ObjectRef {
        unsafe { self.obj().ref_at(1 + BEHAVIOR_MIXIN_SLOT) }
    }

    /// # Safety
    /// The class must be live.
    #[inline]
    pub unsafe fn enclosing_object(self) -> ObjectRef {
        unsafe { self.obj().ref_at(1 + BEHAVIOR_ENCLOSING_OBJECT_SLOT) }
    }

    /// The instance format: the declared slot count of instances.
    ///
    /// # Safety
    /// The class must be live.
    #[inline]
    pub unsafe fn format(self) -> ObjectRef {
        unsafe { self.obj().ref_at(1 + BEHAVIOR_FORMAT_SLOT) }
    }

    /// # Safety
    /// The class must be live.
    #[inline]
    pub unsafe fn set_format(self, format: ObjectRef) {
        unsafe { self.obj().set_ref_at(1 + BEHAVIOR_FORMAT_SLOT, format) }
    }

    /// The registered class id as a small integer, or `nil` if this class
    /// has never been registered.
    ///
    /// # Safety
    /// The class must be live.
    #[inline]
    pub unsafe fn id(self) -> ObjectRef {
        unsafe { self.obj().ref_at(1 + BEHAVIOR_ID_SLOT) }
    }

    /// # Safety
    /// The class must be live.
    #[inline]
    pub unsafe fn set_id(self, id: ObjectRef) {
        unsafe { self.obj().set_ref_at(1 + BEHAVIOR_ID_SLOT, id) }
    }

    /// Word index of the `id` slot, for passes that must read it out of a
    /// corpse whose header and first payload words are no longer a
    /// behavior's.
    pub(crate) const ID_WORD: usize = 1 + BEHAVIOR_ID_SLOT;
}

// ── Object store ───────────────────────────────────────────────────────────

const STORE_NIL_INDEX: usize = 0;
const STORE_FALSE_INDEX: usize = 1;
const STORE_TRUE_INDEX: usize = 2;
const STORE_MESSAGE_CLASS_INDEX: usize = 3;

/// Element count of the object-store array.
pub const OBJECT_STORE_SIZE: usize = 4;

/// The array of well-known roots: `nil`, `false`, `true`, and the message
/// class.  Allocated once by the embedder and pinned by the heap.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ObjectStore(Array);

impl ObjectStore {
    /// View `r` as the object store.
    ///
    /// # Safety
    /// `r` must refer to a live array of at least [`OBJECT_STORE_SIZE`]
    /// elements.
    #[inline]
    pub unsafe fn cast(r: ObjectRef) -> Self {
        let array = unsafe { Array::cast(r) };
        debug_assert!(unsafe { array.len() } >= OBJECT_STORE_SIZE);
        ObjectStore(array)
    }

    /// The underlying array.
    #[inline]
    pub fn as_array(self) -> Array {
        self.0
    }

    /// The tagged reference to the store.
    #[inline]
    pub fn as_object(self) -> ObjectRef {
        self.0.as_object()
    }

    /// The distinguished `nil` object.
    ///
    /// # Safety
    /// The store must be live and initialised.
    #[inline]
    pub unsafe fn nil_obj(self) -> ObjectRef {
        unsafe { self.0.element(STORE_NIL_INDEX) }
    }

    /// # Safety
    /// The store must be live.
    #[inline]
    pub unsafe fn set_nil_obj(self, nil: ObjectRef) {
        unsafe { self.0.set_element(STORE_NIL_INDEX, nil) }
    }

    /// # Safety
    /// The store must be live and initialised.
    #[inline]
    pub unsafe fn false_obj(self) -> ObjectRef {
        unsafe { self.0.element(STORE_FALSE_INDEX) }
    }

    /// # Safety
    /// The store must be live.
    #[inline]
    pub unsafe fn set_false_obj(self, false_obj: ObjectRef) {
        unsafe { self.0.set_element(STORE_FALSE_INDEX, false_obj) }
    }

    /// # Safety
    /// The store must be live and initialised.
    #[inline]
    pub unsafe fn true_obj(self) -> ObjectRef {
        unsafe { self.0.element(STORE_TRUE_INDEX) }
    }

    /// # Safety
    /// The store must be live.
    #[inline]
    pub unsafe fn set_true_obj(self, true_obj: ObjectRef) {
        unsafe { self.0.set_element(STORE_TRUE_INDEX, true_obj) }
    }

    /// The class of `Message` instances.
    ///
    /// # Safety
    /// The store must be live and initialised.
    #[inline]
    pub unsafe fn message_class(self) -> ObjectRef {
        unsafe { self.0.element(STORE_MESSAGE_CLASS_INDEX) }
    }

    /// # Safety
    /// The store must be live.
    #[inline]
    pub unsafe fn set_message_class(self, cls: ObjectRef) {
        unsafe { self.0.set_element(STORE_MESSAGE_CLASS_INDEX, cls) }
    }
}

// ── Message ────────────────────────────────────────────────────────────────

const MESSAGE_SELECTOR_SLOT: usize = 0;
const MESSAGE_ARGUMENTS_SLOT: usize = 1;

/// Payload slot count a message class must declare.
pub const MESSAGE_NUM_SLOTS: usize = 2;

/// A reified message send: selector plus argument array.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Message(ObjectRef);

impl Message {
    /// View `r` as a message.
    ///
    /// # Safety
    /// `r` must refer to a live two-slot regular object.
    #[inline]
    pub unsafe fn cast(r: ObjectRef) -> Self {
        debug_assert!(unsafe { HeapObject::from_ref(r).cid() } >= FIRST_REGULAR_OBJECT_CID);
        Message(r)
    }

    /// The tagged reference to this message.
    #[inline]
    pub fn as_object(self) -> ObjectRef {
        self.0
    }

    /// # Safety
    /// The message must be live.
    #[inline]
    pub unsafe fn selector(self) -> ObjectRef {
        unsafe { HeapObject::from_ref(self.0).ref_at(1 + MESSAGE_SELECTOR_SLOT) }
    }

    /// # Safety
    /// The message must be live.
    #[inline]
    pub unsafe fn set_selector(self, selector: ObjectRef) {
        unsafe { HeapObject::from_ref(self.0).set_ref_at(1 + MESSAGE_SELECTOR_SLOT, selector) }
    }

    /// # Safety
    /// The message must be live.
    #[inline]
    pub unsafe fn arguments(self) -> ObjectRef {
        unsafe { HeapObject::from_ref(self.0).ref_at(1 + MESSAGE_ARGUMENTS_SLOT) }
    }

    /// # Safety
    /// The message must be live.
    #[inline]
    pub unsafe fn set_arguments(self, arguments: ObjectRef) {
        unsafe { HeapObject::from_ref(self.0).set_ref_at(1 + MESSAGE_ARGUMENTS_SLOT, arguments) }
    }
}

// ── Method (stack printing only) ───────────────────────────────────────────

const METHOD_SELECTOR_SLOT: usize = 0;

/// A compiled method, as far as the heap cares: slot 0 is the selector.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Method(ObjectRef);

impl Method {
    /// View `r` as a method.
    ///
    /// # Safety
    /// `r` must refer to a live regular object with a selector in slot 0.
    #[inline]
    pub unsafe fn cast(r: ObjectRef) -> Self {
        Method(r)
    }

    /// # Safety
    /// The method must be live.
    #[inline]
    pub unsafe fn selector(self) -> ObjectRef {
        unsafe { HeapObject::from_ref(self.0).ref_at(1 + METHOD_SELECTOR_SLOT) }
    }
}
