//! Ephemerons: conditional key→value references.
//!
//! An ephemeron retains its value and finalizer only while its key is
//! reachable through some other strong path.  The layout is that of a
//! three-slot regular object; the interpreter allocates ephemerons through
//! the regular-object entry point with [`EPHEMERON_CID`].

use crate::objects::heap_object::HeapObject;
use crate::objects::tagged::ObjectRef;
use crate::objects::EPHEMERON_CID;

/// Word index of the key slot.
pub const EPHEMERON_KEY_OFFSET: usize = 1;
/// Word index of the value slot.
pub const EPHEMERON_VALUE_OFFSET: usize = 2;
/// Word index of the finalizer slot.
pub const EPHEMERON_FINALIZER_OFFSET: usize = 3;

/// A conditional key→value reference triple.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Ephemeron(ObjectRef);

impl Ephemeron {
    /// Payload slot count; what the regular-object entry point is given.
    pub const NUM_SLOTS: usize = 3;

    /// View `r` as an ephemeron.
    ///
    /// # Safety
    /// `r` must refer to a live object of class [`EPHEMERON_CID`].
    #[inline]
    pub unsafe fn cast(r: ObjectRef) -> Self {
        debug_assert_eq!(unsafe { HeapObject::from_ref(r).cid() }, EPHEMERON_CID);
        Ephemeron(r)
    }

    /// The tagged reference to this ephemeron.
    #[inline]
    pub fn as_object(self) -> ObjectRef {
        self.0
    }

    #[inline]
    fn obj(self) -> HeapObject {
        HeapObject::from_ref(self.0)
    }

    /// # Safety
    /// The ephemeron must be live.
    #[inline]
    pub unsafe fn key(self) -> ObjectRef {
        unsafe { self.obj().ref_at(EPHEMERON_KEY_OFFSET) }
    }

    /// # Safety
    /// The ephemeron must be live.
    #[inline]
    pub unsafe fn set_key(self, key: ObjectRef) {
        unsafe { self.obj().set_ref_at(EPHEMERON_KEY_OFFSET, key) }
    }

    /// # Safety
    /// The ephemeron must be live.
    #[inline]
    pub unsafe fn value(self) -> ObjectRef {
        unsafe { self.obj().ref_at(EPHEMERON_VALUE_OFFSET) }
    }

    /// # Safety
    /// The ephemeron must be live.
    #[inline]
    pub unsafe fn set_value(self, value: ObjectRef) {
        unsafe { self.obj().set_ref_at(EPHEMERON_VALUE_OFFSET, value) }
    }

    /// # Safety
    /// The ephemeron must be live.
    #[inline]
    pub unsafe fn finalizer(self) -> ObjectRef {
        unsafe { self.obj().ref_at(EPHEMERON_FINALIZER_OFFSET) }
    }

    /// # Safety
    /// The ephemeron must be live.
    #[inline]
    pub unsafe fn set_finalizer(self, finalizer: ObjectRef) {
        unsafe { self.obj().set_ref_at(EPHEMERON_FINALIZER_OFFSET, finalizer) }
    }
}
