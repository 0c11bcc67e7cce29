//! Call-frame objects: closures and activations.

use crate::objects::heap_object::HeapObject;
use crate::objects::tagged::ObjectRef;
use crate::objects::{ACTIVATION_CID, CLOSURE_CID};

/// Word index of a closure's copied-value count.
pub const CLOSURE_NUM_COPIED_OFFSET: usize = 1;
/// Word index of a closure's defining activation.
pub const CLOSURE_DEFINING_ACTIVATION_OFFSET: usize = 2;
/// Word index of a closure's initial bytecode index.
pub const CLOSURE_INITIAL_BCI_OFFSET: usize = 3;
/// Word index of a closure's argument count.
pub const CLOSURE_NUM_ARGS_OFFSET: usize = 4;
/// Number of fixed words (header included) before the copied values.
pub const CLOSURE_FIXED_WORDS: usize = 5;

/// Word index of an activation's sender.
pub const ACTIVATION_SENDER_OFFSET: usize = 1;
/// Word index of an activation's bytecode index.
pub const ACTIVATION_BCI_OFFSET: usize = 2;
/// Word index of an activation's method.
pub const ACTIVATION_METHOD_OFFSET: usize = 3;
/// Word index of an activation's closure (`nil` for method frames).
pub const ACTIVATION_CLOSURE_OFFSET: usize = 4;
/// Word index of an activation's receiver.
pub const ACTIVATION_RECEIVER_OFFSET: usize = 5;
/// Word index of an activation's temporary count.
pub const ACTIVATION_STACK_DEPTH_OFFSET: usize = 6;
/// Word index of an activation's first temporary.
pub const ACTIVATION_TEMPS_OFFSET: usize = 7;
/// Maximum temporaries an activation can hold.
pub const MAX_ACTIVATION_TEMPS: usize = 35;
/// Total words of an activation, header included.
pub const ACTIVATION_TOTAL_WORDS: usize = ACTIVATION_TEMPS_OFFSET + MAX_ACTIVATION_TEMPS;

// Activations are fixed-size; the layout must keep them aligned.
const _: () = assert!(ACTIVATION_TOTAL_WORDS % 2 == 0);

/// A block closure: copied enclosing values plus the defining frame.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Closure(ObjectRef);

impl Closure {
    /// View `r` as a closure.
    ///
    /// # Safety
    /// `r` must refer to a live object of class [`CLOSURE_CID`].
    #[inline]
    pub unsafe fn cast(r: ObjectRef) -> Self {
        debug_assert_eq!(unsafe { HeapObject::from_ref(r).cid() }, CLOSURE_CID);
        Closure(r)
    }

    /// The tagged reference to this closure.
    #[inline]
    pub fn as_object(self) -> ObjectRef {
        self.0
    }

    #[inline]
    fn obj(self) -> HeapObject {
        HeapObject::from_ref(self.0)
    }

    /// Number of copied values.
    ///
    /// # Safety
    /// The closure must be live.
    #[inline]
    pub unsafe fn num_copied(self) -> usize {
        unsafe { self.obj().ref_at(CLOSURE_NUM_COPIED_OFFSET) }.small_value() as usize
    }

    /// # Safety
    /// The closure must be live.
    #[inline]
    pub unsafe fn defining_activation(self) -> ObjectRef {
        unsafe { self.obj().ref_at(CLOSURE_DEFINING_ACTIVATION_OFFSET) }
    }

    /// # Safety
    /// The closure must be live.
    #[inline]
    pub unsafe fn set_defining_activation(self, activation: ObjectRef) {
        unsafe { self.obj().set_ref_at(CLOSURE_DEFINING_ACTIVATION_OFFSET, activation) }
    }

    /// # Safety
    /// The closure must be live.
    #[inline]
    pub unsafe fn set_initial_bci(self, bci: ObjectRef) {
        unsafe { self.obj().set_ref_at(CLOSURE_INITIAL_BCI_OFFSET, bci) }
    }

    /// # Safety
    /// The closure must be live.
    #[inline]
    pub unsafe fn set_num_args(self, num_args: ObjectRef) {
        unsafe { self.obj().set_ref_at(CLOSURE_NUM_ARGS_OFFSET, num_args) }
    }

    /// Read copied value `index`.
    ///
    /// # Safety
    /// The closure must be live and `index < num_copied()`.
    #[inline]
    pub unsafe fn copied(self, index: usize) -> ObjectRef {
        debug_assert!(index < unsafe { self.num_copied() });
        unsafe { self.obj().ref_at(CLOSURE_FIXED_WORDS + index) }
    }

    /// Write copied value `index`.
    ///
    /// # Safety
    /// The closure must be live and `index < num_copied()`.
    #[inline]
    pub unsafe fn set_copied(self, index: usize, value: ObjectRef) {
        debug_assert!(index < unsafe { self.num_copied() });
        unsafe { self.obj().set_ref_at(CLOSURE_FIXED_WORDS + index, value) }
    }
}

/// A call frame.
///
/// Fixed-size: sender, bytecode index, method, closure, receiver, and a
/// bounded temporary area.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Activation(ObjectRef);

impl Activation {
    /// View `r` as an activation.
    ///
    /// # Safety
    /// `r` must refer to a live object of class [`ACTIVATION_CID`].
    #[inline]
    pub unsafe fn cast(r: ObjectRef) -> Self {
        debug_assert_eq!(unsafe { HeapObject::from_ref(r).cid() }, ACTIVATION_CID);
        Activation(r)
    }

    /// The tagged reference to this activation.
    #[inline]
    pub fn as_object(self) -> ObjectRef {
        self.0
    }

    #[inline]
    fn obj(self) -> HeapObject {
        HeapObject::from_ref(self.0)
    }

    /// # Safety
    /// The activation must be live.
    #[inline]
    pub unsafe fn sender(self) -> ObjectRef {
        unsafe { self.obj().ref_at(ACTIVATION_SENDER_OFFSET) }
    }

    /// # Safety
    /// The activation must be live.
    #[inline]
    pub unsafe fn set_sender(self, sender: ObjectRef) {
        unsafe { self.obj().set_ref_at(ACTIVATION_SENDER_OFFSET, sender) }
    }

    /// # Safety
    /// The activation must be live.
    #[inline]
    pub unsafe fn bci(self) -> ObjectRef {
        unsafe { self.obj().ref_at(ACTIVATION_BCI_OFFSET) }
    }

    /// # Safety
    /// The activation must be live.
    #[inline]
    pub unsafe fn set_bci(self, bci: ObjectRef) {
        unsafe { self.obj().set_ref_at(ACTIVATION_BCI_OFFSET, bci) }
    }

    /// # Safety
    /// The activation must be live.
    #[inline]
    pub unsafe fn method(self) -> ObjectRef {
        unsafe { self.obj().ref_at(ACTIVATION_METHOD_OFFSET) }
    }

    /// # Safety
    /// The activation must be live.
    #[inline]
    pub unsafe fn set_method(self, method: ObjectRef) {
        unsafe { self.obj().set_ref_at(ACTIVATION_METHOD_OFFSET, method) }
    }

    /// The closure this frame executes, or `nil` for a method frame.
    ///
    /// # Safety
    /// The activation must be live.
    #[inline]
    pub unsafe fn closure(self) -> ObjectRef {
        unsafe { self.obj().ref_at(ACTIVATION_CLOSURE_OFFSET) }
    }

    /// # Safety
    /// The activation must be live.
    #[inline]
    pub unsafe fn set_closure(self, closure: ObjectRef) {
        unsafe { self.obj().set_ref_at(ACTIVATION_CLOSURE_OFFSET, closure) }
    }

    /// # Safety
    /// The activation must be live.
    #[inline]
    pub unsafe fn receiver(self) -> ObjectRef {
        unsafe { self.obj().ref_at(ACTIVATION_RECEIVER_OFFSET) }
    }

    /// # Safety
    /// The activation must be live.
    #[inline]
    pub unsafe fn set_receiver(self, receiver: ObjectRef) {
        unsafe { self.obj().set_ref_at(ACTIVATION_RECEIVER_OFFSET, receiver) }
    }

    /// # Safety
    /// The activation must be live.
    #[inline]
    pub unsafe fn stack_depth(self) -> ObjectRef {
        unsafe { self.obj().ref_at(ACTIVATION_STACK_DEPTH_OFFSET) }
    }

    /// # Safety
    /// The activation must be live.
    #[inline]
    pub unsafe fn set_stack_depth(self, depth: ObjectRef) {
        unsafe { self.obj().set_ref_at(ACTIVATION_STACK_DEPTH_OFFSET, depth) }
    }

    /// Read temporary `index`.
    ///
    /// # Safety
    /// The activation must be live and `index < MAX_ACTIVATION_TEMPS`.
    #[inline]
    pub unsafe fn temp(self, index: usize) -> ObjectRef {
        debug_assert!(index < MAX_ACTIVATION_TEMPS);
        unsafe { self.obj().ref_at(ACTIVATION_TEMPS_OFFSET + index) }
    }

    /// Write temporary `index`.
    ///
    /// # Safety
    /// The activation must be live and `index < MAX_ACTIVATION_TEMPS`.
    #[inline]
    pub unsafe fn set_temp(self, index: usize, value: ObjectRef) {
        debug_assert!(index < MAX_ACTIVATION_TEMPS);
        unsafe { self.obj().set_ref_at(ACTIVATION_TEMPS_OFFSET + index, value) }
    }
}
