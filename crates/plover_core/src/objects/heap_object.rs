//! The object header encoding and the untyped base view of a heap object.
//!
//! # Header layout
//!
//! Every heap object's first word is its header:
//!
//! ```text
//! bit  0       mark/forward bit (0 in a live header)
//! bits 8..16   size field: heap_size / OBJECT_ALIGNMENT, 0 = overflow
//! bits 16..32  identity hash (0 = not yet assigned)
//! bits 32..52  class id
//! ```
//!
//! When the mark bit is set the word is not a header at all: it is the
//! tagged address of the object's relocated copy.  The mark bit occupies
//! the same position as the heap-object tag, so the word reads back as a
//! valid [`ObjectRef`] directly.
//!
//! All header and slot accesses are raw word loads/stores at the object's
//! base address; no Rust reference to the underlying memory is ever formed,
//! so repurposing a header as a forwarding pointer cannot run afoul of
//! aliasing rules.

use crate::objects::array::{ARRAY_ELEMENTS_OFFSET, BYTE_ARRAY_DATA_OFFSET};
use crate::objects::frame::{ACTIVATION_TOTAL_WORDS, CLOSURE_FIXED_WORDS, CLOSURE_NUM_COPIED_OFFSET};
use crate::objects::number::{LARGE_INTEGER_CAPACITY_OFFSET, LARGE_INTEGER_DIGITS_OFFSET};
use crate::objects::string::{BYTE_STRING_DATA_OFFSET, WIDE_STRING_DATA_OFFSET};
use crate::objects::tagged::ObjectRef;
use crate::objects::{
    allocation_size, ARRAY_CID, BYTE_ARRAY_CID, BYTE_STRING_CID, CLOSURE_CID, EPHEMERON_CID,
    FIRST_REGULAR_OBJECT_CID, FORWARDING_CORPSE_CID, ACTIVATION_CID, LARGE_INTEGER_CID,
    OBJECT_ALIGNMENT, WEAK_ARRAY_CID, WIDE_STRING_CID, WORD_SIZE,
};

const MARK_BIT: usize = 1;

const SIZE_SHIFT: u32 = 8;
const SIZE_BITS: u32 = 8;
const SIZE_MASK: usize = (1 << SIZE_BITS) - 1;

const HASH_SHIFT: u32 = 16;
const HASH_BITS: u32 = 16;
const HASH_MASK: usize = (1 << HASH_BITS) - 1;

const CID_SHIFT: u32 = 32;
const CID_BITS: u32 = 20;
const CID_MASK: usize = (1 << CID_BITS) - 1;

/// Largest heap size the header's size field can encode.  Anything at or
/// above this stores 0 and derives its size from the object's layout.
pub const MAX_ENCODED_HEAP_SIZE: usize = (1 << SIZE_BITS) * OBJECT_ALIGNMENT;

/// Number of bits of identity hash carried in the header.
pub const IDENTITY_HASH_BITS: u32 = HASH_BITS;

/// An untyped view of a heap object at a known base address.
///
/// `HeapObject` is a plain address wrapper: copying it copies the address,
/// and no accessor keeps the object alive.  Any value held across a
/// potential collection is stale unless it was re-read through a traced
/// slot or a handle.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct HeapObject {
    addr: usize,
}

impl HeapObject {
    /// View the object at untagged base address `addr`.
    #[inline]
    pub fn at(addr: usize) -> Self {
        HeapObject { addr }
    }

    /// View the referent of a heap reference.
    #[inline]
    pub fn from_ref(r: ObjectRef) -> Self {
        HeapObject { addr: r.addr() }
    }

    /// The untagged base address.
    #[inline]
    pub fn addr(self) -> usize {
        self.addr
    }

    /// The tagged reference to this object.
    #[inline]
    pub fn as_ref(self) -> ObjectRef {
        ObjectRef::from_addr(self.addr)
    }

    // ── Raw word access ─────────────────────────────────────────────────

    /// Read the word at word-index `index` from the object base.
    ///
    /// # Safety
    /// The object must be live and `index` within its heap size.
    #[inline]
    pub unsafe fn word(self, index: usize) -> usize {
        unsafe { core::ptr::read((self.addr as *const usize).add(index)) }
    }

    /// Write the word at word-index `index` from the object base.
    ///
    /// # Safety
    /// The object must be live and `index` within its heap size.
    #[inline]
    pub unsafe fn set_word(self, index: usize, value: usize) {
        unsafe { core::ptr::write((self.addr as *mut usize).add(index), value) }
    }

    /// Read the reference stored at word-index `index`.
    ///
    /// # Safety
    /// As [`word`][Self::word]; the word must hold a valid reference.
    #[inline]
    pub unsafe fn ref_at(self, index: usize) -> ObjectRef {
        ObjectRef::from_raw(unsafe { self.word(index) })
    }

    /// Store a reference at word-index `index`.
    ///
    /// # Safety
    /// As [`set_word`][Self::set_word].
    #[inline]
    pub unsafe fn set_ref_at(self, index: usize, value: ObjectRef) {
        unsafe { self.set_word(index, value.raw()) }
    }

    // ── Header fields ───────────────────────────────────────────────────

    /// # Safety
    /// The object must be live (header not repurposed as a forwarding
    /// pointer).
    #[inline]
    unsafe fn header(self) -> usize {
        let header = unsafe { self.word(0) };
        debug_assert_eq!(header & MARK_BIT, 0, "live header expected");
        header
    }

    /// The class id from the header.
    ///
    /// # Safety
    /// The object must be live.
    #[inline]
    pub unsafe fn cid(self) -> usize {
        (unsafe { self.header() } >> CID_SHIFT) & CID_MASK
    }

    /// Rewrite the class id, preserving the other header fields.
    ///
    /// # Safety
    /// The object must be live and `cid` in range.
    #[inline]
    pub unsafe fn set_cid(self, cid: usize) {
        debug_assert!(cid <= CID_MASK);
        let header = unsafe { self.header() };
        let cleared = header & !(CID_MASK << CID_SHIFT);
        unsafe { self.set_word(0, cleared | (cid << CID_SHIFT)) }
    }

    /// The identity hash field; 0 means no hash has been assigned yet.
    ///
    /// # Safety
    /// The object must be live.
    #[inline]
    pub unsafe fn identity_hash(self) -> usize {
        (unsafe { self.header() } >> HASH_SHIFT) & HASH_MASK
    }

    /// Set the identity hash field.
    ///
    /// # Safety
    /// The object must be live.
    #[inline]
    pub unsafe fn set_identity_hash(self, hash: usize) {
        debug_assert!(hash <= HASH_MASK);
        let header = unsafe { self.header() };
        let cleared = header & !(HASH_MASK << HASH_SHIFT);
        unsafe { self.set_word(0, cleared | (hash << HASH_SHIFT)) }
    }

    /// The object's total heap size in bytes.
    ///
    /// Consults the header size field, falling back to the per-layout
    /// computation when the field holds the overflow sentinel.
    ///
    /// # Safety
    /// The object must be live with an initialised layout.
    pub unsafe fn heap_size(self) -> usize {
        let field = (unsafe { self.header() } >> SIZE_SHIFT) & SIZE_MASK;
        if field != 0 {
            return field * OBJECT_ALIGNMENT;
        }
        unsafe { self.heap_size_from_layout() }
    }

    /// # Safety
    /// The object must be live; its count slots must be initialised.
    unsafe fn heap_size_from_layout(self) -> usize {
        let cid = unsafe { self.cid() };
        match cid {
            // The corpse carries its size in a dedicated raw word.
            FORWARDING_CORPSE_CID => unsafe { self.word(2) },
            BYTE_ARRAY_CID => {
                let len = unsafe { self.ref_at(1) }.small_value() as usize;
                allocation_size(BYTE_ARRAY_DATA_OFFSET + len)
            }
            BYTE_STRING_CID => {
                let len = unsafe { self.ref_at(1) }.small_value() as usize;
                allocation_size(BYTE_STRING_DATA_OFFSET + len)
            }
            WIDE_STRING_CID => {
                let len = unsafe { self.ref_at(1) }.small_value() as usize;
                allocation_size(WIDE_STRING_DATA_OFFSET + len * size_of::<u32>())
            }
            ARRAY_CID | WEAK_ARRAY_CID => {
                let len = unsafe { self.ref_at(1) }.small_value() as usize;
                allocation_size((ARRAY_ELEMENTS_OFFSET + len) * WORD_SIZE)
            }
            LARGE_INTEGER_CID => {
                let capacity =
                    unsafe { self.ref_at(LARGE_INTEGER_CAPACITY_OFFSET) }.small_value() as usize;
                allocation_size(LARGE_INTEGER_DIGITS_OFFSET + capacity * size_of::<u32>())
            }
            CLOSURE_CID => {
                let num_copied =
                    unsafe { self.ref_at(CLOSURE_NUM_COPIED_OFFSET) }.small_value() as usize;
                allocation_size((CLOSURE_FIXED_WORDS + num_copied) * WORD_SIZE)
            }
            // Regular objects, activations, and the boxed numbers always
            // fit the header size field.
            _ => unreachable!("size overflow for cid {cid}"),
        }
    }

    /// The word-index range `[first, limit)` of this object's traced slots,
    /// or `None` for layouts with no reference-bearing payload.
    ///
    /// Immediate-holding words (counts, hashes, the regular-object padding
    /// slot) are included; visiting them is a no-op for the collector.
    ///
    /// # Safety
    /// The object must be live with an initialised layout.
    pub unsafe fn pointers(self) -> Option<(usize, usize)> {
        let cid = unsafe { self.cid() };
        match cid {
            ARRAY_CID | WEAK_ARRAY_CID => {
                let len = unsafe { self.ref_at(1) }.small_value() as usize;
                Some((1, ARRAY_ELEMENTS_OFFSET + len))
            }
            CLOSURE_CID => {
                let num_copied =
                    unsafe { self.ref_at(CLOSURE_NUM_COPIED_OFFSET) }.small_value() as usize;
                Some((1, CLOSURE_FIXED_WORDS + num_copied))
            }
            ACTIVATION_CID => Some((1, ACTIVATION_TOTAL_WORDS)),
            FORWARDING_CORPSE_CID => None,
            _ if cid == EPHEMERON_CID || cid >= FIRST_REGULAR_OBJECT_CID => {
                // The full payload, including the padding slot, which the
                // allocator guarantees holds a valid reference.
                Some((1, unsafe { self.heap_size() } / WORD_SIZE))
            }
            _ => None,
        }
    }
}

/// Write a fresh header at `addr` for an object of class `cid` occupying
/// `heap_size` bytes.  The identity hash starts unassigned.
///
/// # Safety
/// `addr` must be the base of an allocation of at least `heap_size` bytes.
pub unsafe fn initialize_object(addr: usize, cid: usize, heap_size: usize) {
    debug_assert_eq!(heap_size % OBJECT_ALIGNMENT, 0);
    debug_assert!(cid > 0 && cid <= CID_MASK);
    let size_field = if heap_size < MAX_ENCODED_HEAP_SIZE {
        heap_size / OBJECT_ALIGNMENT
    } else {
        0
    };
    let header = (cid << CID_SHIFT) | (size_field << SIZE_SHIFT);
    unsafe { core::ptr::write(addr as *mut usize, header) }
}

// ── Scavenge-time forwarding ───────────────────────────────────────────────
//
// During a collection a from-space object's header doubles as its
// forwarding pointer: the relocated tagged address with the mark bit set.

/// Returns `true` if the object at `addr` has been relocated this cycle.
///
/// # Safety
/// `addr` must be the base of an object in the current from-space.
#[inline]
pub unsafe fn is_forwarded(addr: usize) -> bool {
    (unsafe { core::ptr::read(addr as *const usize) } & MARK_BIT) != 0
}

/// Read the relocation target of a forwarded object.
///
/// # Safety
/// [`is_forwarded`] must hold for `addr`.
#[inline]
pub unsafe fn forwarding_target(addr: usize) -> ObjectRef {
    let header = unsafe { core::ptr::read(addr as *const usize) };
    debug_assert!(header & MARK_BIT != 0);
    // Mark bit and heap tag share bit 0: the header is the reference.
    ObjectRef::from_raw(header)
}

/// Replace the header at `old_addr` with a forwarding pointer to
/// `new_addr`.
///
/// # Safety
/// `old_addr` must hold a live (unforwarded) object; `new_addr` must be a
/// valid object base in to-space.
#[inline]
pub unsafe fn set_forwarded(old_addr: usize, new_addr: usize) {
    debug_assert!(!unsafe { is_forwarded(old_addr) });
    unsafe { core::ptr::write(old_addr as *mut usize, ObjectRef::from_addr(new_addr).raw()) }
}

// ── Forwarding corpses (identity swap) ─────────────────────────────────────

/// The redirect left behind by an identity swap.
///
/// Unlike scavenge-time forwarding, a corpse is a real object: its header
/// stays live (class [`FORWARDING_CORPSE_CID`], original heap size) so that
/// linear to-space walks can step over it, and the redirect target sits in
/// the first payload word.  When the original size was overflow-encoded the
/// second payload word carries the raw size.
#[derive(Copy, Clone)]
pub struct ForwardingCorpse(HeapObject);

const CORPSE_TARGET_OFFSET: usize = 1;
const CORPSE_OVERFLOW_SIZE_OFFSET: usize = 2;

impl ForwardingCorpse {
    /// Repurpose the storage of the live object at `addr` as a corpse of
    /// the same size redirecting to `target`.
    ///
    /// # Safety
    /// `addr` must hold a live object of `heap_size` bytes; all references
    /// to it are invalid once this returns (until forwarded).
    pub unsafe fn install(addr: usize, heap_size: usize, target: ObjectRef) -> Self {
        unsafe { initialize_object(addr, FORWARDING_CORPSE_CID, heap_size) };
        let corpse = HeapObject::at(addr);
        if heap_size >= MAX_ENCODED_HEAP_SIZE {
            unsafe { corpse.set_word(CORPSE_OVERFLOW_SIZE_OFFSET, heap_size) };
        }
        unsafe { corpse.set_ref_at(CORPSE_TARGET_OFFSET, target) };
        debug_assert_eq!(unsafe { corpse.heap_size() }, heap_size);
        ForwardingCorpse(corpse)
    }

    /// View the corpse at `addr`.
    ///
    /// # Safety
    /// `addr` must hold an installed corpse.
    pub unsafe fn at(addr: usize) -> Self {
        debug_assert_eq!(unsafe { HeapObject::at(addr).cid() }, FORWARDING_CORPSE_CID);
        ForwardingCorpse(HeapObject::at(addr))
    }

    /// The redirect target.
    ///
    /// # Safety
    /// The corpse must be installed.
    #[inline]
    pub unsafe fn target(self) -> ObjectRef {
        unsafe { self.0.ref_at(CORPSE_TARGET_OFFSET) }
    }
}

/// Returns `true` if `r` refers to an installed forwarding corpse.
///
/// # Safety
/// If `r` is a heap reference it must point at a live object.
#[inline]
pub unsafe fn is_corpse(r: ObjectRef) -> bool {
    r.is_heap_object() && unsafe { HeapObject::from_ref(r).cid() } == FORWARDING_CORPSE_CID
}
