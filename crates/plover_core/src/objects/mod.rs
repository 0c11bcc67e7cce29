//! Runtime value representation and heap object layouts.

/// Typed views over array-shaped objects (`Array`, `WeakArray`, `ByteArray`).
pub mod array;
/// Class (`Behavior`), object-store, message, and method views.
pub mod behavior;
/// The conditional key→value reference triple.
pub mod ephemeron;
/// Call-frame objects: `Closure` and `Activation`.
pub mod frame;
/// Header encoding, the base heap object, and forwarding corpses.
pub mod heap_object;
/// Boxed numeric objects: `MediumInteger`, `LargeInteger`, `Float64`.
pub mod number;
/// String objects: `ByteString` and `WideString`.
pub mod string;
/// The word-sized tagged reference type.
pub mod tagged;

// The header packs cid, size, and hash into one machine word and the tag
// scheme steals the low address bit; both assume 64-bit words.
const _: () = assert!(size_of::<usize>() == 8, "plover_core requires a 64-bit target");

/// Size of a machine word in bytes.
pub const WORD_SIZE: usize = size_of::<usize>();

/// Alignment of every heap object, in bytes.
pub const OBJECT_ALIGNMENT: usize = 2 * WORD_SIZE;

/// Mask for the low bits an aligned object address never uses.
pub const OBJECT_ALIGNMENT_MASK: usize = OBJECT_ALIGNMENT - 1;

/// Offset of every semispace object within its alignment granule.
///
/// Objects in the semispaces start at addresses ≡ 8 (mod 16), so a tagged
/// reference to one is distinguishable from immediates and from any
/// aligned-at-zero address by its low four bits alone.
pub const NEW_OBJECT_ALIGNMENT_OFFSET: usize = WORD_SIZE;

/// Round `size` up to the next multiple of [`OBJECT_ALIGNMENT`].
#[inline]
pub const fn allocation_size(size: usize) -> usize {
    (size + OBJECT_ALIGNMENT_MASK) & !OBJECT_ALIGNMENT_MASK
}

// ── Class ids ───────────────────────────────────────────────────────────────
//
// Ids below `FIRST_REGULAR_OBJECT_CID` are fixed at build time; the class
// table hands out the rest.  Every heap object's header carries one.

/// Never a valid class id.
pub const ILLEGAL_CID: usize = 0;
/// Storage repurposed as a redirect during an identity swap.
pub const FORWARDING_CORPSE_CID: usize = 1;
/// Immediate small integers (never allocated; present for dispatch).
pub const SMALL_INTEGER_CID: usize = 2;
/// Boxed 64-bit integers.
pub const MEDIUM_INTEGER_CID: usize = 3;
/// Arbitrary-precision integers.
pub const LARGE_INTEGER_CID: usize = 4;
/// Boxed 64-bit floats.
pub const FLOAT64_CID: usize = 5;
/// Raw byte vectors.
pub const BYTE_ARRAY_CID: usize = 6;
/// Latin-1 strings.
pub const BYTE_STRING_CID: usize = 7;
/// UTF-32 strings.
pub const WIDE_STRING_CID: usize = 8;
/// Reference vectors.
pub const ARRAY_CID: usize = 9;
/// Reference vectors whose slots do not retain their referents.
pub const WEAK_ARRAY_CID: usize = 10;
/// Conditional key→value reference triples.
pub const EPHEMERON_CID: usize = 11;
/// Call frames.
pub const ACTIVATION_CID: usize = 12;
/// Closures.
pub const CLOSURE_CID: usize = 13;
/// First id handed out by the class table.
pub const FIRST_REGULAR_OBJECT_CID: usize = 14;

/// First id the collector's class-table passes consider.
pub const FIRST_LEGAL_CID: usize = SMALL_INTEGER_CID;
