//! Error types for the Plover heap.

use thiserror::Error;

/// All errors that can be produced by the managed heap.
///
/// Most heap failures are programmer errors (tag violations, out-of-range
/// class ids, pointers outside the active space) and trap in debug builds
/// rather than surfacing here.  The variants below are the conditions a
/// caller can meaningfully observe and react to.
#[derive(Debug, Error)]
pub enum HeapError {
    /// A virtual-memory mapping of `requested` bytes could not be obtained.
    #[error("out of memory: failed to map {requested} bytes")]
    OutOfMemory {
        /// The mapping size that was requested, in bytes.
        requested: usize,
    },

    /// Growing the semispaces would exceed the configured capacity ceiling.
    #[error("semispace capacity limit exceeded")]
    CapacityExceeded,

    /// The class table is full and a forced collection reclaimed no ids.
    ///
    /// Growing the table is intentionally unimplemented; ids only come back
    /// when their classes die.
    #[error("class table exhausted")]
    ClassTableExhausted,
}

/// Convenient `Result` alias for fallible heap operations.
pub type HeapResult<T> = Result<T, HeapError>;
