//! `plover_core` — the managed heap of the Plover object VM.
//!
//! # Crate layout
//!
//! - [`error`] — Heap error types and the `HeapResult` alias.
//! - [`gc`] — Semispaces, the copying collector, identity swap, handles.
//! - [`objects`] — Tagged references, the header encoding, typed views.
//! - [`cache`] — The method lookup cache (`lookup-cache` feature).
//!
//! The heap owns every runtime object of the language: allocation,
//! layout, identity, class association, reclamation, and
//! identity-preserving replacement.  The interpreter drives it through
//! the typed `allocate_*` entry points and pins raw references with
//! [`gc::handle::HandleScope`] across safepoints.

/// The method lookup cache; the collector only relies on its clear
/// contract.
#[cfg(feature = "lookup-cache")]
pub mod cache;
/// Heap error types and the [`error::HeapResult`] alias.
pub mod error;
/// Garbage collector infrastructure: semispaces, scavenger, become,
/// handles.
pub mod gc;
/// Runtime value representation and heap object layouts.
pub mod objects;
