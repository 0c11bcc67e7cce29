/// Bulk identity swap (`become`) over the live set.
pub mod forward;
/// Scoped root pinning for raw references held across safepoints.
pub mod handle;
/// The heap: allocation entry points, class table, roots, introspection.
pub mod heap;
/// Virtual-memory mappings and the semispace region type.
pub mod memory;
/// The semispace copying collector with ephemeron and weak-array passes.
pub mod scavenger;
