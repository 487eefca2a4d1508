//! Reactive collections with typed accessors.
//!
//! Each collection records a dependency per key (or index, or element), plus
//! an iteration dependency covering whole-collection reads and a version
//! counter so watchers can observe "something changed" without snapshotting.

mod list;
mod map;
mod set;

pub use list::{ReactiveList, ReadonlyList};
pub use map::{ReactiveMap, ReadonlyMap};
pub use set::{ReactiveSet, ReadonlySet};

/// The kind of mutation a collection write performed, which decides the set
/// of dependencies to invalidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerOp {
    /// A key that did not exist gained a value.
    Add,
    /// An existing key's value changed.
    Set,
    /// A key was removed.
    Delete,
    /// Everything was removed.
    Clear,
}
