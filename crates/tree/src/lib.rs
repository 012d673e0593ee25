//! State tree algorithms used by the history engine.
//!
//! # Invariants
//! - Detection reports every declared derived field present on (or attached
//!   to) an object node, and never descends into a derived value.
//! - A filtered copy carries no excluded value. Excluded object keys are
//!   absent; excluded array elements are `null` holes so indices stay aligned.
//! - Merging a snapshot only writes paths present in the snapshot and never
//!   writes a path the predicate excludes.

pub mod computed;
pub mod filter;
pub mod merge;

pub use computed::{ComputedField, ComputedRegistry, PathPattern, Segment, find_computed_paths};
pub use filter::copy_filtered;
pub use merge::merge_snapshot;
