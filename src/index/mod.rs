//! Index structures for the interval store
//!
//! The only index the store maintains is the tag reference-count index,
//! persisted as a small JSON sidecar next to the data files. It is a cache:
//! the interval data is ground truth and the index can always be rebuilt
//! from it.

pub mod tag_index;

pub use tag_index::{TagIndex, TagInfo};
