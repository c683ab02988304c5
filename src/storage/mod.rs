//! Tempo interval storage
//!
//! This module provides the persistent interval store:
//!
//! - **types**: core data structures (Interval, TimeRange, line codec)
//! - **atomic**: write-temp-then-rename file primitive
//! - **datafile**: one `YYYY-MM.data` month file
//! - **journal**: transaction-grouped undo log
//! - **store**: the store orchestrating all components
//! - **error**: error types
//!
//! # Architecture
//!
//! ```text
//! Write path:
//!   Interval → Datafile (sorted insert) → Tag Index → Undo Journal (fsync)
//!
//! Read path:
//!   Cursor → Datafile (lazy load) → serialized lines, newest or oldest first
//! ```

pub mod atomic;
pub mod datafile;
pub mod error;
pub mod journal;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use atomic::AtomicFile;
pub use datafile::Datafile;
pub use error::{StoreError, StoreResult};
pub use journal::{ActionKind, Journal, Transaction, UndoAction};
pub use store::{AddOutcome, IntervalStore, NewestFirst, OldestFirst, TagChange};
pub use types::{compare_lines, Interval, ParseError, TimeRange};
