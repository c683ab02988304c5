//! # Tempo
//!
//! The persistent interval store of a personal time-tracking tool: keeps
//! tracked time as one text file per month, maintains chronological order
//! across files, and records every mutation in a transactional undo
//! journal.
//!
//! ## Features
//!
//! - **Month-sharded storage**: one `YYYY-MM.data` text file per month,
//!   loaded lazily and flushed atomically
//! - **Chronological iteration**: forward and reverse cursors over the
//!   whole timeline, independent of physical file layout
//! - **Undo journal**: write-ahead log of reversible actions with
//!   transactional grouping and a bounded size
//! - **Tag index**: reference counts per tag, rebuilt from interval data
//!   whenever the sidecar is missing or corrupt
//!
//! ## Modules
//!
//! - [`storage`]: data files, the store, the undo journal
//! - [`index`]: the tag reference-count index
//! - [`config`]: store configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tempo::{Interval, IntervalStore, StoreConfig};
//! use chrono::Utc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = IntervalStore::open(StoreConfig::new("./data"))?;
//!
//!     // Track an hour of work
//!     let end = Utc::now();
//!     let start = end - chrono::Duration::hours(1);
//!     let outcome = store.add_interval(&Interval::new(start, end).tag("work"))?;
//!
//!     for change in &outcome.tag_changes {
//!         if change.was_new {
//!             println!("Note: '{}' is a new tag.", change.tag);
//!         }
//!     }
//!
//!     store.commit()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod index;
pub mod storage;

// Re-export top-level types for convenience
pub use config::StoreConfig;
pub use index::{TagIndex, TagInfo};
pub use storage::{
    AddOutcome, AtomicFile, Datafile, Interval, IntervalStore, Journal, ParseError, StoreError,
    StoreResult, TagChange, TimeRange, Transaction,
};
