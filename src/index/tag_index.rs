//! Tag Index - reference counts for every tag in the store
//!
//! Maps `tag → count`, where count is the number of intervals currently
//! carrying that tag. Persisted as a JSON object keyed by tag:
//!
//! ```json
//! { "work": { "count": 12 }, "tag two": { "count": 3 } }
//! ```
//!
//! # Design Notes
//! - Tags whose count drops to zero are retained; they record historical
//!   presence and are only removed explicitly.
//! - Unknown keys inside each tag object are preserved on round-trip.
//! - The index is a cache; the store rebuilds it from interval data when
//!   the sidecar is missing or unreadable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-tag bookkeeping stored in the sidecar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    /// Number of intervals carrying the tag
    pub count: u32,
    /// Fields this version does not interpret, kept for round-trip
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl TagInfo {
    pub fn new(count: u32) -> Self {
        Self {
            count,
            extra: serde_json::Map::new(),
        }
    }
}

/// Reference-count index over all tags in the store
#[derive(Debug, Default)]
pub struct TagIndex {
    tags: BTreeMap<String, TagInfo>,
    /// Track whether the on-disk sidecar is stale
    modified: bool,
}

impl TagIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the sidecar JSON form
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let tags: BTreeMap<String, TagInfo> = serde_json::from_str(content)?;
        Ok(Self {
            tags,
            modified: false,
        })
    }

    /// Render the sidecar JSON form
    pub fn to_json(&self) -> String {
        // BTreeMap keys serialize in order, keeping the sidecar diffable.
        serde_json::to_string_pretty(&self.tags).unwrap_or_else(|_| "{}".to_string())
    }

    /// Insert or replace a tag entry
    pub fn add(&mut self, tag: impl Into<String>, info: TagInfo) {
        self.tags.insert(tag.into(), info);
        self.modified = true;
    }

    /// Bump a tag's count; returns the previous count, `None` when the tag
    /// was not present before
    pub fn increment(&mut self, tag: &str) -> Option<u32> {
        self.modified = true;
        match self.tags.get_mut(tag) {
            Some(info) => {
                let previous = info.count;
                info.count += 1;
                Some(previous)
            }
            None => {
                self.tags.insert(tag.to_string(), TagInfo::new(1));
                None
            }
        }
    }

    /// Drop a tag's count, clamped at zero; returns the previous count.
    /// Unknown tags are left untouched.
    pub fn decrement(&mut self, tag: &str) -> Option<u32> {
        let info = self.tags.get_mut(tag)?;
        let previous = info.count;
        info.count = info.count.saturating_sub(1);
        if previous > 0 {
            self.modified = true;
        }
        Some(previous)
    }

    /// Current count for a tag
    pub fn count(&self, tag: &str) -> Option<u32> {
        self.tags.get(tag).map(|info| info.count)
    }

    /// Snapshot of all known tags, including zero-count ones
    pub fn tags(&self) -> Vec<String> {
        self.tags.keys().cloned().collect()
    }

    /// Number of known tags
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// True when no tags are known
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// True when the sidecar no longer matches the in-memory state
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Mark the in-memory state as persisted
    pub fn clear_modified(&mut self) {
        self.modified = false;
    }
}
