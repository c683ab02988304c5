//! Month-sharded data files
//!
//! One `Datafile` mirrors one `YYYY-MM.data` file: every serialized
//! interval whose start falls inside that calendar month, kept in ascending
//! start order. Lines are read from disk once, on first access, and held in
//! memory; a dirty flag marks files that need flushing. `commit` rewrites
//! the whole file through the atomic writer.

use crate::storage::atomic::AtomicFile;
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::types::{compare_lines, Interval, TimeRange};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// In-memory mirror of one month's interval lines
#[derive(Debug)]
pub struct Datafile {
    /// Full path of the backing file
    path: PathBuf,
    /// File name, `YYYY-MM.data`
    name: String,
    /// The calendar month this file covers
    range: TimeRange,
    /// Lines in ascending start order; `None` until first access
    lines: Option<Vec<String>>,
    /// Unflushed changes
    dirty: bool,
}

impl Datafile {
    /// Create the mirror for `path`. The file itself may not exist yet; it
    /// is only read on first line access. Fails when the name does not
    /// match `YYYY-MM.data`.
    pub fn new(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let range = month_range_for(&name).ok_or_else(|| StoreError::InvalidFile {
            path: path.clone(),
            reason: "file name does not match YYYY-MM.data".to_string(),
        })?;

        Ok(Self {
            path,
            name,
            range,
            lines: None,
            dirty: false,
        })
    }

    /// The canonical file name for the month containing `start`
    pub fn name_for(start: DateTime<Utc>) -> String {
        format!("{:04}-{:02}.data", start.year(), start.month())
    }

    /// File name, `YYYY-MM.data`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The calendar month window covered by this file
    pub fn range(&self) -> TimeRange {
        self.range
    }

    /// True when in-memory lines differ from disk
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// All lines in ascending start order, reading the file on first call
    pub fn all_lines(&mut self) -> StoreResult<&[String]> {
        if self.lines.is_none() {
            let lines = if self.path.exists() {
                let content =
                    std::fs::read_to_string(&self.path).map_err(|e| StoreError::InvalidFile {
                        path: self.path.clone(),
                        reason: e.to_string(),
                    })?;
                content.lines().map(str::to_string).collect()
            } else {
                // A month that has not been flushed yet.
                Vec::new()
            };
            self.lines = Some(lines);
        }

        Ok(self.lines.as_deref().unwrap_or_default())
    }

    /// Lines already in memory; empty when the file has not been loaded
    pub(crate) fn cached_lines(&self) -> &[String] {
        self.lines.as_deref().unwrap_or_default()
    }

    /// Insert the interval's serialized line at its sorted position.
    /// The caller has already resolved that the start lies within
    /// [`Datafile::range`]. Returns true iff the file changed.
    pub fn add_interval(&mut self, interval: &Interval) -> StoreResult<bool> {
        debug_assert!(interval.range.starts_within(&self.range));

        let line = interval.to_line();
        self.all_lines()?;

        let lines = self.lines.as_mut().unwrap();
        let at = lines.partition_point(|existing| {
            compare_lines(existing, &line) == std::cmp::Ordering::Less
        });
        lines.insert(at, line);
        self.dirty = true;

        Ok(true)
    }

    /// Remove the matching serialized line. Absence is tolerated; returns
    /// true iff a line was removed.
    pub fn delete_interval(&mut self, interval: &Interval) -> StoreResult<bool> {
        let line = interval.to_line();
        self.all_lines()?;

        let lines = self.lines.as_mut().unwrap();
        match lines.iter().position(|existing| *existing == line) {
            Some(at) => {
                lines.remove(at);
                self.dirty = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Rewrite the backing file atomically iff there are unflushed changes
    pub fn commit(&mut self) -> StoreResult<()> {
        if !self.dirty {
            return Ok(());
        }

        let mut content = String::new();
        for line in self.cached_lines() {
            content.push_str(line);
            content.push('\n');
        }

        AtomicFile::write(&self.path, content)?;
        self.dirty = false;
        Ok(())
    }

    /// Diagnostic rendering of the in-memory state
    pub fn dump(&self) -> String {
        let mut out = format!("Datafile {} {}{}\n", self.name, self.range, {
            if self.dirty {
                " (dirty)"
            } else {
                ""
            }
        });
        match &self.lines {
            Some(lines) => {
                for line in lines {
                    let _ = writeln!(out, "  {line}");
                }
            }
            None => out.push_str("  (not loaded)\n"),
        }
        out
    }
}

/// Derive the month window from a `YYYY-MM.data` file name
fn month_range_for(name: &str) -> Option<TimeRange> {
    let stem = name.strip_suffix(".data")?;
    let (year, month) = stem.split_once('-')?;
    if year.len() != 4 || month.len() != 2 {
        return None;
    }

    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;

    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };

    Some(TimeRange::new(
        start.and_hms_opt(0, 0, 0)?.and_utc(),
        end.and_hms_opt(0, 0, 0)?.and_utc(),
    ))
}
