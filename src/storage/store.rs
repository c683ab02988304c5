//! The interval store
//!
//! Orchestrates all storage components behind one mutation boundary:
//!
//! ```text
//! Write path:  Interval → Datafile (sorted insert) → Tag Index → Journal
//! Read path:   two-level cursor over (datafile, line), newest file first
//! ```
//!
//! The store owns an ordered list of month [`Datafile`]s, the tag
//! reference-count index, and the undo [`Journal`]. Mutations update the
//! in-memory state and journal synchronously; `commit` is the single batch
//! flush point for data files and the tag sidecar.
//!
//! The store is single threaded and assumes exclusive access to its data
//! directory. Iterators borrow the store mutably, so mutating while
//! iterating is rejected at compile time.

use crate::config::StoreConfig;
use crate::index::TagIndex;
use crate::storage::atomic::AtomicFile;
use crate::storage::datafile::Datafile;
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::journal::{ActionKind, Journal, Transaction};
use crate::storage::types::{Interval, TimeRange};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::fmt::Write as _;
use std::path::Path;

/// One tag-count change performed by an add
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagChange {
    pub tag: String,
    /// True when the add introduced the tag to the store
    pub was_new: bool,
}

/// Structured result of [`IntervalStore::add_interval`]
///
/// The store performs no output of its own; callers that want to announce
/// new tags inspect `tag_changes`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOutcome {
    /// Tag-count changes in tag order
    pub tag_changes: Vec<TagChange>,
    /// True when an undo record was written for the add
    pub recorded: bool,
}

/// Where `find_datafile` landed
enum Slot {
    /// The file at this index covers the interval's start
    Found(usize),
    /// No file covers it; a new one belongs at this index
    InsertAt(usize),
}

/// The persistent interval store
pub struct IntervalStore {
    config: StoreConfig,
    /// Month files sorted ascending; at most one per month
    files: Vec<Datafile>,
    tag_index: TagIndex,
    journal: Journal,
}

impl IntervalStore {
    /// Open (or create) the store rooted at the configured data directory
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| StoreError::io(&config.data_dir, e))?;

        let journal = Journal::new(config.journal_path(), config.journal_size)?;
        let files = discover_datafiles(&config.data_dir)?;

        let mut store = Self {
            config,
            files,
            tag_index: TagIndex::new(),
            journal,
        };
        store.initialize_tag_index()?;

        Ok(store)
    }

    /// Add an interval, routing it to the month file covering its start
    /// and creating that file if the month is new. Returns the tag-count
    /// changes so the caller can decide what to announce.
    pub fn add_interval(&mut self, interval: &Interval) -> StoreResult<AddOutcome> {
        if !interval.is_open() && interval.start() > interval.end() {
            return Err(StoreError::InvariantViolation(format!(
                "interval start is after its end: {interval}"
            )));
        }

        let tag_changes = interval
            .tags
            .iter()
            .map(|tag| TagChange {
                tag: tag.clone(),
                was_new: self.tag_index.increment(tag).is_none(),
            })
            .collect();

        let at = self.resolve_datafile(interval)?;
        let changed = self.files[at].add_interval(interval)?;
        if changed {
            self.journal.record_interval_action("", interval.to_line())?;
        }

        Ok(AddOutcome {
            tag_changes,
            recorded: changed,
        })
    }

    /// Delete an interval from the month file covering its start.
    ///
    /// Coverage is validated before any state changes, so a `NotFound`
    /// delete leaves tag counts untouched.
    pub fn delete_interval(&mut self, interval: &Interval) -> StoreResult<()> {
        let at = match find_datafile(&self.files, &interval.range) {
            Slot::Found(at) => at,
            Slot::InsertAt(_) => return Err(StoreError::NotFound(interval.to_line())),
        };

        for tag in &interval.tags {
            self.tag_index.decrement(tag);
        }

        self.files[at].delete_interval(interval)?;
        self.journal.record_interval_action(interval.to_line(), "")?;

        Ok(())
    }

    /// Replace `from` with `to`: a delete followed by an add, because the
    /// new start may belong to a different month file. `None` sides degrade
    /// to a pure add or a pure delete. Both halves share one journal
    /// transaction iff the caller opened one.
    pub fn modify_interval(
        &mut self,
        from: Option<&Interval>,
        to: Option<&Interval>,
    ) -> StoreResult<AddOutcome> {
        if let Some(from) = from {
            self.delete_interval(from)?;
        }

        match to {
            Some(to) => self.add_interval(to),
            None => Ok(AddOutcome::default()),
        }
    }

    /// Flush every dirty month file, then the tag sidecar iff it changed.
    /// The journal is flushed on every mutation and needs nothing here.
    pub fn commit(&mut self) -> StoreResult<()> {
        for file in &mut self.files {
            file.commit()?;
        }

        if self.tag_index.is_modified() {
            AtomicFile::write(self.config.tags_path(), self.tag_index.to_json())?;
            self.tag_index.clear_modified();
        }

        Ok(())
    }

    /// Iterate serialized lines most recent first (newest file, last line
    /// first). This matches the dominant "latest entry" access pattern.
    pub fn lines_newest_first(&mut self) -> NewestFirst<'_> {
        let file_cursor = self.files.len();
        NewestFirst {
            files: &mut self.files,
            file_cursor,
            line_cursor: 0,
            done: false,
        }
    }

    /// Iterate serialized lines in chronological order
    pub fn lines_oldest_first(&mut self) -> OldestFirst<'_> {
        OldestFirst {
            files: &mut self.files,
            file_cursor: 0,
            line_cursor: 0,
            done: false,
        }
    }

    /// Most recent non-empty line, if any
    pub fn latest_entry(&mut self) -> StoreResult<Option<String>> {
        for line in self.lines_newest_first() {
            let line = line?;
            if !line.is_empty() {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }

    /// True iff iteration yields nothing
    pub fn empty(&mut self) -> StoreResult<bool> {
        match self.lines_newest_first().next() {
            None => Ok(true),
            Some(Ok(_)) => Ok(false),
            Some(Err(e)) => Err(e),
        }
    }

    /// Snapshot of current data file names, oldest month first
    pub fn files(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name().to_string()).collect()
    }

    /// Snapshot of all known tags
    pub fn tags(&self) -> Vec<String> {
        self.tag_index.tags()
    }

    /// Current reference count for a tag
    pub fn tag_count(&self, tag: &str) -> Option<u32> {
        self.tag_index.count(tag)
    }

    /// The undo journal, for transaction bracketing
    pub fn journal(&mut self) -> &mut Journal {
        &mut self.journal
    }

    /// Pop the newest undo transaction and apply each record's inverse,
    /// newest record first. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> StoreResult<bool> {
        let transaction = match self.journal.pop_last_transaction()? {
            Some(transaction) => transaction,
            None => return Ok(false),
        };

        // The replay itself must not journal new records.
        self.journal.set_recording(false);
        let result = self.apply_inverse(&transaction);
        self.journal.set_recording(true);

        result.map(|_| true)
    }

    /// Split a range into one segment per calendar month it touches. Each
    /// segment is a whole month; an open end is materialized as now.
    pub fn segment_range(&self, range: &TimeRange) -> Vec<TimeRange> {
        let end = if range.is_open() { Utc::now() } else { range.end };
        let effective = TimeRange::new(range.start, end);

        let mut segments = Vec::new();
        let mut year = range.start.year();
        let mut month = range.start.month();
        let end_year = end.year();
        let end_month = end.month();

        while year < end_year || (year == end_year && month <= end_month) {
            let segment_start = month_start(year, month);

            month += 1;
            if month > 12 {
                year += 1;
                month = 1;
            }

            let segment = TimeRange::new(segment_start, month_start(year, month));
            if effective.intersects(&segment) {
                segments.push(segment);
            }
        }

        segments
    }

    /// Diagnostic rendering of the in-memory state
    pub fn dump(&self) -> String {
        let mut out = String::from("IntervalStore\n");
        for file in &self.files {
            let _ = write!(out, "{}", file.dump());
        }
        out
    }

    /// Index of the file covering the interval's start, creating a new
    /// month file at the sorted position when none does
    fn resolve_datafile(&mut self, interval: &Interval) -> StoreResult<usize> {
        match find_datafile(&self.files, &interval.range) {
            Slot::Found(at) => Ok(at),
            Slot::InsertAt(at) => {
                let name = Datafile::name_for(interval.start());
                let file = Datafile::new(self.config.data_dir.join(name))?;
                self.files.insert(at, file);
                Ok(at)
            }
        }
    }

    fn apply_inverse(&mut self, transaction: &Transaction) -> StoreResult<()> {
        for action in transaction.actions().iter().rev() {
            match action.kind {
                ActionKind::Interval => {
                    if !action.after.is_empty() {
                        let interval = parse_undo_payload(&action.after)?;
                        self.delete_interval(&interval)?;
                    }
                    if !action.before.is_empty() {
                        let interval = parse_undo_payload(&action.before)?;
                        self.add_interval(&interval)?;
                    }
                }
                ActionKind::Config => {
                    // Reserved; no config records are written yet.
                }
            }
        }
        Ok(())
    }

    /// Load the tag sidecar, rebuilding it from interval data (the ground
    /// truth) when it is missing or unreadable
    fn initialize_tag_index(&mut self) -> StoreResult<()> {
        let tags_path = self.config.tags_path();

        if tags_path.exists() {
            let content = AtomicFile::read_to_string(&tags_path)?;
            match TagIndex::from_json(&content) {
                Ok(index) => {
                    self.tag_index = index;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("error parsing tag database {:?}: {}", tags_path, e);
                }
            }
        } else if !self.files.is_empty() {
            tracing::warn!("tag database {:?} does not exist", tags_path);
        }

        if !self.files.is_empty() {
            tracing::info!("rebuilding tag database from interval data");
        }
        self.tag_index = TagIndex::new();

        for file in &mut self.files {
            let path = file.path().to_path_buf();
            for line in file.all_lines()? {
                if line.is_empty() {
                    continue;
                }
                let interval =
                    Interval::from_line(line).map_err(|e| StoreError::InvalidFile {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                for tag in &interval.tags {
                    self.tag_index.increment(tag);
                }
            }
        }

        // The sidecar file should always exist, counts and all.
        AtomicFile::write(&tags_path, self.tag_index.to_json())?;
        self.tag_index.clear_modified();

        Ok(())
    }
}

/// Search the file list from the newest month backward: the common case is
/// an edit near the present. Returns the covering file, or the sorted
/// insertion point for a file that does not exist yet.
fn find_datafile(files: &[Datafile], range: &TimeRange) -> Slot {
    for (at, file) in files.iter().enumerate().rev() {
        let file_range = file.range();
        if range.starts_within(&file_range) {
            return Slot::Found(at);
        }
        if file_range.end <= range.start {
            return Slot::InsertAt(at + 1);
        }
    }

    Slot::InsertAt(0)
}

/// Scan the data directory for month files, sorted ascending
fn discover_datafiles(data_dir: &Path) -> StoreResult<Vec<Datafile>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(data_dir).map_err(|e| StoreError::io(data_dir, e))? {
        let entry = entry.map_err(|e| StoreError::io(data_dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        match Datafile::new(&path) {
            Ok(file) => files.push(file),
            Err(_) => {
                // tags.data, undo.data and strays are not month files.
                tracing::debug!("skipping non-datafile {:?}", path);
            }
        }
    }

    files.sort_by_key(|f| f.range().start);
    Ok(files)
}

fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .expect("month is always in 1..=12 here")
}

fn parse_undo_payload(line: &str) -> StoreResult<Interval> {
    Interval::from_line(line)
        .map_err(|e| StoreError::InvariantViolation(format!("bad undo record: {e}")))
}

/// Two-level cursor over (file, line), newest file first and lines within
/// a file last first. Files are loaded lazily as the cursor enters them;
/// empty files are skipped.
pub struct NewestFirst<'a> {
    files: &'a mut [Datafile],
    /// Index + 1 of the current file; 0 when no file remains
    file_cursor: usize,
    /// Index + 1 of the next line to yield within the current file
    line_cursor: usize,
    done: bool,
}

impl Iterator for NewestFirst<'_> {
    type Item = StoreResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while self.line_cursor == 0 {
            if self.file_cursor == 0 {
                self.done = true;
                return None;
            }
            self.file_cursor -= 1;
            match self.files[self.file_cursor].all_lines() {
                Ok(lines) => self.line_cursor = lines.len(),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        self.line_cursor -= 1;
        Some(Ok(
            self.files[self.file_cursor].cached_lines()[self.line_cursor].clone()
        ))
    }
}

/// The chronological dual of [`NewestFirst`]
pub struct OldestFirst<'a> {
    files: &'a mut [Datafile],
    file_cursor: usize,
    line_cursor: usize,
    done: bool,
}

impl Iterator for OldestFirst<'_> {
    type Item = StoreResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if self.file_cursor == self.files.len() {
                self.done = true;
                return None;
            }

            let lines = match self.files[self.file_cursor].all_lines() {
                Ok(lines) => lines,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            if self.line_cursor < lines.len() {
                let line = lines[self.line_cursor].clone();
                self.line_cursor += 1;
                return Some(Ok(line));
            }

            self.file_cursor += 1;
            self.line_cursor = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::compare_lines;
    use std::cmp::Ordering;
    use tempfile::{tempdir, TempDir};

    fn date(spec: &str) -> DateTime<Utc> {
        chrono::NaiveDateTime::parse_from_str(spec, "%Y-%m-%dT%H:%M:%S")
            .unwrap()
            .and_utc()
    }

    fn hour(start: &str, end: &str) -> Interval {
        Interval::new(date(start), date(end))
    }

    fn create_test_store() -> (IntervalStore, TempDir) {
        let dir = tempdir().unwrap();
        let store = IntervalStore::open(StoreConfig::new(dir.path()).journal_size(0)).unwrap();
        (store, dir)
    }

    fn reopen(dir: &TempDir) -> IntervalStore {
        IntervalStore::open(StoreConfig::new(dir.path()).journal_size(0)).unwrap()
    }

    fn collect_oldest_first(store: &mut IntervalStore) -> Vec<String> {
        store
            .lines_oldest_first()
            .collect::<StoreResult<Vec<_>>>()
            .unwrap()
    }

    fn collect_newest_first(store: &mut IntervalStore) -> Vec<String> {
        store
            .lines_newest_first()
            .collect::<StoreResult<Vec<_>>>()
            .unwrap()
    }

    fn assert_chronological(lines: &[String]) {
        for pair in lines.windows(2) {
            assert_ne!(
                compare_lines(&pair[0], &pair[1]),
                Ordering::Greater,
                "'{}' sorts after '{}'",
                pair[0],
                pair[1]
            );
        }
    }

    /// Seven one-hour intervals spanning four years, deliberately shuffled
    fn common_inputs() -> Vec<Interval> {
        [
            ("2016-06-03T01:00:00", "2016-06-03T02:00:00"),
            ("2018-06-02T01:00:00", "2018-06-02T02:00:00"),
            ("2019-06-03T01:00:00", "2019-06-03T02:00:00"),
            ("2017-06-02T01:00:00", "2017-06-02T02:00:00"),
            ("2018-06-03T01:00:00", "2018-06-03T02:00:00"),
            ("2019-06-02T01:00:00", "2019-06-02T02:00:00"),
            ("2016-06-02T01:00:00", "2016-06-02T02:00:00"),
        ]
        .iter()
        .map(|(start, end)| hour(start, end))
        .collect()
    }

    #[test]
    fn test_store_remains_sorted_when_added_out_of_order() {
        let (mut store, dir) = create_test_store();

        for interval in common_inputs() {
            store.add_interval(&interval).unwrap();
        }
        store.commit().unwrap();

        let mut store = reopen(&dir);
        let lines = collect_oldest_first(&mut store);
        assert_eq!(lines.len(), 7);
        assert_chronological(&lines);
    }

    #[test]
    fn test_add_after_reload_stays_sorted() {
        let (mut store, dir) = create_test_store();
        for interval in common_inputs() {
            store.add_interval(&interval).unwrap();
        }
        store.commit().unwrap();

        let mut store = reopen(&dir);
        store
            .add_interval(&hour("1980-01-01T12:01:01", "1980-01-01T12:01:02"))
            .unwrap();

        let lines = collect_oldest_first(&mut store);
        assert_eq!(lines.len(), 8);
        assert_chronological(&lines);
        assert!(store.files().contains(&"1980-01.data".to_string()));
    }

    #[test]
    fn test_forward_and_reverse_iterators_agree() {
        let (mut store, dir) = create_test_store();
        for interval in common_inputs() {
            store.add_interval(&interval).unwrap();
        }
        store.commit().unwrap();

        let mut store = reopen(&dir);
        let mut newest = collect_newest_first(&mut store);
        newest.reverse();
        assert_eq!(newest, collect_oldest_first(&mut store));
    }

    #[test]
    fn test_file_list_stays_sorted_by_month() {
        let (mut store, _dir) = create_test_store();

        store.add_interval(&hour("2016-06-02T01:00:00", "2016-06-02T02:00:00")).unwrap();
        store.add_interval(&hour("2018-06-02T01:00:00", "2018-06-02T02:00:00")).unwrap();
        store.add_interval(&hour("2017-06-02T01:00:00", "2017-06-02T02:00:00")).unwrap();

        assert_eq!(
            store.files(),
            vec!["2016-06.data", "2017-06.data", "2018-06.data"]
        );
    }

    #[test]
    fn test_interval_routes_to_its_month_file() {
        let (mut store, _dir) = create_test_store();

        for interval in common_inputs() {
            store.add_interval(&interval).unwrap();
        }

        // A month-straddling interval belongs to the month of its start.
        store
            .add_interval(&hour("2016-06-30T23:00:00", "2016-07-01T01:00:00"))
            .unwrap();

        assert!(!store.files().contains(&"2016-07.data".to_string()));

        // A start exactly on a month boundary opens the next month's file.
        store
            .add_interval(&hour("2016-07-01T00:00:00", "2016-07-01T01:00:00"))
            .unwrap();
        assert!(store.files().contains(&"2016-07.data".to_string()));
    }

    #[test]
    fn test_add_then_delete_restores_prestate() {
        let (mut store, dir) = create_test_store();

        store
            .add_interval(&hour("2020-01-01T09:00:00", "2020-01-01T10:00:00").tag("work"))
            .unwrap();
        store.commit().unwrap();

        let datafile_path = dir.path().join("2020-01.data");
        let before = std::fs::read_to_string(&datafile_path).unwrap();

        let extra = hour("2020-01-02T09:00:00", "2020-01-02T10:00:00").tag("work");
        store.add_interval(&extra).unwrap();
        store.delete_interval(&extra).unwrap();
        store.commit().unwrap();

        assert_eq!(std::fs::read_to_string(&datafile_path).unwrap(), before);
        assert_eq!(store.tag_count("work"), Some(1));
    }

    #[test]
    fn test_delete_without_covering_file_is_not_found() {
        let (mut store, _dir) = create_test_store();

        store
            .add_interval(&hour("2020-01-01T09:00:00", "2020-01-01T10:00:00").tag("work"))
            .unwrap();

        let missing = hour("1999-05-01T09:00:00", "1999-05-01T10:00:00").tag("work");
        let err = store.delete_interval(&missing).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        // Validate-first: the failed delete must not touch tag counts.
        assert_eq!(store.tag_count("work"), Some(1));
    }

    #[test]
    fn test_add_rejects_start_after_end() {
        let (mut store, _dir) = create_test_store();

        let backwards = hour("2020-01-01T10:00:00", "2020-01-01T09:00:00");
        let err = store.add_interval(&backwards).unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));

        assert!(store.empty().unwrap());
    }

    #[test]
    fn test_modify_moves_interval_between_months() {
        let (mut store, _dir) = create_test_store();

        let original = hour("2020-01-31T23:00:00", "2020-01-31T23:30:00").tag("work");
        store.add_interval(&original).unwrap();

        let moved = hour("2020-02-01T09:00:00", "2020-02-01T09:30:00").tag("work");
        store.modify_interval(Some(&original), Some(&moved)).unwrap();

        let lines = collect_oldest_first(&mut store);
        assert_eq!(lines, vec![moved.to_line()]);
        assert_eq!(store.tag_count("work"), Some(1));
        assert!(store.files().contains(&"2020-02.data".to_string()));
    }

    #[test]
    fn test_new_tag_signaling() {
        let (mut store, _dir) = create_test_store();

        let first = store
            .add_interval(&hour("2020-01-01T09:00:00", "2020-01-01T10:00:00").tag("work"))
            .unwrap();
        assert_eq!(
            first.tag_changes,
            vec![TagChange {
                tag: "work".to_string(),
                was_new: true
            }]
        );
        assert!(first.recorded);

        let second = store
            .add_interval(&hour("2020-01-02T09:00:00", "2020-01-02T10:00:00").tag("work"))
            .unwrap();
        assert_eq!(
            second.tag_changes,
            vec![TagChange {
                tag: "work".to_string(),
                was_new: false
            }]
        );
    }

    #[test]
    fn test_latest_entry_returns_open_interval() {
        let (mut store, _dir) = create_test_store();

        store
            .add_interval(&hour("2020-03-10T08:00:00", "2020-03-10T09:00:00"))
            .unwrap();
        store
            .add_interval(&Interval::open(date("2020-03-10T11:00:00")).tag("work"))
            .unwrap();

        let latest = store.latest_entry().unwrap().unwrap();
        let parsed = Interval::from_line(&latest).unwrap();
        assert!(parsed.is_open());
        assert_eq!(parsed.start(), date("2020-03-10T11:00:00"));
    }

    #[test]
    fn test_latest_entry_on_empty_store() {
        let (mut store, _dir) = create_test_store();
        assert_eq!(store.latest_entry().unwrap(), None);
        assert!(store.empty().unwrap());
    }

    #[test]
    fn test_segment_range_splits_by_month() {
        let (store, _dir) = create_test_store();

        let range = TimeRange::new(date("2016-02-20T00:00:00"), date("2016-04-15T00:00:00"));
        let segments = store.segment_range(&range);

        assert_eq!(
            segments,
            vec![
                TimeRange::new(date("2016-02-01T00:00:00"), date("2016-03-01T00:00:00")),
                TimeRange::new(date("2016-03-01T00:00:00"), date("2016-04-01T00:00:00")),
                TimeRange::new(date("2016-04-01T00:00:00"), date("2016-05-01T00:00:00")),
            ]
        );

        // Contiguous and month aligned.
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_segment_range_materializes_open_end_as_now() {
        let (store, _dir) = create_test_store();

        let open = TimeRange::open(Utc::now() - chrono::Duration::hours(2));
        let segments = store.segment_range(&open);

        assert!(!segments.is_empty());
        let last = segments.last().unwrap();
        assert!(!last.is_open());
        assert!(last.contains(Utc::now()));
    }

    #[test]
    fn test_segment_range_year_rollover() {
        let (store, _dir) = create_test_store();

        let range = TimeRange::new(date("2019-12-15T00:00:00"), date("2020-01-10T00:00:00"));
        let segments = store.segment_range(&range);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, date("2019-12-01T00:00:00"));
        assert_eq!(segments[1].end, date("2020-02-01T00:00:00"));
    }

    #[test]
    fn test_tag_index_rebuilds_from_interval_data() {
        let (mut store, dir) = create_test_store();

        store
            .add_interval(
                &hour("2020-01-01T09:00:00", "2020-01-01T10:00:00")
                    .tag("a")
                    .tag("b"),
            )
            .unwrap();
        store
            .add_interval(
                &hour("2020-01-02T09:00:00", "2020-01-02T10:00:00")
                    .tag("b")
                    .tag("c"),
            )
            .unwrap();
        store.commit().unwrap();

        std::fs::remove_file(dir.path().join("tags.data")).unwrap();

        let store = reopen(&dir);
        assert_eq!(store.tags(), vec!["a", "b", "c"]);
        assert_eq!(store.tag_count("a"), Some(1));
        assert_eq!(store.tag_count("b"), Some(2));
        assert_eq!(store.tag_count("c"), Some(1));

        // The rebuilt sidecar is written back immediately.
        let sidecar = std::fs::read_to_string(dir.path().join("tags.data")).unwrap();
        assert!(sidecar.contains("\"b\""));
        assert!(sidecar.contains("\"count\": 2"));
    }

    #[test]
    fn test_corrupt_tag_sidecar_triggers_rebuild() {
        let (mut store, dir) = create_test_store();

        store
            .add_interval(&hour("2020-01-01T09:00:00", "2020-01-01T10:00:00").tag("work"))
            .unwrap();
        store.commit().unwrap();

        std::fs::write(dir.path().join("tags.data"), "{ not json").unwrap();

        let store = reopen(&dir);
        assert_eq!(store.tag_count("work"), Some(1));
    }

    #[test]
    fn test_undo_reverses_single_add() {
        let (mut store, _dir) = create_test_store();

        let interval = hour("2020-01-01T09:00:00", "2020-01-01T10:00:00").tag("work");
        store.add_interval(&interval).unwrap();

        assert!(store.undo().unwrap());
        assert!(store.empty().unwrap());
        assert_eq!(store.tag_count("work"), Some(0));

        // Nothing left to undo.
        assert!(!store.undo().unwrap());
    }

    #[test]
    fn test_transaction_groups_modify_for_undo() {
        let (mut store, _dir) = create_test_store();

        let original = hour("2020-01-01T09:00:00", "2020-01-01T10:00:00").tag("work");
        store.add_interval(&original).unwrap();
        store.commit().unwrap();

        let replacement = hour("2020-01-01T09:30:00", "2020-01-01T10:30:00").tag("work");
        store.journal().start_transaction().unwrap();
        store
            .modify_interval(Some(&original), Some(&replacement))
            .unwrap();
        store.journal().end_transaction().unwrap();

        assert!(store.undo().unwrap());

        let lines = collect_oldest_first(&mut store);
        assert_eq!(lines, vec![original.to_line()]);
        assert_eq!(store.tag_count("work"), Some(1));
    }

    #[test]
    fn test_failed_modify_rolls_back_via_undo() {
        let (mut store, _dir) = create_test_store();

        // Most recent entries: a closed block and a still-running one.
        let closed = hour("2020-03-10T09:00:00", "2020-03-10T11:00:00").tag("work");
        let running = Interval::open(date("2020-03-10T11:11:00")).tag("work");
        store.add_interval(&closed).unwrap();
        store.add_interval(&running).unwrap();
        store.commit().unwrap();

        let before = collect_oldest_first(&mut store);

        // Moving the closed block's start past its end is rejected mid-way
        // through the delete-then-add, after the delete already happened.
        let invalid = hour("2020-03-10T11:01:00", "2020-03-10T11:00:00").tag("work");
        store.journal().start_transaction().unwrap();
        let err = store
            .modify_interval(Some(&closed), Some(&invalid))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation(_)));
        store.journal().end_transaction().unwrap();

        assert!(store.undo().unwrap());
        assert_eq!(collect_oldest_first(&mut store), before);
        assert_eq!(store.tag_count("work"), Some(2));
    }

    #[test]
    fn test_commit_then_reopen_preserves_everything() {
        let (mut store, dir) = create_test_store();

        let tagged = hour("2020-01-01T09:00:00", "2020-01-01T10:00:00")
            .tag("deep work")
            .annotate("quarterly report");
        store.add_interval(&tagged).unwrap();
        store.commit().unwrap();

        let mut store = reopen(&dir);
        let lines = collect_oldest_first(&mut store);
        assert_eq!(lines, vec![tagged.to_line()]);
        assert_eq!(store.tag_count("deep work"), Some(1));
        assert_eq!(store.files(), vec!["2020-01.data"]);
    }

    #[test]
    fn test_dump_lists_files() {
        let (mut store, _dir) = create_test_store();
        store
            .add_interval(&hour("2020-01-01T09:00:00", "2020-01-01T10:00:00"))
            .unwrap();

        let dump = store.dump();
        assert!(dump.contains("IntervalStore"));
        assert!(dump.contains("2020-01.data"));
    }
}
