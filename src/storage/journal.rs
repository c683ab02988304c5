//! Undo journal
//!
//! An append-only log of reversible actions, grouped into transactions so a
//! multi-step mutation can be reverted as one unit. Every record append
//! updates both the in-memory log and the on-disk file (through the atomic
//! writer), so the journal survives a crash mid-command.
//!
//! Format, one record per line with sentinel lines around each group:
//!
//! ```text
//! txn start
//! interval {"before":"","after":"inc 20200101T090000Z - 20200101T100000Z"}
//! txn end
//! ```
//!
//! On load the full file is parsed; a trailing group without its `txn end`
//! is accepted as a complete transaction (the crash tail). A corrupt line
//! stops the load, keeping the valid prefix.

use crate::storage::atomic::AtomicFile;
use crate::storage::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const TXN_START: &str = "txn start";
const TXN_END: &str = "txn end";

/// What kind of state an undo record reverses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// The payloads are serialized interval lines
    Interval,
    /// Reserved for configuration changes
    Config,
}

impl ActionKind {
    fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Interval => "interval",
            ActionKind::Config => "config",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "interval" => Some(ActionKind::Interval),
            "config" => Some(ActionKind::Config),
            _ => None,
        }
    }
}

/// One reversible action: the serialized state before and after.
/// An empty string means "absent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoAction {
    pub kind: ActionKind,
    pub before: String,
    pub after: String,
}

/// Payload half of a record line
#[derive(Serialize, Deserialize)]
struct ActionPayload {
    before: String,
    after: String,
}

/// A contiguous group of actions reverted as one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    actions: Vec<UndoAction>,
}

impl Transaction {
    /// Actions in application order
    pub fn actions(&self) -> &[UndoAction] {
        &self.actions
    }
}

/// How many transactions the journal retains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JournalLimit {
    /// Persistence turned off entirely
    Disabled,
    /// Keep everything
    Unbounded,
    /// Keep at most this many transactions, pruning from the oldest end
    Transactions(usize),
}

impl From<i32> for JournalLimit {
    fn from(size: i32) -> Self {
        match size {
            s if s < 0 => JournalLimit::Disabled,
            0 => JournalLimit::Unbounded,
            s => JournalLimit::Transactions(s as usize),
        }
    }
}

/// Transaction-grouped undo log with a bounded on-disk footprint
pub struct Journal {
    path: PathBuf,
    limit: JournalLimit,
    transactions: Vec<Transaction>,
    /// `Some` while a transaction is open
    current: Option<Transaction>,
    recording: bool,
}

impl Journal {
    /// Open the journal at `path`, loading any existing log.
    ///
    /// `journal_size` bounds the number of retained transactions: `0` keeps
    /// everything, a negative value disables persistence altogether.
    pub fn new(path: impl Into<PathBuf>, journal_size: i32) -> StoreResult<Self> {
        let path = path.into();
        let limit = JournalLimit::from(journal_size);

        let mut journal = Self {
            path,
            limit,
            transactions: Vec::new(),
            current: None,
            recording: true,
        };

        if limit != JournalLimit::Disabled && journal.path.exists() {
            let content = AtomicFile::read_to_string(&journal.path)?;
            journal.transactions = parse_log(&content, &journal.path);
            if journal.prune() {
                journal.persist()?;
            }
        }

        Ok(journal)
    }

    /// Begin an explicit transaction. Nesting is flat; a second start
    /// before the matching end is an error.
    pub fn start_transaction(&mut self) -> StoreResult<()> {
        if self.current.is_some() {
            return Err(StoreError::InvariantViolation(
                "journal transaction is already open".to_string(),
            ));
        }
        self.current = Some(Transaction::default());
        Ok(())
    }

    /// Close the open transaction, making it the newest undoable unit
    pub fn end_transaction(&mut self) -> StoreResult<()> {
        let transaction = self.current.take().ok_or_else(|| {
            StoreError::InvariantViolation("no journal transaction is open".to_string())
        })?;

        // A group that recorded nothing has nothing to undo.
        if transaction.actions.is_empty() {
            return Ok(());
        }

        self.transactions.push(transaction);
        self.prune();
        self.persist()
    }

    /// Append one interval record, inside the open transaction if there is
    /// one, as a single-record transaction otherwise
    pub fn record_interval_action(
        &mut self,
        before: impl Into<String>,
        after: impl Into<String>,
    ) -> StoreResult<()> {
        if !self.recording {
            return Ok(());
        }

        let action = UndoAction {
            kind: ActionKind::Interval,
            before: before.into(),
            after: after.into(),
        };

        match self.current.as_mut() {
            Some(transaction) => transaction.actions.push(action),
            None => {
                self.transactions.push(Transaction {
                    actions: vec![action],
                });
                self.prune();
            }
        }

        self.persist()
    }

    /// Remove and return the newest transaction. Only valid outside an
    /// open transaction.
    pub fn pop_last_transaction(&mut self) -> StoreResult<Option<Transaction>> {
        if self.current.is_some() {
            return Err(StoreError::InvariantViolation(
                "cannot undo while a journal transaction is open".to_string(),
            ));
        }

        let popped = self.transactions.pop();
        if popped.is_some() {
            self.persist()?;
        }
        Ok(popped)
    }

    /// Suspend or resume recording; used while undo records are replayed
    /// so the replay does not journal itself
    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    /// Number of retained transactions
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// True when nothing can be undone
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Journal file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn prune(&mut self) -> bool {
        if let JournalLimit::Transactions(max) = self.limit {
            if self.transactions.len() > max {
                let excess = self.transactions.len() - max;
                self.transactions.drain(..excess);
                return true;
            }
        }
        false
    }

    /// Rewrite the whole log atomically, including the open tail
    fn persist(&self) -> StoreResult<()> {
        if self.limit == JournalLimit::Disabled {
            return Ok(());
        }

        let mut out = String::new();
        for transaction in &self.transactions {
            render_transaction(&mut out, transaction, true);
        }
        if let Some(open) = &self.current {
            render_transaction(&mut out, open, false);
        }

        AtomicFile::write(&self.path, out)
            .map_err(|e| StoreError::JournalFull(e.to_string()))
    }
}

fn render_transaction(out: &mut String, transaction: &Transaction, closed: bool) {
    out.push_str(TXN_START);
    out.push('\n');
    for action in &transaction.actions {
        let payload = ActionPayload {
            before: action.before.clone(),
            after: action.after.clone(),
        };
        // ActionPayload has no map values, so this cannot fail.
        let json = serde_json::to_string(&payload).unwrap_or_default();
        out.push_str(action.kind.as_str());
        out.push(' ');
        out.push_str(&json);
        out.push('\n');
    }
    if closed {
        out.push_str(TXN_END);
        out.push('\n');
    }
}

fn parse_log(content: &str, path: &Path) -> Vec<Transaction> {
    let mut transactions = Vec::new();
    let mut current: Option<Transaction> = None;

    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line == TXN_START {
            if let Some(unclosed) = current.take() {
                tracing::warn!(
                    "journal {:?}: transaction without '{}' at line {}",
                    path,
                    TXN_END,
                    number + 1
                );
                if !unclosed.actions.is_empty() {
                    transactions.push(unclosed);
                }
            }
            current = Some(Transaction::default());
            continue;
        }

        if line == TXN_END {
            match current.take() {
                Some(transaction) if !transaction.actions.is_empty() => {
                    transactions.push(transaction)
                }
                Some(_) => {}
                None => {
                    tracing::warn!(
                        "journal {:?}: stray '{}' at line {}",
                        path,
                        TXN_END,
                        number + 1
                    );
                }
            }
            continue;
        }

        let parsed = line.split_once(' ').and_then(|(kind, json)| {
            let kind = ActionKind::parse(kind)?;
            let payload: ActionPayload = serde_json::from_str(json).ok()?;
            Some(UndoAction {
                kind,
                before: payload.before,
                after: payload.after,
            })
        });

        match parsed {
            Some(action) => match current.as_mut() {
                Some(transaction) => transaction.actions.push(action),
                None => transactions.push(Transaction {
                    actions: vec![action],
                }),
            },
            None => {
                // Keep the valid prefix and stop, as with any corrupt log.
                tracing::warn!(
                    "journal {:?}: unreadable record at line {}, keeping {} transactions",
                    path,
                    number + 1,
                    transactions.len()
                );
                return transactions;
            }
        }
    }

    // Crash tail: the process died between a record append and 'txn end'.
    if let Some(tail) = current {
        if !tail.actions.is_empty() {
            transactions.push(tail);
        }
    }

    transactions
}
