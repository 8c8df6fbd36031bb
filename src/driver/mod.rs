/// Driver Module
///
/// The seam between the connection facade and a concrete MySQL client.
/// A `Driver` opens connections; a `DriverConnection` is one live session.
/// Both are blocking: every call returns once the server has answered.
///
/// ## Implementations
///
/// - `MysqlDriver` (`mysql_client.rs`, feature `mysql`): the `mysql` crate's
///   synchronous client
/// - `ScriptedDriver` (`scripted.rs`): an in-process server double with
///   scripted responses, used by the test suites
use crate::config::ConnectOptions;
use crate::core::mirror::ErrorInfo;
use std::collections::VecDeque;

#[cfg(feature = "mysql")]
pub mod mysql_client;
pub mod scripted;

#[cfg(feature = "mysql")]
pub use mysql_client::{MysqlConnection, MysqlDriver};
pub use scripted::{Response, ScriptedConnection, ScriptedDriver};

/// Client error code for an unclassified failure (`CR_UNKNOWN_ERROR`).
pub const CR_UNKNOWN_ERROR: u32 = 2000;
/// Client error code raised when a command is sent while a batch still has
/// unread results (`CR_COMMANDS_OUT_OF_SYNC`).
pub const CR_COMMANDS_OUT_OF_SYNC: u32 = 2014;
/// General SQLSTATE used for client-side errors.
pub const SQLSTATE_GENERAL: &str = "HY000";

/// Opens driver connections.
pub trait Driver {
    type Connection: DriverConnection;

    /// Opens a session. Unset options fall back to the driver's defaults.
    /// The error carries the connection-error message and code.
    fn open(&self, options: &ConnectOptions) -> Result<Self::Connection, ErrorInfo>;
}

/// One live session with the server.
///
/// Fallible calls report success as a flag and leave the details in
/// `last_error`, which reflects the most recent call.
pub trait DriverConnection {
    /// Ends the session. Returns false if the driver refused.
    fn close(&mut self) -> bool;

    /// Escapes `raw` for inclusion between single quotes.
    fn escape(&self, raw: &str) -> String;

    /// Runs one statement.
    fn query(&mut self, sql: &str) -> QueryOutcome;

    /// Submits several `;`-separated statements at once. Returns false if
    /// the first statement failed.
    fn multi_query(&mut self, sql: &str) -> bool;

    /// Takes the current result set of a batch, if the current statement
    /// produced one.
    fn use_result(&mut self) -> Option<ResultSet>;

    /// Returns true while the batch has results after the current one.
    fn more_results(&self) -> bool;

    /// Advances to the next result of the batch. Returns false when there
    /// is none or the next statement failed.
    fn next_result(&mut self) -> bool;

    fn set_autocommit(&mut self, enabled: bool) -> bool;

    fn commit(&mut self) -> bool;

    fn rollback(&mut self) -> bool;

    /// Error of the most recent call, `ErrorInfo::default()` if none.
    fn last_error(&self) -> ErrorInfo;

    /// Id generated by the most recent statement, `0` if none.
    fn insert_id(&self) -> u64;

    fn affected_rows(&self) -> u64;
}

/// What a single statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The statement succeeded without a result set (DDL/DML)
    Done,
    /// The statement returned rows
    Rows(ResultSet),
    /// The statement failed; see `DriverConnection::last_error`
    Failed,
}

/// A fully read result set in text form. `None` cells are SQL `NULL`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        ResultSet { columns, rows }
    }

    /// First column of the first row.
    pub fn first_value(&self) -> Option<&str> {
        self.rows.first()?.first()?.as_deref()
    }
}

/// Result bookkeeping for one submitted multi-statement batch.
///
/// Each statement leaves one entry: `Some` for a result set, `None` for a
/// statement without rows. When a statement fails the batch stops there and
/// its error is reported once the cursor advances onto it.
#[derive(Debug, Default)]
pub struct BatchCursor {
    current: Option<Option<ResultSet>>,
    pending: VecDeque<Option<ResultSet>>,
    deferred_error: Option<ErrorInfo>,
}

impl BatchCursor {
    /// Loads the results of a freshly submitted batch, replacing any
    /// previous state. The first entry becomes current.
    pub fn load(&mut self, results: Vec<Option<ResultSet>>, error: Option<ErrorInfo>) {
        self.pending = results.into();
        self.current = self.pending.pop_front();
        self.deferred_error = error;
    }

    pub fn take_current(&mut self) -> Option<ResultSet> {
        self.current.take().flatten()
    }

    /// Returns true while results are still waiting to be advanced over.
    /// A connection refuses new commands in that state.
    pub fn has_more(&self) -> bool {
        !self.pending.is_empty() || self.deferred_error.is_some()
    }

    /// Moves to the next entry. `Err` carries the error of the statement
    /// that stopped the batch; `Ok(false)` means the batch is exhausted.
    pub fn advance(&mut self) -> Result<bool, ErrorInfo> {
        self.current = None;
        if let Some(next) = self.pending.pop_front() {
            self.current = Some(next);
            return Ok(true);
        }
        match self.deferred_error.take() {
            Some(error) => Err(error),
            None => Ok(false),
        }
    }

    /// The error a connection reports when a command arrives mid-batch.
    pub fn out_of_sync() -> ErrorInfo {
        ErrorInfo::new(
            CR_COMMANDS_OUT_OF_SYNC,
            SQLSTATE_GENERAL,
            "Commands out of sync; you can't run this command now",
        )
    }
}

/// Escapes a string for use inside a single-quoted MySQL literal.
///
/// Follows `mysql_real_escape_string` for ASCII-compatible character sets.
/// Sessions running with `NO_BACKSLASH_ESCAPES` need quote doubling instead,
/// which this does not detect.
pub fn escape_string(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + raw.len() / 8);
    for c in raw.chars() {
        match c {
            '\0' => escaped.push_str("\\0"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '"' => escaped.push_str("\\\""),
            '\x1a' => escaped.push_str("\\Z"),
            other => escaped.push(other),
        }
    }
    escaped
}
