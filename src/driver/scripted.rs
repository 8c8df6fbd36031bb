//! In-process server double for exercising the facade without a MySQL server.
//!
//! A `ScriptedDriver` owns a shared server state. Every connection it opens
//! talks to that state, so a test can keep a clone of the driver and inspect
//! what happened after the facade has taken ownership of the connection.
use super::{
    escape_string, BatchCursor, Driver, DriverConnection, QueryOutcome, ResultSet,
    SQLSTATE_GENERAL,
};
use crate::config::ConnectOptions;
use crate::core::mirror::ErrorInfo;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Scripted answer to one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Success without rows
    Ok { affected_rows: u64, insert_id: u64 },
    /// Success with a result set
    Rows(ResultSet),
    /// Server error
    Error(ErrorInfo),
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok {
            affected_rows: 0,
            insert_id: 0,
        }
    }

    pub fn affected(affected_rows: u64) -> Self {
        Response::Ok {
            affected_rows,
            insert_id: 0,
        }
    }

    /// A single-row insert that generated `insert_id`.
    pub fn inserted(insert_id: u64) -> Self {
        Response::Ok {
            affected_rows: 1,
            insert_id,
        }
    }

    pub fn rows(columns: &[&str], rows: Vec<Vec<Option<&str>>>) -> Self {
        Response::Rows(ResultSet::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.into_iter()
                .map(|row| row.into_iter().map(|v| v.map(str::to_string)).collect())
                .collect(),
        ))
    }

    pub fn error(code: u32, sqlstate: &str, message: &str) -> Self {
        Response::Error(ErrorInfo::new(code, sqlstate, message))
    }
}

#[derive(Debug)]
struct ServerState {
    responses: HashMap<String, Response>,
    connect_error: Option<ErrorInfo>,
    close_fails: bool,
    commit_error: Option<ErrorInfo>,
    rollback_error: Option<ErrorInfo>,
    autocommit: bool,
    last_insert_id: u64,
    open_connections: usize,
    commits: usize,
    rollbacks: usize,
    log: Vec<String>,
}

impl Default for ServerState {
    fn default() -> Self {
        ServerState {
            responses: HashMap::new(),
            connect_error: None,
            close_fails: false,
            commit_error: None,
            rollback_error: None,
            autocommit: true,
            last_insert_id: 0,
            open_connections: 0,
            commits: 0,
            rollbacks: 0,
            log: Vec::new(),
        }
    }
}

type SharedState = Arc<Mutex<ServerState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, ServerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Splits a batch on `;` outside quoted literals and backtick identifiers.
/// Backslash escapes inside quotes are honoured. Comments and `DELIMITER`
/// are not understood.
fn split_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in sql.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' && q != '`' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                ';' => {
                    statements.push(&sql[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    statements.push(&sql[start..]);
    statements
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn normalize(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Driver whose server answers from a script.
///
/// Unscripted statements succeed without rows. `SELECT @@autocommit` and
/// `SELECT LAST_INSERT_ID()` answer from the session state.
/// Batches are split on `;` outside quotes; comments are not parsed.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    state: SharedState,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the answer to `sql`. Matching ignores case and whitespace runs.
    pub fn respond(&self, sql: &str, response: Response) -> &Self {
        lock(&self.state).responses.insert(normalize(sql), response);
        self
    }

    /// Makes every following `open` fail with `error`.
    pub fn fail_connect(&self, error: ErrorInfo) -> &Self {
        lock(&self.state).connect_error = Some(error);
        self
    }

    /// Makes `close` on open connections report failure.
    pub fn fail_close(&self, fails: bool) -> &Self {
        lock(&self.state).close_fails = fails;
        self
    }

    /// Makes `COMMIT` fail with `error`; `None` lets it succeed again.
    pub fn fail_commit(&self, error: Option<ErrorInfo>) -> &Self {
        lock(&self.state).commit_error = error;
        self
    }

    /// Makes `ROLLBACK` fail with `error`; `None` lets it succeed again.
    pub fn fail_rollback(&self, error: Option<ErrorInfo>) -> &Self {
        lock(&self.state).rollback_error = error;
        self
    }

    /// Overrides the server-side `LAST_INSERT_ID()`, as a trigger would.
    pub fn set_server_last_insert_id(&self, id: u64) -> &Self {
        lock(&self.state).last_insert_id = id;
        self
    }

    pub fn autocommit(&self) -> bool {
        lock(&self.state).autocommit
    }

    /// Forces the session autocommit value behind the facade's back.
    pub fn set_autocommit(&self, enabled: bool) -> &Self {
        lock(&self.state).autocommit = enabled;
        self
    }

    pub fn open_connections(&self) -> usize {
        lock(&self.state).open_connections
    }

    pub fn commits(&self) -> usize {
        lock(&self.state).commits
    }

    pub fn rollbacks(&self) -> usize {
        lock(&self.state).rollbacks
    }

    /// Statements the server received, in order, as sent.
    pub fn log(&self) -> Vec<String> {
        lock(&self.state).log.clone()
    }
}

impl Driver for ScriptedDriver {
    type Connection = ScriptedConnection;

    fn open(&self, options: &ConnectOptions) -> Result<ScriptedConnection, ErrorInfo> {
        let mut state = lock(&self.state);
        if let Some(error) = state.connect_error.clone() {
            debug!(code = error.code, "scripted connect refused");
            return Err(error);
        }
        state.open_connections += 1;
        debug!(host = ?options.host, "scripted connection opened");

        Ok(ScriptedConnection {
            state: Arc::clone(&self.state),
            open: true,
            batch: BatchCursor::default(),
            error: ErrorInfo::default(),
            insert_id: 0,
            affected_rows: 0,
        })
    }
}

/// Connection opened by a `ScriptedDriver`.
#[derive(Debug)]
pub struct ScriptedConnection {
    state: SharedState,
    open: bool,
    batch: BatchCursor,
    error: ErrorInfo,
    insert_id: u64,
    affected_rows: u64,
}

impl ScriptedConnection {
    fn gone() -> ErrorInfo {
        ErrorInfo::new(2006, SQLSTATE_GENERAL, "MySQL server has gone away")
    }

    /// Refuses commands on a closed session or while a batch is unread.
    fn ensure_ready(&mut self) -> bool {
        if !self.open {
            self.error = Self::gone();
            return false;
        }
        if self.batch.has_more() {
            self.error = BatchCursor::out_of_sync();
            return false;
        }
        true
    }

    /// Executes one statement against the server state.
    fn run(&mut self, sql: &str) -> Result<Option<ResultSet>, ErrorInfo> {
        let mut state = lock(&self.state);
        state.log.push(sql.to_string());

        let key = normalize(sql);
        let response = match state.responses.get(&key) {
            Some(response) => response.clone(),
            None => match key.as_str() {
                "SELECT @@AUTOCOMMIT" => Response::rows(
                    &["@@autocommit"],
                    vec![vec![Some(if state.autocommit { "1" } else { "0" })]],
                ),
                "SELECT LAST_INSERT_ID()" => {
                    let id = state.last_insert_id.to_string();
                    Response::rows(&["LAST_INSERT_ID()"], vec![vec![Some(id.as_str())]])
                }
                _ => Response::ok(),
            },
        };

        match response {
            Response::Ok {
                affected_rows,
                insert_id,
            } => {
                self.affected_rows = affected_rows;
                self.insert_id = insert_id;
                if insert_id > 0 {
                    state.last_insert_id = insert_id;
                }
                Ok(None)
            }
            Response::Rows(set) => {
                self.affected_rows = set.rows.len() as u64;
                self.insert_id = 0;
                Ok(Some(set))
            }
            Response::Error(error) => {
                self.affected_rows = 0;
                Err(error)
            }
        }
    }

    /// Runs a transaction-control command through the session state.
    fn control(
        &mut self,
        apply: impl FnOnce(&mut ServerState) -> Result<(), ErrorInfo>,
    ) -> bool {
        if !self.ensure_ready() {
            return false;
        }
        let applied = apply(&mut *lock(&self.state));
        match applied {
            Ok(()) => {
                self.error = ErrorInfo::default();
                true
            }
            Err(error) => {
                debug!(code = error.code, "scripted control command failed");
                self.error = error;
                false
            }
        }
    }
}

impl DriverConnection for ScriptedConnection {
    fn close(&mut self) -> bool {
        let mut state = lock(&self.state);
        if state.close_fails {
            return false;
        }
        if self.open {
            self.open = false;
            state.open_connections = state.open_connections.saturating_sub(1);
        }
        true
    }

    fn escape(&self, raw: &str) -> String {
        escape_string(raw)
    }

    fn query(&mut self, sql: &str) -> QueryOutcome {
        if !self.ensure_ready() {
            return QueryOutcome::Failed;
        }
        match self.run(sql) {
            Ok(result) => {
                self.error = ErrorInfo::default();
                match result {
                    Some(set) => QueryOutcome::Rows(set),
                    None => QueryOutcome::Done,
                }
            }
            Err(error) => {
                self.error = error;
                QueryOutcome::Failed
            }
        }
    }

    fn multi_query(&mut self, sql: &str) -> bool {
        if !self.ensure_ready() {
            return false;
        }

        let mut results = Vec::new();
        let mut failure = None;
        for statement in split_statements(sql) {
            match self.run(statement) {
                Ok(result) => results.push(result),
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        if results.is_empty() {
            self.batch = BatchCursor::default();
            self.error =
                failure.unwrap_or_else(|| ErrorInfo::new(1065, "42000", "Query was empty"));
            return false;
        }

        self.batch.load(results, failure);
        self.error = ErrorInfo::default();
        true
    }

    fn use_result(&mut self) -> Option<ResultSet> {
        self.batch.take_current()
    }

    fn more_results(&self) -> bool {
        self.batch.has_more()
    }

    fn next_result(&mut self) -> bool {
        match self.batch.advance() {
            Ok(advanced) => {
                self.error = ErrorInfo::default();
                advanced
            }
            Err(error) => {
                self.error = error;
                false
            }
        }
    }

    fn set_autocommit(&mut self, enabled: bool) -> bool {
        self.control(|state| {
            if enabled && !state.autocommit {
                state.commits += 1;
            }
            state.autocommit = enabled;
            state.log.push(format!("SET autocommit={}", u8::from(enabled)));
            Ok(())
        })
    }

    fn commit(&mut self) -> bool {
        self.control(|state| {
            state.log.push("COMMIT".to_string());
            if let Some(error) = state.commit_error.clone() {
                return Err(error);
            }
            state.commits += 1;
            Ok(())
        })
    }

    fn rollback(&mut self) -> bool {
        self.control(|state| {
            state.log.push("ROLLBACK".to_string());
            if let Some(error) = state.rollback_error.clone() {
                return Err(error);
            }
            state.rollbacks += 1;
            Ok(())
        })
    }

    fn last_error(&self) -> ErrorInfo {
        self.error.clone()
    }

    fn insert_id(&self) -> u64 {
        self.insert_id
    }

    fn affected_rows(&self) -> u64 {
        self.affected_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(driver: &ScriptedDriver) -> ScriptedConnection {
        driver.open(&ConnectOptions::default()).unwrap()
    }

    #[test]
    fn test_unscripted_statement_succeeds() {
        let driver = ScriptedDriver::new();
        let mut conn = connect(&driver);

        assert_eq!(conn.query("CREATE TABLE t (id INT)"), QueryOutcome::Done);
        assert!(!conn.last_error().is_error());
        assert_eq!(driver.log(), vec!["CREATE TABLE t (id INT)".to_string()]);
    }

    #[test]
    fn test_scripted_error() {
        let driver = ScriptedDriver::new();
        driver.respond(
            "select * from nope",
            Response::error(1146, "42S02", "Table 'test.nope' doesn't exist"),
        );
        let mut conn = connect(&driver);

        assert_eq!(conn.query("SELECT *  FROM nope"), QueryOutcome::Failed);
        assert_eq!(conn.last_error().code, 1146);
        assert_eq!(conn.last_error().sqlstate, "42S02");
    }

    #[test]
    fn test_connect_failure() {
        let driver = ScriptedDriver::new();
        driver.fail_connect(ErrorInfo::new(1045, "28000", "Access denied"));

        let err = driver.open(&ConnectOptions::default()).unwrap_err();
        assert_eq!(err.code, 1045);
        assert_eq!(driver.open_connections(), 0);
    }

    #[test]
    fn test_batch_blocks_until_drained() {
        let driver = ScriptedDriver::new();
        driver.respond("SELECT 1", Response::rows(&["1"], vec![vec![Some("1")]]));
        let mut conn = connect(&driver);

        assert!(conn.multi_query("SELECT 1;UPDATE t SET x = 1"));
        assert!(conn.more_results());
        assert_eq!(conn.query("SELECT 2"), QueryOutcome::Failed);
        assert_eq!(conn.last_error().code, 2014);

        assert!(conn.use_result().is_some());
        assert!(conn.next_result());
        assert!(conn.use_result().is_none());
        assert!(!conn.more_results());
        assert_eq!(conn.query("SELECT 2"), QueryOutcome::Done);
    }

    #[test]
    fn test_batch_stops_at_failing_statement() {
        let driver = ScriptedDriver::new();
        driver.respond("DELETE FROM nope", Response::error(1146, "42S02", "no table"));
        let mut conn = connect(&driver);

        assert!(conn.multi_query("UPDATE t SET x = 1; DELETE FROM nope; UPDATE t SET x = 2"));
        assert!(conn.more_results());
        assert!(!conn.next_result());
        assert_eq!(conn.last_error().code, 1146);
        assert_eq!(
            driver.log(),
            vec!["UPDATE t SET x = 1".to_string(), "DELETE FROM nope".to_string()]
        );
    }

    #[test]
    fn test_first_statement_failure_rejects_batch() {
        let driver = ScriptedDriver::new();
        driver.respond("BROKEN", Response::error(1064, "42000", "syntax"));
        let mut conn = connect(&driver);

        assert!(!conn.multi_query("BROKEN;SELECT 1"));
        assert!(!conn.more_results());
        assert_eq!(conn.last_error().code, 1064);
    }

    #[test]
    fn test_session_variables() {
        let driver = ScriptedDriver::new();
        driver.respond("INSERT INTO t VALUES (NULL)", Response::inserted(7));
        let mut conn = connect(&driver);

        assert_eq!(conn.query("INSERT INTO t VALUES (NULL)"), QueryOutcome::Done);
        assert_eq!(conn.insert_id(), 7);
        assert_eq!(conn.affected_rows(), 1);

        match conn.query("SELECT LAST_INSERT_ID()") {
            QueryOutcome::Rows(set) => assert_eq!(set.first_value(), Some("7")),
            other => panic!("Expected rows, got {:?}", other),
        }

        assert!(conn.set_autocommit(false));
        assert!(!driver.autocommit());
        match conn.query("select @@autocommit") {
            QueryOutcome::Rows(set) => assert_eq!(set.first_value(), Some("0")),
            other => panic!("Expected rows, got {:?}", other),
        }
    }

    #[test]
    fn test_close() {
        let driver = ScriptedDriver::new();
        let mut conn = connect(&driver);
        assert_eq!(driver.open_connections(), 1);

        driver.fail_close(true);
        assert!(!conn.close());
        assert_eq!(driver.open_connections(), 1);

        driver.fail_close(false);
        assert!(conn.close());
        assert_eq!(driver.open_connections(), 0);
        assert_eq!(conn.query("SELECT 1"), QueryOutcome::Failed);
        assert_eq!(conn.last_error().code, 2006);
    }

    #[test]
    fn test_split_statements_respects_quotes() {
        assert_eq!(
            split_statements("INSERT INTO t VALUES ('a;b'); SELECT \"x;y\";"),
            vec!["INSERT INTO t VALUES ('a;b')", "SELECT \"x;y\""]
        );
        assert_eq!(
            split_statements(r"SELECT 'it\'s; fine'; SELECT `odd;name` FROM t"),
            vec![r"SELECT 'it\'s; fine'", "SELECT `odd;name` FROM t"]
        );
        assert!(split_statements(" ; ;").is_empty());
    }

    #[test]
    fn test_batch_keeps_semicolon_in_literal() {
        let driver = ScriptedDriver::new();
        let mut conn = connect(&driver);

        assert!(conn.multi_query("INSERT INTO t VALUES ('a;b');UPDATE t SET x = 1"));
        assert_eq!(
            driver.log(),
            vec![
                "INSERT INTO t VALUES ('a;b')".to_string(),
                "UPDATE t SET x = 1".to_string(),
            ]
        );
    }

    #[test]
    fn test_scripted_commit_and_rollback_failures() {
        let driver = ScriptedDriver::new();
        driver.fail_commit(Some(ErrorInfo::new(1213, "40001", "Deadlock found")));
        driver.fail_rollback(Some(ErrorInfo::new(2013, "HY000", "Lost connection")));
        let mut conn = connect(&driver);

        assert!(!conn.commit());
        assert_eq!(conn.last_error().code, 1213);
        assert!(!conn.rollback());
        assert_eq!(conn.last_error().code, 2013);
        assert_eq!(driver.commits(), 0);
        assert_eq!(driver.rollbacks(), 0);

        driver.fail_commit(None);
        assert!(conn.commit());
        assert!(!conn.last_error().is_error());
        assert_eq!(driver.commits(), 1);
        assert_eq!(driver.log(), vec!["COMMIT", "ROLLBACK", "COMMIT"]);
    }
}
