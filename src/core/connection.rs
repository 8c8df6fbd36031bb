/// Connection Facade Module
///
/// `Mysqlii` wraps at most one driver connection and adds what the raw
/// driver leaves to the caller: a mirrored error state refreshed after each
/// fallible call, locally tracked transaction state, quoting, and
/// multi-statement execution that always drains the batch.
///
/// ## Error handling
///
/// No operation returns `Err` or panics. Failures are reported as `false`
/// or a sentinel (`-1`, `None`) and the details are read back through
/// `error`, `error_number` and `sqlstate`. When no connection is bound each
/// operation answers with its documented default and records
/// `MysqliiError::NotConnected` in the internal error channel.
use crate::config::{ConnectOptions, Config, DEFAULT_QUERY_DELIMITER};
use crate::core::error::MysqliiError;
use crate::core::mirror::{ErrorInfo, ErrorOverride};
use crate::driver::{Driver, DriverConnection, QueryOutcome};
use tracing::{debug, warn};

/// Transaction state as tracked by the facade's own methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// No transaction started through this facade (autocommit mode)
    #[default]
    Autocommit,
    /// `begin_transaction` was called and not yet finished
    Transaction,
}

/// Connection facade over a `Driver`.
///
/// # Examples
///
/// ```
/// use mysqlii::{ConnectOptions, Mysqlii, ScriptedDriver};
///
/// let mut db = Mysqlii::new(ScriptedDriver::new());
/// assert!(db.connect(&ConnectOptions::new().host("localhost").dbname("test")));
/// assert!(db.exec_multiple(["CREATE TABLE t (id INT)", "INSERT INTO t VALUES (1)"]));
/// assert_eq!(db.quote(Some("it's"), false), "'it\\'s'");
/// assert!(db.close());
/// ```
#[derive(Debug)]
pub struct Mysqlii<D: Driver> {
    driver: D,
    /// Live driver connection (None before `connect` or after `close`)
    conn: Option<D::Connection>,
    /// Mirrored driver error (None after a refresh with no connection bound)
    last_error: Option<ErrorInfo>,
    internal_error: Option<MysqliiError>,
    query_delimiter: String,
    transaction_state: TransactionState,
}

impl<D: Driver> Mysqlii<D> {
    /// Creates a facade with no connection bound.
    pub fn new(driver: D) -> Self {
        Mysqlii {
            driver,
            conn: None,
            last_error: Some(ErrorInfo::default()),
            internal_error: None,
            query_delimiter: DEFAULT_QUERY_DELIMITER.to_string(),
            transaction_state: TransactionState::default(),
        }
    }

    /// Creates a facade bound to an already opened connection.
    pub fn with_connection(driver: D, conn: D::Connection) -> Self {
        let mut facade = Self::new(driver);
        facade.conn = Some(conn);
        facade
    }

    /// Creates an unconnected facade with the session settings of `config`.
    /// Connect with `connect(&config.connection)`.
    pub fn from_config(driver: D, config: &Config) -> Self {
        let mut facade = Self::new(driver);
        facade.set_query_delimiter(config.session.query_delimiter.clone());
        facade
    }

    /// Opens a new connection and binds it, closing any connection held
    /// before. Returns true if the driver reported no connection error.
    pub fn connect(&mut self, options: &ConnectOptions) -> bool {
        if self.conn.is_some() && !self.close() {
            warn!("previous connection refused to close; dropping it");
            self.conn = None;
        }
        self.transaction_state = TransactionState::Autocommit;

        debug!(host = ?options.host, dbname = ?options.dbname, "connecting");
        match self.driver.open(options) {
            Ok(conn) => {
                self.conn = Some(conn);
                self.check_errors(ErrorOverride::default());
                true
            }
            Err(error) => {
                warn!(code = error.code, "connection failed: {}", error.message);
                let mirrored = ErrorOverride::connect(&error).resolve(ErrorInfo::default());
                self.last_error = Some(mirrored);
                false
            }
        }
    }

    /// Releases the connection. Succeeds trivially when none is bound; keeps
    /// the connection and returns false if the driver fails to close it.
    pub fn close(&mut self) -> bool {
        let Some(conn) = self.conn.as_mut() else {
            return true;
        };
        if conn.close() {
            debug!("connection closed");
            self.conn = None;
            true
        } else {
            warn!("driver failed to close the connection");
            false
        }
    }

    /// Same as `close`.
    pub fn disconnect(&mut self) -> bool {
        self.close()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Quotes `value` as a MySQL string literal using the driver's escaping.
    ///
    /// With `check_null`, a missing value becomes the bare token `NULL`;
    /// otherwise it quotes as an empty string. With no connection bound the
    /// result is always `''`.
    pub fn quote(&self, value: Option<&str>, check_null: bool) -> String {
        if check_null && value.is_none() {
            return "NULL".to_string();
        }
        match &self.conn {
            Some(conn) => format!("'{}'", conn.escape(value.unwrap_or_default())),
            None => "''".to_string(),
        }
    }

    /// Runs a statement that returns no rows and refreshes the error mirror.
    /// Returns true only when the driver reports plain success; a result set
    /// counts as failure.
    pub fn exec(&mut self, sql: &str) -> bool {
        self.internal_error = None;
        let Some(conn) = self.conn.as_mut() else {
            self.internal_error = Some(MysqliiError::NotConnected);
            return false;
        };
        let outcome = conn.query(sql);
        self.check_errors(ErrorOverride::default());
        match outcome {
            QueryOutcome::Done => true,
            QueryOutcome::Rows(set) => {
                debug!(rows = set.rows.len(), "exec received a result set");
                false
            }
            QueryOutcome::Failed => false,
        }
    }

    /// Joins `statements` with the query delimiter, sends them as one batch
    /// and drains every result the batch produces.
    ///
    /// Returns false for an empty batch (without contacting the driver) or
    /// if any error is mirrored once the batch has been drained.
    pub fn exec_multiple<I, S>(&mut self, statements: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.internal_error = None;
        let statements: Vec<S> = statements.into_iter().collect();
        if statements.is_empty() {
            self.internal_error = Some(MysqliiError::EmptyBatch);
            return false;
        }
        let Some(conn) = self.conn.as_mut() else {
            self.internal_error = Some(MysqliiError::NotConnected);
            return false;
        };

        let sql = statements
            .iter()
            .map(|statement| statement.as_ref())
            .collect::<Vec<&str>>()
            .join(self.query_delimiter.as_str());

        conn.multi_query(&sql);
        let mut results = 0usize;
        loop {
            if let Some(set) = conn.use_result() {
                drop(set);
            }
            results += 1;
            if !(conn.more_results() && conn.next_result()) {
                break;
            }
        }
        debug!(statements = statements.len(), results, "batch drained");

        self.check_errors(ErrorOverride::default());
        !self.has_error()
    }

    /// Runs `sql` and returns the first column of its first row as text.
    ///
    /// `None` covers a missing connection, a failed statement, a statement
    /// without a result set, an empty result and a SQL `NULL`.
    pub fn fetch_one(&mut self, sql: &str) -> Option<String> {
        self.internal_error = None;
        let Some(conn) = self.conn.as_mut() else {
            self.internal_error = Some(MysqliiError::NotConnected);
            return None;
        };
        let outcome = conn.query(sql);
        self.check_errors(ErrorOverride::default());
        match outcome {
            QueryOutcome::Rows(set) => set.first_value().map(str::to_string),
            QueryOutcome::Done | QueryOutcome::Failed => None,
        }
    }

    /// Marks a transaction as started and turns autocommit off.
    pub fn begin_transaction(&mut self) -> bool {
        self.internal_error = None;
        let Some(conn) = self.conn.as_mut() else {
            self.internal_error = Some(MysqliiError::NotConnected);
            return false;
        };
        self.transaction_state = TransactionState::Transaction;
        debug!("transaction started");
        let started = conn.set_autocommit(false);
        self.check_errors(ErrorOverride::default());
        started
    }

    /// Commits; with `finish`, also finishes the transaction whatever the
    /// commit returned. Returns the commit's own result.
    pub fn commit(&mut self, finish: bool) -> bool {
        self.internal_error = None;
        let Some(conn) = self.conn.as_mut() else {
            self.internal_error = Some(MysqliiError::NotConnected);
            return false;
        };
        let committed = conn.commit();
        if !committed {
            warn!("commit failed");
        }
        self.check_errors(ErrorOverride::default());
        if finish {
            self.end_transaction();
        }
        committed
    }

    /// Rolls back; with `finish`, also finishes the transaction whatever the
    /// rollback returned. Returns the rollback's own result.
    pub fn roll_back(&mut self, finish: bool) -> bool {
        self.internal_error = None;
        let Some(conn) = self.conn.as_mut() else {
            self.internal_error = Some(MysqliiError::NotConnected);
            return false;
        };
        let rolled_back = conn.rollback();
        if !rolled_back {
            warn!("rollback failed");
        }
        self.check_errors(ErrorOverride::default());
        if finish {
            self.end_transaction();
        }
        rolled_back
    }

    /// Marks the transaction as finished and turns autocommit back on.
    pub fn finish_transaction(&mut self) -> bool {
        self.internal_error = None;
        if self.conn.is_none() {
            self.internal_error = Some(MysqliiError::NotConnected);
            return false;
        }
        let finished = self.end_transaction();
        self.check_errors(ErrorOverride::default());
        finished
    }

    /// Resets the local state and re-enables autocommit. The mirror is only
    /// refreshed on failure, so an earlier commit or rollback error stays.
    fn end_transaction(&mut self) -> bool {
        self.transaction_state = TransactionState::Autocommit;
        debug!("transaction finished");
        let finished = self
            .conn
            .as_mut()
            .is_some_and(|conn| conn.set_autocommit(true));
        if !finished {
            self.check_errors(ErrorOverride::default());
        }
        finished
    }

    /// Returns the transaction state recorded by this facade's methods.
    pub fn transaction_state(&self) -> TransactionState {
        self.transaction_state
    }

    /// Asks the server whether autocommit is off for this session.
    pub fn server_in_transaction(&mut self) -> bool {
        match self.fetch_one("SELECT @@autocommit") {
            Some(autocommit) => autocommit.trim() == "0",
            None => false,
        }
    }

    /// With `check_by_server` false, reports the locally tracked state; this
    /// only follows transactions begun and finished through this facade.
    /// With `check_by_server` true, asks the server instead.
    pub fn in_transaction(&mut self, check_by_server: bool) -> bool {
        if check_by_server {
            self.server_in_transaction()
        } else {
            self.transaction_state == TransactionState::Transaction
        }
    }

    /// Returns the id generated by the last insert, or `-1` with no
    /// connection. With `renew`, asks the server for `LAST_INSERT_ID()`
    /// instead of using the driver's cached value, which also sees ids
    /// generated by triggers; `-1` if that query fails.
    ///
    /// Ids above `i64::MAX` (possible on `BIGINT UNSIGNED` columns) are
    /// reported as `i64::MAX`.
    pub fn last_insert_id(&mut self, renew: bool) -> i64 {
        self.internal_error = None;
        let Some(conn) = self.conn.as_ref() else {
            self.internal_error = Some(MysqliiError::NotConnected);
            return -1;
        };
        if !renew {
            return clamp_count(conn.insert_id());
        }
        self.fetch_one("SELECT LAST_INSERT_ID()")
            .and_then(|id| id.trim().parse::<u64>().ok())
            .map_or(-1, clamp_count)
    }

    /// Rows changed by the last statement, or `-1` with no connection.
    /// Counts above `i64::MAX` are reported as `i64::MAX`.
    pub fn affected_rows(&self) -> i64 {
        self.conn
            .as_ref()
            .map_or(-1, |conn| clamp_count(conn.affected_rows()))
    }

    /// Mirrored error code; `None` after a refresh with no connection bound.
    pub fn error_number(&self) -> Option<u32> {
        self.last_error.as_ref().map(|e| e.code)
    }

    /// Mirrored error message; `None` after a refresh with no connection bound.
    pub fn error(&self) -> Option<&str> {
        self.last_error.as_ref().map(|e| e.message.as_str())
    }

    /// Mirrored SQLSTATE; `None` after a refresh with no connection bound.
    pub fn sqlstate(&self) -> Option<&str> {
        self.last_error.as_ref().map(|e| e.sqlstate.as_str())
    }

    pub fn last_error(&self) -> Option<&ErrorInfo> {
        self.last_error.as_ref()
    }

    /// Message of the last facade-level problem, empty if there is none.
    pub fn internal_error(&self) -> String {
        self.internal_error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    /// True if the mirrored message or the internal error is non-empty.
    pub fn has_error(&self) -> bool {
        self.error().is_some_and(|message| !message.is_empty()) || self.internal_error.is_some()
    }

    pub fn set_query_delimiter(&mut self, delimiter: impl Into<String>) {
        self.query_delimiter = delimiter.into();
    }

    pub fn query_delimiter(&self) -> &str {
        &self.query_delimiter
    }

    /// Refreshes the error mirror from the driver, letting explicit values
    /// in `overrides` win. Without a connection every field becomes absent.
    fn check_errors(&mut self, overrides: ErrorOverride) {
        self.last_error = self
            .conn
            .as_ref()
            .map(|conn| overrides.resolve(conn.last_error()));

        if let Some(error) = self.last_error.as_ref().filter(|e| e.is_error()) {
            debug!(code = error.code, sqlstate = %error.sqlstate, "driver error: {}", error.message);
        }
    }
}

/// Narrows a driver counter to the facade's signed return, saturating at
/// `i64::MAX` so large values never collide with the `-1` sentinel.
fn clamp_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl<D: Driver> Drop for Mysqlii<D> {
    fn drop(&mut self) {
        self.close();
    }
}
