//! Driver backed by the blocking `mysql` crate.
use super::{
    escape_string, BatchCursor, Driver, DriverConnection, QueryOutcome, ResultSet,
    CR_UNKNOWN_ERROR, SQLSTATE_GENERAL,
};
use crate::config::ConnectOptions;
use crate::core::mirror::ErrorInfo;
use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder, Row, Value};
use tracing::{debug, warn};

/// Opens sessions with `mysql::Conn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDriver;

impl MysqlDriver {
    pub fn new() -> Self {
        MysqlDriver
    }
}

fn opts_from(options: &ConnectOptions) -> OptsBuilder {
    let mut builder = OptsBuilder::new()
        .ip_or_hostname(options.host.clone())
        .user(options.user.clone())
        .pass(options.password.clone())
        .db_name(options.dbname.clone())
        .socket(options.socket.clone());
    if let Some(port) = options.port {
        builder = builder.tcp_port(port);
    }
    builder
}

/// Converts a client error into mirrorable fields.
fn error_info(err: &mysql::Error) -> ErrorInfo {
    match err {
        mysql::Error::MySqlError(server) => {
            ErrorInfo::new(u32::from(server.code), server.state.clone(), server.message.clone())
        }
        other => ErrorInfo::new(CR_UNKNOWN_ERROR, SQLSTATE_GENERAL, other.to_string()),
    }
}

fn text_cell(value: Value) -> Option<String> {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Value::Int(i) => Some(i.to_string()),
        Value::UInt(u) => Some(u.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Double(d) => Some(d.to_string()),
        other => Some(other.as_sql(true).trim_matches('\'').to_string()),
    }
}

fn text_row(row: Row) -> Vec<Option<String>> {
    row.unwrap().into_iter().map(text_cell).collect()
}

impl Driver for MysqlDriver {
    type Connection = MysqlConnection;

    fn open(&self, options: &ConnectOptions) -> Result<MysqlConnection, ErrorInfo> {
        debug!(host = ?options.host, port = ?options.port, "opening mysql connection");
        match Conn::new(opts_from(options)) {
            Ok(conn) => Ok(MysqlConnection {
                conn: Some(conn),
                batch: BatchCursor::default(),
                error: ErrorInfo::default(),
                insert_id: 0,
                affected_rows: 0,
            }),
            Err(err) => {
                let info = error_info(&err);
                warn!(code = info.code, "mysql connection failed: {}", info.message);
                Err(info)
            }
        }
    }
}

/// A live `mysql::Conn`. Result sets are read completely when a statement
/// is submitted; batches are then replayed through a `BatchCursor`.
pub struct MysqlConnection {
    conn: Option<Conn>,
    batch: BatchCursor,
    error: ErrorInfo,
    insert_id: u64,
    affected_rows: u64,
}

impl std::fmt::Debug for MysqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MysqlConnection")
            .field("open", &self.conn.is_some())
            .field("batch", &self.batch)
            .field("error", &self.error)
            .finish()
    }
}

impl MysqlConnection {
    /// Sends `sql` and buffers every result set it produces. Statements that
    /// return no rows leave `None`. Reading stops at the first error.
    fn run(&mut self, sql: &str) -> (Vec<Option<ResultSet>>, Option<ErrorInfo>) {
        let mut sets = Vec::new();
        if self.batch.has_more() {
            return (sets, Some(BatchCursor::out_of_sync()));
        }
        let Some(conn) = self.conn.as_mut() else {
            let gone = ErrorInfo::new(2006, SQLSTATE_GENERAL, "MySQL server has gone away");
            return (sets, Some(gone));
        };

        let mut failure = None;
        match conn.query_iter(sql) {
            Ok(mut result) => {
                'sets: while let Some(set) = result.iter() {
                    let columns: Vec<String> = set
                        .columns()
                        .as_ref()
                        .iter()
                        .map(|column| column.name_str().into_owned())
                        .collect();
                    let mut rows = Vec::new();
                    for row in set {
                        match row {
                            Ok(row) => rows.push(text_row(row)),
                            Err(err) => {
                                failure = Some(error_info(&err));
                                break 'sets;
                            }
                        }
                    }
                    sets.push(if columns.is_empty() {
                        None
                    } else {
                        Some(ResultSet::new(columns, rows))
                    });
                }
            }
            Err(err) => failure = Some(error_info(&err)),
        }

        self.insert_id = conn.last_insert_id();
        self.affected_rows = conn.affected_rows();
        (sets, failure)
    }

    fn run_drop(&mut self, sql: &str) -> bool {
        match self.run(sql) {
            (_, None) => {
                self.error = ErrorInfo::default();
                true
            }
            (_, Some(error)) => {
                debug!(code = error.code, sqlstate = %error.sqlstate, "mysql command failed");
                self.error = error;
                false
            }
        }
    }
}

impl DriverConnection for MysqlConnection {
    fn close(&mut self) -> bool {
        // Dropping the connection sends COM_QUIT.
        if self.conn.take().is_some() {
            debug!("mysql connection closed");
        }
        self.batch = BatchCursor::default();
        true
    }

    fn escape(&self, raw: &str) -> String {
        escape_string(raw)
    }

    fn query(&mut self, sql: &str) -> QueryOutcome {
        let (sets, failure) = self.run(sql);
        if let Some(error) = failure {
            self.error = error;
            return QueryOutcome::Failed;
        }
        self.error = ErrorInfo::default();
        match sets.into_iter().next().flatten() {
            Some(set) => QueryOutcome::Rows(set),
            None => QueryOutcome::Done,
        }
    }

    fn multi_query(&mut self, sql: &str) -> bool {
        let (sets, failure) = self.run(sql);
        if sets.is_empty() {
            self.error =
                failure.unwrap_or_else(|| ErrorInfo::new(1065, "42000", "Query was empty"));
            return false;
        }
        self.batch.load(sets, failure);
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
        self.run_drop(if enabled {
            "SET autocommit=1"
        } else {
            "SET autocommit=0"
        })
    }

    fn commit(&mut self) -> bool {
        self.run_drop("COMMIT")
    }

    fn rollback(&mut self) -> bool {
        self.run_drop("ROLLBACK")
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
