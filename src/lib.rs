//! A blocking MySQL connection facade.
//!
//! `Mysqlii` wraps one driver connection and smooths over its error
//! reporting: every fallible call answers with a flag or sentinel and leaves
//! the driver's message, code and SQLSTATE in a mirror that can be read
//! afterwards. On top of that it tracks transactions begun through it,
//! quotes values, and runs multi-statement batches to completion.

// Core infrastructure modules
pub mod core;

// Driver seam and implementations
pub mod config;
pub mod driver;

pub use crate::config::{load_config, Config, ConnectOptions, SessionConfig};
pub use crate::core::{ErrorInfo, Mysqlii, MysqliiError, Result, TransactionState};
#[cfg(feature = "mysql")]
pub use crate::driver::{MysqlConnection, MysqlDriver};
pub use crate::driver::{
    Driver, DriverConnection, QueryOutcome, ResultSet, Response, ScriptedConnection,
    ScriptedDriver,
};
