/// Core Module for Mysqlii
///
/// This module contains the connection facade and the pieces it is built
/// from: the error mirror that snapshots driver errors and the crate's own
/// error type.

pub mod connection;
pub mod error;
pub mod mirror;

// Re-export commonly used types for convenience
pub use connection::{Mysqlii, TransactionState};
pub use error::{MysqliiError, Result};
pub use mirror::{ErrorInfo, SQLSTATE_OK};
