/// Mysqlii Error Module
///
/// This module defines the error type for the facade-level problems and the
/// ambient APIs (configuration loading). Statement and connection failures
/// reported by the server never travel through this type; they live in the
/// error mirror (see `core::mirror`).
use thiserror::Error;

/// Error type for conditions detected by the facade itself.
///
/// The connection facade never returns these; `NotConnected` and
/// `EmptyBatch` are recorded in its internal error channel instead. The
/// remaining variants come out of configuration loading.
#[derive(Error, Debug)]
pub enum MysqliiError {
    /// An operation needed a driver connection but none was bound
    #[error("no database connection is bound")]
    NotConnected,

    /// A multi-statement batch was submitted without any statements
    #[error("multi-statement batch is empty")]
    EmptyBatch,

    /// Configuration validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Type alias for Result to use MysqliiError as the error type.
pub type Result<T> = std::result::Result<T, MysqliiError>;
