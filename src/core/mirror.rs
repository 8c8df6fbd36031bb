/// Error Mirror Module
///
/// Holds the snapshot of the driver's most recent error. The snapshot is
/// always replaced as a whole so message, code and SQLSTATE never disagree.
use std::fmt;

/// SQLSTATE reported when no error occurred.
pub const SQLSTATE_OK: &str = "00000";

/// Message, numeric code and SQLSTATE of one driver error.
///
/// A code of `0` with an empty message is the driver's "no error" state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub message: String,
    pub code: u32,
    pub sqlstate: String,
}

impl ErrorInfo {
    pub fn new(code: u32, sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorInfo {
            message: message.into(),
            code,
            sqlstate: sqlstate.into(),
        }
    }

    /// Returns true if this snapshot describes an actual error.
    pub fn is_error(&self) -> bool {
        !self.message.is_empty() || self.code != 0
    }
}

impl Default for ErrorInfo {
    fn default() -> Self {
        ErrorInfo {
            message: String::new(),
            code: 0,
            sqlstate: SQLSTATE_OK.to_string(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.sqlstate, self.message)
    }
}

/// Explicit values that take precedence over the driver's live error fields
/// when the mirror is refreshed.
#[derive(Debug, Clone, Default)]
pub(crate) struct ErrorOverride {
    pub message: Option<String>,
    pub code: Option<u32>,
    pub sqlstate: Option<String>,
}

impl ErrorOverride {
    /// Override carrying a connection error: message and code are explicit,
    /// the state falls back to its default.
    pub fn connect(error: &ErrorInfo) -> Self {
        ErrorOverride {
            message: Some(error.message.clone()),
            code: Some(error.code),
            sqlstate: Some(String::new()),
        }
    }

    /// Merges the override with the driver's fields, substituting the
    /// defaults for empty values.
    pub fn resolve(self, live: ErrorInfo) -> ErrorInfo {
        let message = self.message.unwrap_or(live.message);
        let code = self.code.unwrap_or(live.code);
        let mut sqlstate = self.sqlstate.unwrap_or(live.sqlstate);
        if sqlstate.is_empty() {
            sqlstate = SQLSTATE_OK.to_string();
        }

        ErrorInfo {
            message,
            code,
            sqlstate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_no_error() {
        let info = ErrorInfo::default();
        assert_eq!(info.message, "");
        assert_eq!(info.code, 0);
        assert_eq!(info.sqlstate, "00000");
        assert!(!info.is_error());
    }

    #[test]
    fn test_display() {
        let info = ErrorInfo::new(1146, "42S02", "Table 'test.nope' doesn't exist");
        assert_eq!(info.to_string(), "1146 (42S02): Table 'test.nope' doesn't exist");
        assert!(info.is_error());
    }

    #[test]
    fn test_resolve_prefers_explicit_values() {
        let live = ErrorInfo::new(1064, "42000", "syntax error");
        let resolved = ErrorOverride {
            message: Some("custom".to_string()),
            code: None,
            sqlstate: None,
        }
        .resolve(live);

        assert_eq!(resolved, ErrorInfo::new(1064, "42000", "custom"));
    }

    #[test]
    fn test_resolve_substitutes_defaults() {
        let live = ErrorInfo::new(0, "", "");
        assert_eq!(ErrorOverride::default().resolve(live), ErrorInfo::default());
    }

    #[test]
    fn test_connect_override_defaults_state() {
        let refused = ErrorInfo::new(2002, "HY000", "Connection refused");
        let resolved = ErrorOverride::connect(&refused).resolve(ErrorInfo::default());

        assert_eq!(resolved.code, 2002);
        assert_eq!(resolved.message, "Connection refused");
        assert_eq!(resolved.sqlstate, "00000");
    }
}
