//! Property-based tests for quoting and escaping
//!
//! These tests verify that:
//! - Every quoted value is a single, closed string literal
//! - Escaping can be reversed to recover the input
//! - `NULL` handling depends only on the `check_null` flag

#[cfg(test)]
mod tests {
    use mysqlii::driver::escape_string;
    use mysqlii::{ConnectOptions, Mysqlii, ScriptedDriver};
    use proptest::prelude::*;

    fn connected() -> Mysqlii<ScriptedDriver> {
        let mut db = Mysqlii::new(ScriptedDriver::new());
        assert!(db.connect(&ConnectOptions::default()));
        db
    }

    /// Reverses MySQL backslash escaping.
    fn unescape(escaped: &str) -> String {
        let mut out = String::new();
        let mut chars = escaped.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('0') => out.push('\0'),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('Z') => out.push('\x1a'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        }
        out
    }

    /// Returns true if no quote in `body` terminates the literal early.
    fn quotes_all_escaped(body: &str) -> bool {
        let mut escaped = false;
        for c in body.chars() {
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '\'') => return false,
                _ => {}
            }
        }
        !escaped
    }

    fn arb_sql_text() -> impl Strategy<Value = String> {
        prop_oneof![
            any::<String>(),
            "[a-z' \"\\\\\\n\\r\\x00\\x1a]{0,40}".prop_map(|s: String| s),
        ]
    }

    proptest! {
        #[test]
        fn prop_quote_wraps_in_single_quotes(value in arb_sql_text(), check_null in any::<bool>()) {
            let db = connected();
            let quoted = db.quote(Some(value.as_str()), check_null);

            prop_assert!(quoted.len() >= 2);
            prop_assert!(quoted.starts_with('\''));
            prop_assert!(quoted.ends_with('\''));
            prop_assert!(quotes_all_escaped(&quoted[1..quoted.len() - 1]));
        }

        #[test]
        fn prop_escape_is_reversible(value in arb_sql_text()) {
            prop_assert_eq!(unescape(&escape_string(&value)), value);
        }

        #[test]
        fn prop_quote_uses_driver_escaping(value in arb_sql_text()) {
            let db = connected();
            prop_assert_eq!(db.quote(Some(value.as_str()), false), format!("'{}'", escape_string(&value)));
        }

        #[test]
        fn prop_null_token_only_with_check_null(check_null in any::<bool>()) {
            let db = connected();
            let quoted = db.quote(None, check_null);
            if check_null {
                prop_assert_eq!(quoted, "NULL");
            } else {
                prop_assert_eq!(quoted, "''");
            }
        }

        #[test]
        fn prop_unbound_quote_is_empty_literal(value in arb_sql_text()) {
            let db = Mysqlii::new(ScriptedDriver::new());
            prop_assert_eq!(db.quote(Some(value.as_str()), false), "''");
            prop_assert_eq!(db.quote(None, true), "NULL");
        }
    }
}
