/// Escape a string for use inside a single-quoted SQL literal.
///
/// Every embedded `'` is doubled; nothing else is touched.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Escape and wrap a string as a SQL literal: `O'Brien` → `'O''Brien'`.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", escape_literal(value))
}
