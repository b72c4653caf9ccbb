//! Statement text helpers: placeholder rewriting, literal inlining and
//! identifier validation.
//!
//! Statements are written with the portable `?` placeholder. A `?` inside a
//! quoted string, a quoted identifier or a comment is not a placeholder.

use scopedb_proto::Value;

use crate::connection::Dialect;
use crate::error::{Error, Result};

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Code,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

/// Byte offsets of every placeholder in `sql`.
fn placeholder_positions(sql: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut state = ScanState::Code;
    let mut chars = sql.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        state = match (state, c) {
            (ScanState::Code, '?') => {
                positions.push(i);
                ScanState::Code
            }
            (ScanState::Code, '\'') => ScanState::SingleQuoted,
            (ScanState::Code, '"') => ScanState::DoubleQuoted,
            (ScanState::Code, '-') if matches!(chars.peek(), Some((_, '-'))) => {
                chars.next();
                ScanState::LineComment
            }
            (ScanState::Code, '/') if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                ScanState::BlockComment
            }
            // A doubled quote re-enters the literal on the next character.
            (ScanState::SingleQuoted, '\'') => ScanState::Code,
            (ScanState::DoubleQuoted, '"') => ScanState::Code,
            (ScanState::LineComment, '\n') => ScanState::Code,
            (ScanState::BlockComment, '*') if matches!(chars.peek(), Some((_, '/'))) => {
                chars.next();
                ScanState::Code
            }
            (s, _) => s,
        };
    }

    positions
}

/// Count the placeholders in a portable statement.
pub fn count_placeholders(sql: &str) -> usize {
    placeholder_positions(sql).len()
}

/// Rewrite portable `?` placeholders into the dialect's numbered form.
pub fn rewrite_placeholders(sql: &str, dialect: Dialect) -> String {
    let positions = placeholder_positions(sql);
    if positions.is_empty() {
        return sql.to_string();
    }

    let mut out = String::with_capacity(sql.len() + positions.len() * 2);
    let mut last = 0;
    for (n, &pos) in positions.iter().enumerate() {
        out.push_str(&sql[last..pos]);
        out.push_str(dialect.placeholder_prefix());
        out.push_str(&(n + 1).to_string());
        last = pos + 1;
    }
    out.push_str(&sql[last..]);
    out
}

/// Render a value as an SQL literal.
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Float64(f) if f.is_finite() => format!("{:?}", f),
        Value::Float64(_) => "NULL".to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bytes(b) => {
            let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
            format!("X'{}'", hex)
        }
    }
}

/// Substitute bound values for placeholders as literals.
///
/// Used for DDL, where neither SQLite nor PostgreSQL accept bound
/// parameters. The placeholder count must match the value count exactly.
pub fn inline_parameters(sql: &str, params: &[Value]) -> Result<String> {
    let positions = placeholder_positions(sql);
    if positions.len() != params.len() {
        return Err(Error::query_failed(
            sql,
            format!(
                "statement has {} placeholders but {} values were bound",
                positions.len(),
                params.len()
            ),
        ));
    }

    let mut out = String::with_capacity(sql.len() + params.len() * 4);
    let mut last = 0;
    for (&pos, value) in positions.iter().zip(params) {
        out.push_str(&sql[last..pos]);
        out.push_str(&sql_literal(value));
        last = pos + 1;
    }
    out.push_str(&sql[last..]);
    Ok(out)
}

/// Check that `name` is a plain, optionally schema-qualified, SQL identifier.
///
/// Table names read from configuration or from the database are interpolated
/// into statement text, so they must pass this check first.
pub fn validate_identifier(name: &str) -> Result<&str> {
    let parts: Vec<&str> = name.split('.').collect();
    let valid = parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                }
                _ => false,
            }
        });

    if valid {
        Ok(name)
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_placeholders() {
        assert_eq!(count_placeholders("SELECT 1"), 0);
        assert_eq!(count_placeholders("SELECT * FROM users WHERE user_name=?"), 1);
        assert_eq!(
            count_placeholders("SELECT EXISTS(SELECT * FROM permissions WHERE (user_id,permission)=(?,?))"),
            2
        );
    }

    #[test]
    fn test_quoted_question_marks_are_literals() {
        let sql = "SELECT '?' AS q, \"what?\" FROM t WHERE a=? AND b='it''s ?'";
        assert_eq!(count_placeholders(sql), 1);
    }

    #[test]
    fn test_comments_are_skipped() {
        let sql = "SELECT a -- why?\nFROM t /* maybe? */ WHERE b=?";
        assert_eq!(count_placeholders(sql), 1);
    }

    #[test]
    fn test_rewrite_sqlite() {
        let sql = "SELECT * FROM t WHERE a=? AND b=?";
        assert_eq!(
            rewrite_placeholders(sql, Dialect::Sqlite),
            "SELECT * FROM t WHERE a=?1 AND b=?2"
        );
    }

    #[test]
    fn test_rewrite_postgres() {
        let sql = "SELECT * FROM t WHERE a=? AND b='?' AND c=?";
        assert_eq!(
            rewrite_placeholders(sql, Dialect::Postgres),
            "SELECT * FROM t WHERE a=$1 AND b='?' AND c=$2"
        );
    }

    #[test]
    fn test_inline_parameters() {
        let sql = "SELECT * FROM t WHERE a=? OR b=? OR c=?";
        let out = inline_parameters(
            sql,
            &[Value::Int64(7), Value::from("O'Neil"), Value::Null],
        )
        .unwrap();
        assert_eq!(out, "SELECT * FROM t WHERE a=7 OR b='O''Neil' OR c=NULL");
    }

    #[test]
    fn test_inline_parameters_count_mismatch() {
        let err = inline_parameters("SELECT ?", &[]).unwrap_err();
        assert!(matches!(err, Error::QueryFailed { .. }));
    }

    #[test]
    fn test_sql_literals() {
        assert_eq!(sql_literal(&Value::Bool(true)), "TRUE");
        assert_eq!(sql_literal(&Value::Float64(1.5)), "1.5");
        assert_eq!(sql_literal(&Value::Bytes(vec![0, 255])), "X'00ff'");
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("isolates").is_ok());
        assert!(validate_identifier("public.isolates_set_2").is_ok());
        assert!(validate_identifier("_v1").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1isolates").is_err());
        assert!(validate_identifier("isolates; DROP TABLE users").is_err());
        assert!(validate_identifier("a.b.c").is_err());
        assert!(validate_identifier("isolates ").is_err());
    }
}
