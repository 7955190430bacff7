use crate::api::middleware::AppError;

pub const READ_ONLY_VIOLATION: &str = "only SELECT or WITH statements are permitted";

/// Statement-class policy for caller-supplied SQL.
///
/// This is a prefix check, not a parser: a statement is allowed when its first
/// token is `select` or it starts with `with `. Multi-statement payloads and
/// comment tricks are not detected.
pub struct SqlValidator;

impl SqlValidator {
    /// Reject anything that is not a SELECT or a WITH statement.
    pub fn validate_select_only(sql: &str) -> Result<&str, AppError> {
        let trimmed = sql.trim();
        let head = trimmed
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();

        if head != "select" && !trimmed.to_lowercase().starts_with("with ") {
            return Err(AppError::Policy(READ_ONLY_VIOLATION.to_string()));
        }

        Ok(trimmed)
    }

    /// Append `LIMIT max_rows` unless the statement already mentions ` limit `
    /// anywhere. Trailing terminators are stripped either way.
    ///
    /// Returns the final statement and whether a limit was appended.
    pub fn ensure_limit(sql: &str, max_rows: u64) -> (String, bool) {
        let statement = sql.trim().trim_end_matches(';');

        if Self::has_limit(statement) {
            (statement.to_string(), false)
        } else {
            (format!("{} LIMIT {}", statement, max_rows), true)
        }
    }

    /// Validate and prepare SQL query (validate SELECT-only and ensure LIMIT)
    pub fn validate_and_prepare(sql: &str, max_rows: u64) -> Result<(String, bool), AppError> {
        let validated = Self::validate_select_only(sql)?;
        Ok(Self::ensure_limit(validated, max_rows))
    }

    fn has_limit(statement: &str) -> bool {
        statement.to_lowercase().contains(" limit ")
    }
}
