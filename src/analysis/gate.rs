//! Lexical read-only gate for model-generated SQL
//!
//! The check is purely textual: the statement must open with `SELECT` or
//! `WITH` and must not mention any data-modifying or DDL keyword as a whole
//! word. It does not parse SQL, so it can reject harmless text (a string
//! literal containing `'drop'`) and it is not a substitute for running
//! queries under a read-only database role.

use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(with|select)\b").expect("leading keyword pattern"));

static FORBIDDEN_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(insert|update|delete|drop|alter|truncate|create|grant|revoke)\b")
        .expect("forbidden keyword pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GatePolicy {
    /// Accept text after an interior `;`. Off by default.
    pub allow_multiple_statements: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    Accepted,
    Rejected(String),
}

impl GateVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, GateVerdict::Accepted)
    }
}

/// Classify `sql` as safe to execute or rejected.
pub fn gate(sql: &str, policy: &GatePolicy) -> GateVerdict {
    if sql.trim().is_empty() {
        return GateVerdict::Rejected("empty statement".to_string());
    }

    if !LEADING_KEYWORD.is_match(sql) {
        return GateVerdict::Rejected("statement must start with SELECT or WITH".to_string());
    }

    if let Some(found) = FORBIDDEN_KEYWORD.find(sql) {
        return GateVerdict::Rejected(format!(
            "forbidden keyword `{}`",
            found.as_str().to_ascii_lowercase()
        ));
    }

    if !policy.allow_multiple_statements && has_interior_separator(sql) {
        return GateVerdict::Rejected("multiple statements are not allowed".to_string());
    }

    GateVerdict::Accepted
}

/// A `;` followed by anything other than whitespace or more `;`.
fn has_interior_separator(sql: &str) -> bool {
    sql.trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .contains(';')
}

/// `sql` without trailing semicolons, ready to hand to the store.
pub fn strip_trailing_semicolons(sql: &str) -> &str {
    let mut candidate = sql.trim();
    while let Some(stripped) = candidate.strip_suffix(';') {
        candidate = stripped.trim_end();
    }
    candidate
}
