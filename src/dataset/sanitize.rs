//! Identifier sanitization
//!
//! Rewrites arbitrary header text into identifiers the store accepts
//! without quoting surprises: lowercase ASCII letters, digits and
//! underscores, never starting with a digit.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identifier produced for input with no usable characters.
pub const PLACEHOLDER_IDENTIFIER: &str = "_";

/// Prefix for generated table names.
const TABLE_PREFIX: &str = "ds";

/// Normalize an arbitrary string into a safe relational identifier.
///
/// Every character outside `[a-z0-9_]` (after lowercasing) becomes `_`,
/// runs of `_` collapse to one, and a leading digit gets an `_` prefix.
/// Total and idempotent: `sanitize_identifier(sanitize_identifier(x))`
/// equals `sanitize_identifier(x)`.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 1);

    for ch in raw.chars().flat_map(char::to_lowercase) {
        let ch = if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            ch
        } else {
            '_'
        };
        if ch == '_' && out.ends_with('_') {
            continue;
        }
        out.push(ch);
    }

    if out.is_empty() {
        return PLACEHOLDER_IDENTIFIER.to_string();
    }

    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }

    out
}

/// Whether `candidate` is already in sanitized form.
pub fn is_sanitized(candidate: &str) -> bool {
    !candidate.is_empty() && sanitize_identifier(candidate) == candidate
}

/// Sanitize a header row, suffixing `_2`, `_3`, ... on collisions.
///
/// # Arguments
/// * `headers` - Original header strings in column order
///
/// # Returns
/// Identifiers in the same order, unique within the returned vector
pub fn unique_identifiers<S: AsRef<str>>(headers: &[S]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(headers.len());
    let mut identifiers = Vec::with_capacity(headers.len());

    for header in headers {
        let base = sanitize_identifier(header.as_ref());
        let mut candidate = base.clone();
        let mut suffix = 2;

        while seen.contains(&candidate) {
            // "a_" + "_2" would reintroduce a double underscore
            candidate = format!("{}_{}", base.trim_end_matches('_'), suffix);
            suffix += 1;
        }

        seen.insert(candidate.clone());
        identifiers.push(candidate);
    }

    identifiers
}

/// Generate a collision-resistant table name for a new upload.
///
/// Combines the upload time in milliseconds with eight random hex digits,
/// e.g. `ds_1718035200000_9f1c2ab4`.
pub fn generate_table_name(now: DateTime<Utc>) -> String {
    let entropy = Uuid::new_v4().simple().to_string();
    sanitize_identifier(&format!(
        "{}_{}_{}",
        TABLE_PREFIX,
        now.timestamp_millis(),
        &entropy[..8]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn identifier_pattern() -> Regex {
        Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap()
    }

    #[test]
    fn test_sanitize_basic_header() {
        assert_eq!(sanitize_identifier("Customer Name"), "customer_name");
        assert_eq!(sanitize_identifier("Total ($)"), "total_");
        assert_eq!(sanitize_identifier("already_ok"), "already_ok");
    }

    #[test]
    fn test_sanitize_leading_digit() {
        assert_eq!(sanitize_identifier("2024 revenue"), "_2024_revenue");
        assert_eq!(sanitize_identifier("9"), "_9");
    }

    #[test]
    fn test_sanitize_collapses_underscores() {
        assert_eq!(sanitize_identifier("a   -- b"), "a_b");
        assert_eq!(sanitize_identifier("__x__"), "_x_");
    }

    #[test]
    fn test_sanitize_empty_and_symbol_only() {
        assert_eq!(sanitize_identifier(""), "_");
        assert_eq!(sanitize_identifier("%%%"), "_");
        assert_eq!(sanitize_identifier("   "), "_");
    }

    #[test]
    fn test_sanitize_non_ascii() {
        assert_eq!(sanitize_identifier("Café Größe"), "caf_gr_e");
        assert_eq!(sanitize_identifier("数据"), "_");
    }

    #[test]
    fn test_sanitize_output_pattern_and_idempotence() {
        let pattern = identifier_pattern();
        let inputs = [
            "",
            "_",
            "0",
            "Name",
            "first name",
            "  padded  ",
            "123abc",
            "a__b",
            "ÄÖÜ",
            "select",
            "x;drop table y",
            "\"quoted\"",
            "tab\tseparated",
            "emoji 🚀 col",
            "_1",
            "__",
        ];

        for input in inputs {
            let once = sanitize_identifier(input);
            assert!(pattern.is_match(&once), "{:?} -> {:?}", input, once);
            assert!(!once.is_empty());
            assert_eq!(sanitize_identifier(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_unique_identifiers_disambiguates() {
        let ids = unique_identifiers(&["Name", "name", "NAME", "Other"]);
        assert_eq!(ids, vec!["name", "name_2", "name_3", "other"]);
    }

    #[test]
    fn test_unique_identifiers_trailing_underscore_base() {
        let ids = unique_identifiers(&["Total ($)", "Total (€)", "%", "#"]);
        assert_eq!(ids, vec!["total_", "total_2", "_", "_2"]);

        let pattern = identifier_pattern();
        for id in &ids {
            assert!(pattern.is_match(id));
            assert!(!id.contains("__"));
        }
    }

    #[test]
    fn test_unique_identifiers_suffix_collision() {
        // "a_2" is taken by a real header before the duplicate "a" needs it
        let ids = unique_identifiers(&["a", "a_2", "a"]);
        assert_eq!(ids, vec!["a", "a_2", "a_3"]);
    }

    #[test]
    fn test_generate_table_name() {
        let now = Utc::now();
        let first = generate_table_name(now);
        let second = generate_table_name(now);

        assert!(first.starts_with(&format!("ds_{}_", now.timestamp_millis())));
        assert!(is_sanitized(&first));
        assert_ne!(first, second);
    }

    #[test]
    fn test_is_sanitized() {
        assert!(is_sanitized("ds_1_abc"));
        assert!(!is_sanitized("ds_1; drop"));
        assert!(!is_sanitized(""));
        assert!(!is_sanitized("Upper"));
    }
}
