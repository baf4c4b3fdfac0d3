//! Upload parsing
//!
//! Turns an uploaded CSV payload into a header row and a rectangular matrix
//! of raw cell strings.

use crate::dataset::types::{RawRow, RawTable};
use crate::error::AnalystError;

/// Parse an uploaded CSV payload.
///
/// # Arguments
/// * `payload` - Raw bytes of the uploaded file
///
/// # Returns
/// * `RawTable` with headers, normalized rows and the number of skipped records
///
/// # Behavior
/// - The first record is the header row and must not be blank
/// - Handles variable column counts (short rows padded, long rows truncated)
/// - Trims whitespace from every field and skips empty lines
/// - Skips undecodable records with a warning instead of failing
pub fn parse_csv(payload: &[u8]) -> Result<RawTable, AnalystError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(payload);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AnalystError::malformed(format!("Failed to parse CSV headers: {}", e)))?
        .iter()
        .map(|s| s.to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(AnalystError::malformed("CSV has no header row"));
    }

    let header_count = headers.len();
    let mut rows: Vec<RawRow> = Vec::new();
    let mut skipped_rows: usize = 0;

    for (line_number, result) in reader.records().enumerate() {
        match result {
            Ok(record) => {
                if record.iter().all(|field| field.is_empty()) {
                    continue;
                }
                rows.push(normalize_row(&record, header_count));
            }
            Err(e) => {
                skipped_rows += 1;
                tracing::warn!(
                    "Skipping malformed row {} in upload: {}",
                    line_number + 2, // 1-based plus header row
                    e
                );
            }
        }
    }

    if skipped_rows > 0 {
        tracing::info!(
            "CSV parsing complete: {} rows parsed, {} rows skipped due to errors",
            rows.len(),
            skipped_rows
        );
    }

    Ok(RawTable {
        headers,
        rows,
        skipped_rows,
    })
}

/// Normalize a CSV record to match the expected column count.
fn normalize_row(record: &csv::StringRecord, header_count: usize) -> RawRow {
    let mut row: RawRow = record.iter().map(|s| s.to_string()).collect();
    row.resize(header_count, String::new());
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_csv() {
        let content = "name,age,city\nAlice,30,NYC\nBob,25,LA\nCharlie,35,Chicago";
        let result = parse_csv(content.as_bytes()).unwrap();

        assert_eq!(result.headers, vec!["name", "age", "city"]);
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.skipped_rows, 0);
        assert_eq!(result.rows[0], vec!["Alice", "30", "NYC"]);
        assert_eq!(result.rows[2], vec!["Charlie", "35", "Chicago"]);
    }

    #[test]
    fn test_parse_csv_variable_columns() {
        let content = "a,b,c\n1,2,3\n4,5\n6,7,8,9";
        let result = parse_csv(content.as_bytes()).unwrap();

        assert_eq!(result.rows[0], vec!["1", "2", "3"]);
        assert_eq!(result.rows[1], vec!["4", "5", ""]);
        assert_eq!(result.rows[2], vec!["6", "7", "8"]);
    }

    #[test]
    fn test_parse_csv_trims_and_skips_blank_lines() {
        let content = "id , label\n 1 , first \n\n2,second\n , \n";
        let result = parse_csv(content.as_bytes()).unwrap();

        assert_eq!(result.headers, vec!["id", "label"]);
        assert_eq!(result.rows, vec![vec!["1", "first"], vec!["2", "second"]]);
    }

    #[test]
    fn test_parse_csv_header_only() {
        let result = parse_csv(b"a,b,c\n").unwrap();
        assert_eq!(result.headers.len(), 3);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn test_parse_empty_payload_is_malformed() {
        let err = parse_csv(b"").unwrap_err();
        assert!(matches!(err, AnalystError::MalformedInput { .. }));
    }

    #[test]
    fn test_parse_csv_with_quoted_fields() {
        let content = "name,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n\"multi\nline\",x";
        let result = parse_csv(content.as_bytes()).unwrap();

        assert_eq!(result.rows[0], vec!["Smith, J", "said \"hi\""]);
        assert_eq!(result.rows[1], vec!["multi\nline", "x"]);
    }

    #[test]
    fn test_parse_csv_skips_invalid_utf8_rows() {
        let mut content = b"a,b\n1,2\n".to_vec();
        content.extend_from_slice(&[0xff, 0xfe, b',', b'3', b'\n']);
        content.extend_from_slice(b"4,5\n");

        let result = parse_csv(&content).unwrap();
        assert_eq!(result.rows, vec![vec!["1", "2"], vec!["4", "5"]]);
        assert_eq!(result.skipped_rows, 1);
    }
}
