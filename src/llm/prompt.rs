//! Prompt rendering and completion cleanup

use crate::dataset::types::{ColumnInfo, Row};

/// Prompt asking the model for one read-only query over `table`.
///
/// The column list comes from live introspection so the model never sees a
/// column the table does not have.
pub fn build_sql_prompt(table: &str, columns: &[ColumnInfo], question: &str) -> String {
    let schema_text = columns
        .iter()
        .map(|c| format!("{} ({})", c.column_name, c.data_type))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are a SQL generator. Only output a single valid SQL SELECT query that answers the question.
Table: {table}
Columns: {schema_text}

Question: \"{question}\"

Rules:
- Use only columns listed.
- If aggregation is asked (sum/avg/count), include it.
- If unsure, make the safest reasonable assumption.
- Output ONLY the SQL, no commentary, no code fences."
    )
}

/// Prompt asking for a plain-language reading of the result preview.
pub fn build_insight_prompt(question: &str, preview: &[Row]) -> String {
    let rows_json = serde_json::to_string(preview).unwrap_or_else(|_| "[]".to_string());

    format!(
        "User asked: \"{question}\"
Query results: {rows_json}

Provide a clear, concise explanation of what these results show in plain English. Focus on key findings and patterns."
    )
}

/// Remove markdown code fences and surrounding whitespace from a completion.
pub fn strip_code_fences(completion: &str) -> String {
    completion
        .replace("```sql", "")
        .replace("```SQL", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Explanation used when the insight model fails or returns nothing.
pub fn fallback_insight(sql: &str, row_count: usize) -> String {
    if row_count == 0 {
        return "No data was returned from the query.".to_string();
    }

    let upper = sql.to_ascii_uppercase();
    if upper.contains("AVG(") {
        format!("The analysis shows average values across {} records.", row_count)
    } else if upper.contains("SUM(") {
        format!("The analysis shows total values across {} records.", row_count)
    } else if upper.contains("COUNT(") {
        format!("The analysis shows record counts in {} result rows.", row_count)
    } else if upper.contains("MAX(") {
        format!("The analysis shows maximum values across {} records.", row_count)
    } else if upper.contains("MIN(") {
        format!("The analysis shows minimum values across {} records.", row_count)
    } else {
        format!(
            "The analysis returned {} records based on your question.",
            row_count
        )
    }
}
