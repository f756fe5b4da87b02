//! Lightweight "which columns look relevant" hints for a question.
//!
//! Coarse token matching only. Hints steer the model toward likely columns; the
//! Plan Validator remains the authority on what a plan may reference.

/// Shortest question token that takes part in matching.
const MIN_TOKEN_LEN: usize = 3;

/// Columns whose names share a token with `question`, in schema order.
///
/// A column matches when a question token contains the lowercased column name,
/// the column name contains the token, or the token equals one of the column's
/// underscore-separated parts. No match (or no usable tokens) returns every column.
pub fn relevant_columns(columns: &[String], question: &str) -> Vec<String> {
    let tokens = question_tokens(question);
    if columns.is_empty() || tokens.is_empty() {
        return columns.to_vec();
    }

    let picked: Vec<String> = columns
        .iter()
        .filter(|column| column_matches(column, &tokens))
        .cloned()
        .collect();

    if picked.is_empty() {
        columns.to_vec()
    } else {
        picked
    }
}

fn question_tokens(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}

fn column_matches(column: &str, tokens: &[String]) -> bool {
    let lowered = column.to_lowercase();
    let parts: Vec<&str> = lowered
        .split('_')
        .filter(|p| p.chars().count() >= MIN_TOKEN_LEN)
        .collect();

    tokens.iter().any(|token| {
        token.contains(lowered.as_str())
            || lowered.contains(token.as_str())
            || parts.iter().any(|part| token.contains(part))
    })
}
