// Shared text rendering for the `eval`/`invoke`/`code` handlers
// (spec.md §4.G / §8 "Truncation preserves a marker").

use serde_json::Value;

const TRUNCATE_AT: usize = 250;

/// Render a JSON value the way `$results` entries are displayed: strings
/// print bare, everything else is pretty-printed JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// `$results[i] = // <tag>\n<rendered>`, truncated to ~250 chars with a
/// `see $results[i] for full result` marker. The stored value at index
/// `i` is never truncated; only this formatted echo is.
pub fn format_result_line(index: usize, tag: &str, value: &Value) -> String {
    let rendered = render_value(value);
    let body = if rendered.len() > TRUNCATE_AT {
        format!(
            "{}... (see $results[{index}] for full result)",
            truncate_at_char_boundary(&rendered, TRUNCATE_AT)
        )
    } else {
        rendered
    };
    format!("$results[{index}] = // {tag}\n{body}")
}

/// The largest prefix of `s` that is at most `max_bytes` bytes and ends on
/// a UTF-8 char boundary. Plain byte slicing panics if `max_bytes` lands
/// inside a multi-byte character; upstream tool output is free to contain
/// any valid UTF-8, so this has to hold for every byte offset.
fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_values_are_not_truncated() {
        let line = format_result_line(0, "eval", &json!(42));
        assert_eq!(line, "$results[0] = // eval\n42");
    }

    #[test]
    fn long_values_are_truncated_with_marker() {
        let long = "x".repeat(400);
        let line = format_result_line(3, "eval", &Value::String(long));
        assert!(line.contains("see $results[3] for full result"));
        assert!(line.len() < 400);
    }

    #[test]
    fn truncation_does_not_split_a_multibyte_char() {
        // A 3-byte UTF-8 char straddling the truncation boundary must not panic.
        let long = format!("{}{}", "x".repeat(TRUNCATE_AT - 1), "日".repeat(50));
        let line = format_result_line(0, "eval", &Value::String(long));
        assert!(line.contains("see $results[0] for full result"));
    }
}
