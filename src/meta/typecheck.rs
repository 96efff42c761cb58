// Static pre-compile check for `eval`/`code` submissions (spec.md §4.G
// step 1). The submission is TypeScript-flavored against the generated
// type text, but the sandbox only ever executes plain JavaScript, so this
// runs two passes: first a structural scan that catches a declared-type
// vs. literal-value mismatch on `const`/`let`/`var` annotations and names
// the conflicting types directly; then, for submissions that pass that
// scan, annotations are stripped and the result is parsed as plain JS via
// `boa_engine` to catch genuine syntax errors.

use boa_engine::{Context, Source};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{McpManError, Result};

static POSITION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)line\s+(\d+),?\s*column\s+(\d+)").unwrap());

static ANNOTATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:const|let|var)\s+\w+\s*:\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*([^;,\n)]+)").unwrap()
});

static TYPE_ANNOTATION_STRIP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"((?:const|let|var)\s+\w+)\s*:\s*[A-Za-z_][A-Za-z0-9_<>\[\]| ]*(\s*=)").unwrap()
});

/// Check `code` against the declared type text's shape. Returns
/// `Ok(())` if the submission is accepted, or `TypeCheckFailed` naming
/// the line, column, and conflicting types.
pub fn check(code: &str) -> Result<()> {
    if let Some((line, column, message)) = find_annotation_mismatch(code) {
        return Err(McpManError::TypeCheckFailed {
            line,
            column,
            message,
        });
    }

    let stripped = strip_type_annotations(code);
    let wrapped = format!("({stripped})");
    let mut context = Context::default();
    match context.parse_script(Source::from_bytes(wrapped.as_bytes())) {
        Ok(_) => Ok(()),
        Err(e) => {
            let message = e.to_string();
            let (line, column) = extract_position(&message);
            Err(McpManError::TypeCheckFailed {
                line,
                column,
                message,
            })
        }
    }
}

/// Scan for `const x: Type = <literal>` declarations whose declared type
/// doesn't match the literal's inferred type, e.g. `const x: number =
/// 'str'`. Returns the 1-based line/column of the declaration and a
/// message naming both types.
fn find_annotation_mismatch(code: &str) -> Option<(u32, u32, String)> {
    for caps in ANNOTATION_RE.captures_iter(code) {
        let whole = caps.get(0).unwrap();
        let declared = caps.get(1).unwrap().as_str();
        let rhs = caps.get(2).unwrap().as_str().trim();
        let Some(actual) = infer_literal_type(rhs) else {
            continue;
        };
        if type_matches(declared, actual) {
            continue;
        }
        let (line, column) = line_col(code, whole.start());
        return Some((
            line,
            column,
            format!("type '{actual}' is not assignable to type '{declared}'"),
        ));
    }
    None
}

/// Infer the runtime type of a literal RHS expression. `None` for
/// anything that isn't a simple literal (identifiers, calls, objects) —
/// those aren't checked here.
fn infer_literal_type(rhs: &str) -> Option<&'static str> {
    if rhs.starts_with('\'') || rhs.starts_with('"') || rhs.starts_with('`') {
        Some("string")
    } else if rhs == "true" || rhs == "false" {
        Some("boolean")
    } else if rhs.parse::<f64>().is_ok() {
        Some("number")
    } else {
        None
    }
}

fn type_matches(declared: &str, actual: &str) -> bool {
    declared == actual || declared == "any" || declared == "unknown"
}

fn line_col(code: &str, byte_offset: usize) -> (u32, u32) {
    let prefix = &code[..byte_offset.min(code.len())];
    let line = prefix.matches('\n').count() as u32 + 1;
    let column = match prefix.rfind('\n') {
        Some(idx) => (prefix.len() - idx) as u32,
        None => prefix.len() as u32 + 1,
    };
    (line, column)
}

/// Drop `: Type` from `const`/`let`/`var` declarations so the remainder
/// parses as plain JS. Only strips the declaration-site annotation this
/// crate's generated type text produces; arbitrary TS syntax (generics on
/// calls, `as` casts) is intentionally left for the parser to reject.
fn strip_type_annotations(code: &str) -> String {
    TYPE_ANNOTATION_STRIP_RE.replace_all(code, "$1$2").into_owned()
}

fn extract_position(message: &str) -> (u32, u32) {
    if let Some(caps) = POSITION_RE.captures(message) {
        let line = caps[1].parse().unwrap_or(1);
        let column = caps[2].parse().unwrap_or(1);
        return (line, column);
    }
    (1, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_arrow_function() {
        assert!(check("() => 42").is_ok());
    }

    #[test]
    fn accepts_annotated_declaration_with_matching_literal() {
        assert!(check("async () => { const x: number = 42; return x; }").is_ok());
    }

    #[test]
    fn rejects_typescript_annotations_with_a_mismatched_literal() {
        let err = check("async () => { const x: number = 'str'; return x; }").unwrap_err();
        let McpManError::TypeCheckFailed { message, .. } = &err else {
            panic!("expected TypeCheckFailed, got {err:?}");
        };
        assert!(message.contains("string"), "message was: {message}");
        let rendered = format!(
            "Line {}, Column {}: {}",
            match &err {
                McpManError::TypeCheckFailed { line, .. } => *line,
                _ => unreachable!(),
            },
            match &err {
                McpManError::TypeCheckFailed { column, .. } => *column,
                _ => unreachable!(),
            },
            message
        );
        assert!(Regex::new(r"Line \d+, Column \d+:").unwrap().is_match(&rendered));
    }

    #[test]
    fn rejects_genuine_syntax_errors_after_stripping_annotations() {
        let err = check("async () => { const x: number = ; return x; }").unwrap_err();
        assert!(matches!(err, McpManError::TypeCheckFailed { .. }));
    }
}
