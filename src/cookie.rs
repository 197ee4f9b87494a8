//! Cookie Header Tokenizer
//!
//! Splits one raw `Cookie` header into name/value pairs while tolerating the
//! malformed input real browsers and debug tooling produce: brace-nested JSON
//! values, quoted separators, escaped quotes, flag cookies with no `=`.
//! Tokenization never fails; problems are accumulated as diagnostics and the
//! offending token is dropped.

use crate::constants::{MAX_COOKIE_NAME_LEN, MAX_COOKIE_VALUE_LEN};
use crate::str_utils::{replace_invalid_name_chars, strip_control_chars};

/// Insertion-ordered cookie name → value mapping. Duplicate names keep the
/// last-parsed value, in the position of the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieMap {
    entries: Vec<(String, String)>,
}

impl CookieMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: String, value: String) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything one tokenization pass produced: the surviving cookies plus the
/// diagnostics for tokens that were dropped.
#[derive(Debug, Default)]
pub struct TokenizeOutcome {
    pub cookies: CookieMap,
    pub parse_errors: Vec<String>,
    pub malformed_tokens: Vec<String>,
}

/// Tokenizes a raw cookie header in a single left-to-right scan.
///
/// `;` and `,` end a token only at brace depth 0 and outside quotes, so a
/// value may carry an embedded JSON object or a quoted comma without being
/// split. A backslash copies the following character verbatim, with no
/// separator or quote interpretation. A stray `}` at depth 0 is a literal
/// character, not an error.
pub fn tokenize(raw: &str) -> TokenizeOutcome {
    let mut outcome = TokenizeOutcome::default();

    let mut current = String::new();
    let mut brace_depth: u32 = 0;
    let mut in_quote = false;
    let mut escape_next = false;

    for ch in raw.chars() {
        if escape_next {
            escape_next = false;
            current.push(ch);
            continue;
        }

        match ch {
            '\\' => {
                escape_next = true;
                current.push(ch);
            }
            '"' => {
                in_quote = !in_quote;
                current.push(ch);
            }
            '{' if !in_quote => {
                brace_depth += 1;
                current.push(ch);
            }
            '}' if !in_quote && brace_depth > 0 => {
                brace_depth -= 1;
                current.push(ch);
            }
            ';' | ',' if !in_quote && brace_depth == 0 => {
                accumulate_token(&current, &mut outcome);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    accumulate_token(&current, &mut outcome);

    if !outcome.parse_errors.is_empty() {
        tracing::debug!(
            "[TOKENIZE] {} cookie(s), {} dropped token(s): {}",
            outcome.cookies.len(),
            outcome.parse_errors.len(),
            outcome.parse_errors.join("; ")
        );
    }

    outcome
}

fn accumulate_token(token: &str, outcome: &mut TokenizeOutcome) {
    let token = token.trim();
    if token.is_empty() {
        return;
    }

    match token.split_once('=') {
        Some((name, value)) => {
            let name = match sanitize_name(name) {
                Ok(n) => n,
                Err(e) => {
                    outcome.parse_errors.push(e);
                    return;
                }
            };
            let value = match sanitize_value(value) {
                Ok(v) => v,
                Err(e) => {
                    outcome.parse_errors.push(e);
                    return;
                }
            };
            outcome.cookies.insert(name, value);
        }
        None => {
            // Flag cookie: a bare name with no value. Always noted as
            // malformed, but still kept in the map when the name is usable.
            outcome.malformed_tokens.push(token.to_string());
            match sanitize_name(token) {
                Ok(name) => outcome.cookies.insert(name, String::new()),
                Err(e) => outcome.parse_errors.push(e),
            }
        }
    }
}

fn sanitize_name(raw: &str) -> std::result::Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("cookie name is empty".to_string());
    }
    if trimmed.chars().count() > MAX_COOKIE_NAME_LEN {
        return Err(format!(
            "cookie name exceeds {} chars",
            MAX_COOKIE_NAME_LEN
        ));
    }
    Ok(replace_invalid_name_chars(trimmed))
}

fn sanitize_value(raw: &str) -> std::result::Result<String, String> {
    let stripped = strip_control_chars(raw.trim());
    if stripped.chars().count() > MAX_COOKIE_VALUE_LEN {
        return Err(format!(
            "cookie value exceeds {} chars",
            MAX_COOKIE_VALUE_LEN
        ));
    }
    Ok(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_simple_pairs() {
        let pairs = [("session", "abc123"), ("mitm-show", "url-to-html"), ("x", "")];
        let header = pairs
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect::<Vec<_>>()
            .join("; ");

        let outcome = tokenize(&header);
        assert!(outcome.parse_errors.is_empty());
        assert_eq!(outcome.cookies.len(), pairs.len());
        for (name, value) in pairs {
            assert_eq!(outcome.cookies.get(name), Some(value));
        }
    }

    #[test]
    fn test_brace_depth_protects_internal_comma() {
        let outcome = tokenize("mitm-show=url-to-html; mitm-cfg={a,b}");
        assert_eq!(outcome.cookies.len(), 2);
        assert_eq!(outcome.cookies.get("mitm-show"), Some("url-to-html"));
        assert_eq!(outcome.cookies.get("mitm-cfg"), Some("{a,b}"));
    }

    #[test]
    fn test_nested_braces() {
        let outcome = tokenize(r#"cfg={"a":{"b":1},"c":2}; other=1"#);
        assert_eq!(outcome.cookies.get("cfg"), Some(r#"{"a":{"b":1},"c":2}"#));
        assert_eq!(outcome.cookies.get("other"), Some("1"));
    }

    #[test]
    fn test_quoted_separator_not_split() {
        let outcome = tokenize(r#"msg="a;b,c"; plain=1"#);
        assert_eq!(outcome.cookies.get("msg"), Some(r#""a;b,c""#));
        assert_eq!(outcome.cookies.get("plain"), Some("1"));
    }

    #[test]
    fn test_escaped_quote_keeps_quote_state() {
        // The escaped quote must not close the quoted run, so the `;` after
        // it stays literal.
        let outcome = tokenize(r#"msg="a\";b"; plain=1"#);
        assert_eq!(outcome.cookies.get("msg"), Some(r#""a\";b""#));
        assert_eq!(outcome.cookies.get("plain"), Some("1"));
    }

    #[test]
    fn test_stray_closing_brace_is_literal() {
        let outcome = tokenize("a=x}y; b=2");
        assert!(outcome.parse_errors.is_empty());
        assert_eq!(outcome.cookies.get("a"), Some("x}y"));
        assert_eq!(outcome.cookies.get("b"), Some("2"));
    }

    #[test]
    fn test_flag_cookie_gets_empty_value() {
        let outcome = tokenize("mitm-debug; a=1");
        assert_eq!(outcome.cookies.get("mitm-debug"), Some(""));
        assert_eq!(outcome.cookies.get("a"), Some("1"));
        assert_eq!(outcome.malformed_tokens, vec!["mitm-debug".to_string()]);
        assert!(outcome.parse_errors.is_empty());
    }

    #[test]
    fn test_splits_on_first_equals_only() {
        let outcome = tokenize("k=a=b=c");
        assert_eq!(outcome.cookies.get("k"), Some("a=b=c"));
    }

    #[test]
    fn test_duplicate_name_keeps_last() {
        let outcome = tokenize("k=first; k=second");
        assert_eq!(outcome.cookies.len(), 1);
        assert_eq!(outcome.cookies.get("k"), Some("second"));
    }

    #[test]
    fn test_empty_tokens_dropped() {
        let outcome = tokenize("; ; a=1;;");
        assert_eq!(outcome.cookies.len(), 1);
        assert!(outcome.parse_errors.is_empty());
    }

    #[test]
    fn test_invalid_name_chars_replaced() {
        let outcome = tokenize("bad name$=1");
        assert_eq!(outcome.cookies.get("bad_name_"), Some("1"));
    }

    #[test]
    fn test_oversized_name_is_dropped_with_diagnostic() {
        let long_name = "n".repeat(MAX_COOKIE_NAME_LEN + 1);
        let outcome = tokenize(&format!("{}=1; ok=2", long_name));
        assert_eq!(outcome.cookies.len(), 1);
        assert_eq!(outcome.cookies.get("ok"), Some("2"));
        assert_eq!(outcome.parse_errors.len(), 1);
    }

    #[test]
    fn test_oversized_value_is_dropped_with_diagnostic() {
        let long_value = "v".repeat(MAX_COOKIE_VALUE_LEN + 1);
        let outcome = tokenize(&format!("big={}; ok=2", long_value));
        assert_eq!(outcome.cookies.len(), 1);
        assert_eq!(outcome.parse_errors.len(), 1);
    }

    #[test]
    fn test_malformed_flag_token_recorded_in_both_lists() {
        let long_name = "n".repeat(MAX_COOKIE_NAME_LEN + 1);
        let outcome = tokenize(&long_name);
        assert!(outcome.cookies.is_empty());
        assert_eq!(outcome.parse_errors.len(), 1);
        assert_eq!(outcome.malformed_tokens.len(), 1);
    }

    #[test]
    fn test_value_control_chars_stripped() {
        let outcome = tokenize("k=a\x01b\x02c");
        assert_eq!(outcome.cookies.get("k"), Some("abc"));
    }

    #[test]
    fn test_never_panics_on_garbage() {
        for garbage in ["{{{{", "\\", "\"", "}}}}", "=", "==", ";;;;", "a{b=c,d}e=f"] {
            let _ = tokenize(garbage);
        }
    }
}
