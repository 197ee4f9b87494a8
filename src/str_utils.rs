/// Safely returns a prefix of the string with at most `max_chars` characters.
/// This respects UTF-8 character boundaries.
pub fn prefix_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Drops ASCII and Unicode control characters, keeping everything else.
pub fn strip_control_chars(s: &str) -> String {
    s.chars().filter(|c| !c.is_control()).collect()
}

/// Replaces every character outside `[A-Za-z0-9._-]` with an underscore.
pub fn replace_invalid_name_chars(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_chars_respects_boundaries() {
        assert_eq!(prefix_chars("héllo", 2), "hé");
        assert_eq!(prefix_chars("ab", 5), "ab");
    }

    #[test]
    fn test_strip_control_chars() {
        assert_eq!(strip_control_chars("a\x00b\tc\nd"), "abcd");
        assert_eq!(strip_control_chars("plain"), "plain");
    }

    #[test]
    fn test_replace_invalid_name_chars() {
        assert_eq!(replace_invalid_name_chars("mitm-show"), "mitm-show");
        assert_eq!(replace_invalid_name_chars("a b$c"), "a_b_c");
        assert_eq!(replace_invalid_name_chars("ok_1.2-3"), "ok_1.2-3");
    }
}
