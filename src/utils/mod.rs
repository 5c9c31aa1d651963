/// Collapse every run of whitespace to a single space and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode HTML entities left in already-parsed text, then normalize whitespace.
///
/// Review bodies are sometimes double-escaped in the page source (`&amp;quot;`),
/// so the DOM text can still carry entity references after parsing.
pub fn clean_text(text: &str) -> String {
    let decoded = html_escape::decode_html_entities(text);
    normalize_whitespace(&decoded)
}

/// Keep at most `max_chars` characters, never splitting a UTF-8 sequence.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b   c "), "a b c");
        assert_eq!(normalize_whitespace("   "), "");
    }

    #[test]
    fn test_clean_text_decodes_entities() {
        assert_eq!(clean_text("Tom &amp; Jerry&#39;s\n  &quot;best&quot;"), "Tom & Jerry's \"best\"");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 5), "");
    }
}
