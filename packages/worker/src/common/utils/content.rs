/// Pure utility functions for page text handling
///
/// No I/O here: inputs in, outputs out.
use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

/// Truncate to at most `max_chars` characters, never splitting a UTF-8 sequence.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Replace HTML tags with spaces.
///
/// Entities are left as-is.
pub fn strip_html_tags(html: &str) -> String {
    HTML_TAG_REGEX.replace_all(html, " ").into_owned()
}

lazy_static! {
    // Any tag, including one cut off at the end of the input
    static ref HTML_TAG_REGEX: Regex = Regex::new(r"<[^>]*>?").unwrap();
}

/// Short source label for a posting URL: hostname without a leading `www.`.
///
/// Falls back to `"extension"` when the URL does not parse.
pub fn source_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "extension".to_string())
}

/// Short preview of a string for log lines.
pub fn preview(text: &str, max_chars: usize) -> &str {
    truncate_chars(text, max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_shorter_is_unchanged() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_chars_respects_multibyte() {
        let text = "héllo wörld";
        assert_eq!(truncate_chars(text, 4), "héll");
        assert_eq!(truncate_chars(text, 0), "");
    }

    #[test]
    fn test_strip_html_tags() {
        let stripped = strip_html_tags("<div><h1>Senior Engineer</h1><p>Acme Corp</p></div>");
        assert!(!stripped.contains('<'));
        assert!(stripped.contains("Senior Engineer"));
        assert!(stripped.contains("Acme Corp"));
    }

    #[test]
    fn test_strip_html_tags_replaces_every_tag() {
        assert_eq!(strip_html_tags("<b>Go</b>&amp;<i>SQL"), " Go &amp; SQL");
        assert_eq!(strip_html_tags("Remote <br"), "Remote  ");
    }

    #[test]
    fn test_source_from_url() {
        assert_eq!(source_from_url("https://www.linkedin.com/jobs/view/1"), "linkedin.com");
        assert_eq!(source_from_url("https://boards.greenhouse.io/acme/jobs/2"), "boards.greenhouse.io");
        assert_eq!(source_from_url("not a url"), "extension");
    }
}
