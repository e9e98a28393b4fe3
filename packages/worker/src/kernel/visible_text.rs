//! Visible-text extraction from rendered HTML.
//!
//! Walks the `<body>` subtree and keeps text nodes a reader would see,
//! skipping non-content elements entirely.

use scraper::{ElementRef, Html, Selector};

/// Elements whose whole subtree is ignored.
pub const SKIPPED_ELEMENTS: [&str; 7] = [
    "script", "style", "iframe", "noscript", "svg", "nav", "footer",
];

/// Trimmed fragments must be longer than this to be kept.
pub const MIN_FRAGMENT_CHARS: usize = 5;

/// Concatenate visible text fragments of `<body>`, separated by single spaces.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body = match Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
    {
        Some(body) => body,
        None => return String::new(),
    };

    let mut fragments = Vec::new();
    collect_fragments(body, &mut fragments);
    fragments.join(" ")
}

/// `<title>` text, empty when absent.
pub fn document_title(html: &str) -> String {
    let document = Html::parse_document(html);
    Selector::parse("title")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default()
}

fn collect_fragments(element: ElementRef<'_>, out: &mut Vec<String>) {
    let name = element.value().name();
    if SKIPPED_ELEMENTS.iter().any(|skipped| name.eq_ignore_ascii_case(skipped)) {
        return;
    }

    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            collect_fragments(child_element, out);
        } else if let Some(text) = child.value().as_text() {
            let fragment = text.trim();
            if fragment.chars().count() > MIN_FRAGMENT_CHARS {
                out.push(fragment.to_string());
            }
        }
    }
}
