//! The content pipeline: raw markup → sanitized markup → portable document.
//!
//! The same transform is applied to source listing pages and to individual
//! article pages. It is pure and stateless.
//!
//! # Submodules
//!
//! - [`sanitize`]: drops scripts, styles, chrome and presentation attributes
//! - [`markdown`]: converts the sanitized markup to Markdown and tidies it

pub mod markdown;
pub mod sanitize;

use tracing::debug;

/// Run both stages over `raw` markup.
pub fn to_portable_document(raw: &str) -> String {
    let sanitized = sanitize::sanitize(raw);
    let document = markdown::to_markdown(&sanitized);
    debug!(
        raw_bytes = raw.len(),
        sanitized_bytes = sanitized.len(),
        document_bytes = document.len(),
        "Transformed page to portable document"
    );
    document
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_page_to_document() {
        let raw = r#"<!DOCTYPE html><html><head><title>News</title><script>x()</script></head>
            <body><nav><a href="/">Home</a></nav>
            <main>
              <h2 class="card-title"><a href="/a/1">First story</a></h2>
              <p style="color:red">Published 2024-01-09</p>
            </main>
            <footer>Cookies</footer></body></html>"#;
        let doc = to_portable_document(raw);
        assert!(doc.contains("[First story](/a/1)"), "{doc}");
        assert!(doc.contains("Published 2024-01-09"), "{doc}");
        assert!(!doc.contains("Home"), "{doc}");
        assert!(!doc.contains("Cookies"), "{doc}");
        assert!(!doc.contains("x()"), "{doc}");
    }

    #[test]
    fn test_blank_page_is_empty_document() {
        assert_eq!(to_portable_document(""), "");
    }
}
