//! Sanitized markup → Markdown, plus the clean-up pass over the result.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static LEADING_INDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]+").unwrap());
static LINK_SPACING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\s*\(\s*([^)\s]+)\s*\)").unwrap());
static HEADING_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(#{1,6})[ \t]*([^\s#])").unwrap());

/// Convert sanitized markup to Markdown.
///
/// Never fails: a conversion error comes back as a diagnostic string, which
/// the model will not turn into valid JSON and the caller then discards.
pub fn to_markdown(sanitized: &str) -> String {
    if sanitized.trim().is_empty() {
        return String::new();
    }
    match htmd::convert(sanitized) {
        Ok(markdown) => normalize(&markdown),
        Err(e) => {
            warn!(error = %e, "Markdown conversion failed");
            format!("Error while converting to Markdown: {e}")
        }
    }
}

/// Tidy converter output so the model sees compact, regular Markdown.
pub fn normalize(markdown: &str) -> String {
    let text = markdown.replace("\r\n", "\n");
    let text = text.trim();
    let text = BLANK_RUNS.replace_all(text, "\n\n");
    let text = LEADING_INDENT.replace_all(&text, "");
    let text = LINK_SPACING.replace_all(&text, "[$1]($2)");
    let text = HEADING_MARKER.replace_all(&text, "$1 $2");
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_blank_runs() {
        assert_eq!(normalize("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(normalize("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_normalize_trims_and_strips_indent() {
        assert_eq!(normalize("\n\n   first\n    second  \n\n"), "first\nsecond");
    }

    #[test]
    fn test_normalize_link_spacing() {
        assert_eq!(normalize("see [the story] ( /a/1 )"), "see [the story](/a/1)");
    }

    #[test]
    fn test_normalize_heading_markers() {
        assert_eq!(normalize("#Header\n##   Sub\n### Ok"), "# Header\n## Sub\n### Ok");
        // Only line-leading markers are headings.
        assert_eq!(normalize("C# rocks, see [x](#anchor)"), "C# rocks, see [x](#anchor)");
    }

    #[test]
    fn test_to_markdown_keeps_structure() {
        let md = to_markdown(r#"<h1>Title</h1><p>Body with <a href="/a/1">link</a>.</p><ul><li>one</li></ul>"#);
        assert!(md.starts_with("# Title"), "{md}");
        assert!(md.contains("[link](/a/1)"), "{md}");
        assert!(md.contains("one"), "{md}");
    }

    #[test]
    fn test_to_markdown_empty() {
        assert_eq!(to_markdown(""), "");
    }
}
