//! Markup sanitization.
//!
//! Parses raw markup with `scraper`, detaches the parts of the tree that
//! carry no article content and re-serializes what is left: scripts, styles, embedded graphics,
//! presentation and tracking attributes, and page chrome. A chrome container
//! (header, footer, nav, aside, ad blocks) is kept when it holds real
//! content, since some sites wrap their articles in such elements.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

/// Elements dropped together with everything inside them.
const REMOVED_ELEMENTS: &[&str] = &[
    "script", "style", "meta", "link", "iframe", "svg", "noscript", "template", "object", "embed",
];

/// Elements treated as page chrome.
const CHROME_ELEMENTS: &[&str] = &["header", "footer", "nav", "aside"];

/// Elements that keep their `id` attribute.
const SEMANTIC_ID_ELEMENTS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "article", "section", "main",
];

/// Own text a paragraph needs before it counts as content.
const MIN_PARAGRAPH_TEXT: usize = 50;
/// Own text a section needs before it counts as content.
const MIN_SECTION_TEXT: usize = 100;

/// Class or id tokens that mark advertising and consent blocks.
static AD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|[\s_-])(ad|ads|advert|advertisement|banner|cookie|sponsored)([\s_-]|$)")
        .unwrap()
});

static CONTENT_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("h1, h2, h3, h4, h5, h6, img[alt], article, main").unwrap()
});
static PARAGRAPH_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static SECTION_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("section").unwrap());

/// Strip non-content nodes and attributes from `raw`.
pub fn sanitize(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }
    let mut document = Html::parse_document(raw);

    let mut dropped = Vec::new();
    let mut kept = Vec::new();
    for node in document.tree.root().descendants() {
        match node.value() {
            Node::Comment(_) | Node::ProcessingInstruction(_) => dropped.push(node.id()),
            Node::Element(_) => {
                let Some(element) = ElementRef::wrap(node) else {
                    continue;
                };
                let name = element.value().name();
                if REMOVED_ELEMENTS.contains(&name)
                    || (is_chrome(element) && !contains_content(element))
                {
                    dropped.push(node.id());
                } else {
                    kept.push(node.id());
                }
            }
            _ => {}
        }
    }

    for id in kept {
        let Some(mut node) = document.tree.get_mut(id) else {
            continue;
        };
        if let Node::Element(element) = node.value() {
            let name = element.name().to_string();
            element.attrs = std::mem::take(&mut element.attrs)
                .into_iter()
                .filter(|(attr, _)| keep_attribute(&name, &attr.local))
                .collect();
        }
    }
    for id in dropped {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    document.html()
}

fn keep_attribute(element: &str, attr: &str) -> bool {
    let attr = attr.to_ascii_lowercase();
    match attr.as_str() {
        "style" | "class" | "ping" | "tabindex" | "role" => false,
        "id" => SEMANTIC_ID_ELEMENTS.contains(&element),
        a if a.starts_with("on") => false,
        a if a.starts_with("data-") || a.starts_with("aria-") => false,
        _ => true,
    }
}

fn is_chrome(element: ElementRef<'_>) -> bool {
    let value = element.value();
    if CHROME_ELEMENTS.contains(&value.name()) {
        return true;
    }
    if !matches!(value.name(), "div" | "section") {
        return false;
    }
    let class_hit = value.attr("class").is_some_and(|c| AD_PATTERN.is_match(c));
    let id_hit = value.attr("id").is_some_and(|i| AD_PATTERN.is_match(i));
    class_hit || id_hit
}

/// Headings, described images, articles, or long enough paragraphs and sections.
fn contains_content(element: ElementRef<'_>) -> bool {
    if element.select(&CONTENT_SELECTOR).next().is_some() {
        return true;
    }
    let long_paragraph = element
        .select(&PARAGRAPH_SELECTOR)
        .any(|p| own_text_len(p) > MIN_PARAGRAPH_TEXT);
    let long_section = element
        .select(&SECTION_SELECTOR)
        .any(|s| own_text_len(s) > MIN_SECTION_TEXT);
    long_paragraph || long_section
}

/// Length of the element's direct text children, ignoring nested elements.
fn own_text_len(element: ElementRef<'_>) -> usize {
    element
        .children()
        .filter_map(|child| child.value().as_text())
        .map(|text| text.trim().chars().count())
        .sum()
}
